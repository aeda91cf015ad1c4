//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JOBSCOUT__*` 覆盖（双下划线表示嵌套，如 `JOBSCOUT__JOBS__START_ID=100`）。
//! 兼容旧部署：未配置时从 `TOKEN` / `OWNER_ID` 读取机器人令牌与所有者 ID。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::batch::{DelayTable, ReconcileMode};
use crate::core::JobError;
use crate::cursor::CatchupMode;

/// 应用配置根
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bot: BotSection,
    pub jobs: JobsSection,
    pub batch: BatchSection,
    pub store: StoreSection,
}

/// [bot] 段：前端令牌与轮询参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSection {
    pub token: Option<String>,
    /// 所有者 ID（核心逻辑不使用）
    pub owner_id: Option<i64>,
    /// getUpdates 长轮询超时（秒）
    pub poll_timeout_secs: u64,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            token: None,
            owner_id: None,
            poll_timeout_secs: 30,
        }
    }
}

/// [jobs] 段：职位站点、起始 ID、日切步长与探测超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsSection {
    pub base_url: String,
    pub start_id: u64,
    pub daily_step: u64,
    pub catchup_mode: CatchupMode,
    pub probe_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.linkedin.com/jobs/view".to_string(),
            start_id: 4231139544,
            daily_step: 1000,
            catchup_mode: CatchupMode::PerDay,
            probe_timeout_secs: 5,
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

/// [batch] 段：延迟表（批量大小 -> 秒）与回写方式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub delays: HashMap<String, u64>,
    pub reconcile: ReconcileMode,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            delays: HashMap::from([("1".to_string(), 15), ("3".to_string(), 60)]),
            reconcile: ReconcileMode::Monotonic,
        }
    }
}

impl BatchSection {
    pub fn delay_table(&self) -> Result<DelayTable, JobError> {
        DelayTable::from_secs_map(&self.delays)
    }
}

/// [store] 段：会话游标淘汰（都不设置时不淘汰）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub idle_ttl_secs: Option<u64>,
    pub max_conversations: Option<usize>,
    pub sweep_interval_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            idle_ttl_secs: None,
            max_conversations: None,
            sweep_interval_secs: 600,
        }
    }
}

/// 从 config 目录加载配置，环境变量 JOBSCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 JOBSCOUT__*（双下划线表示嵌套键）
/// 4. 令牌与所有者 ID 仍为空时回退到 TOKEN / OWNER_ID
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JOBSCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let mut app: AppConfig = builder.build()?.try_deserialize()?;
    apply_legacy_env(&mut app);
    Ok(app)
}

fn apply_legacy_env(app: &mut AppConfig) {
    if app.bot.token.is_none() {
        app.bot.token = std::env::var("TOKEN").ok().filter(|t| !t.trim().is_empty());
    }
    if app.bot.owner_id.is_none() {
        app.bot.owner_id = std::env::var("OWNER_ID")
            .ok()
            .and_then(|v| v.trim().parse().ok());
    }
}
