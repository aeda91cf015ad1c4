//! 在线探测器
//!
//! 从起始 ID 开始逐个递增探测，直到收集到 `count` 个在线职位为止（扫描数量没有上限）。
//! 每个 ID 只做一次检查：非 200 或任何传输错误都视为「不在线」并跳过，不重试。
//! 这是整个流程中唯一做网络 I/O 的地方。

mod http;
mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::JobError;

pub use http::HttpLivenessChecker;
pub use mock::OracleChecker;

/// 单个 ID 的检查结果
///
/// 区分「确认下线」与「检查失败」仅用于日志；两者在探测策略上完全等价。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Live,
    NotLive { status: u16 },
    Unreachable(String),
}

impl CheckOutcome {
    pub fn is_live(&self) -> bool {
        matches!(self, CheckOutcome::Live)
    }
}

/// 外部存在性检查
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    async fn check(&self, job_id: u64, url: &str) -> CheckOutcome;
}

/// 职位站点 URL 模板：`{base}/{id}`
#[derive(Debug, Clone)]
pub struct JobSite {
    base_url: String,
}

impl JobSite {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn url_for(&self, job_id: u64) -> String {
        format!("{}/{}", self.base_url, job_id)
    }
}

/// 一个在线职位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveJob {
    pub job_id: u64,
    pub url: String,
}

/// 探测结果：按 ID 递增排列的在线职位，以及扫描区间之后的第一个未探测 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub live: Vec<LiveJob>,
    pub next_id: u64,
    /// 扫描过的 ID 总数（含跳过的）
    pub scanned: u64,
}

impl ProbeResult {
    /// 渲染成发给会话的文本，每行一个链接
    pub fn render(&self) -> String {
        self.live
            .iter()
            .map(|job| format!("{} - ✅ Live", job.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 探测器
pub struct Prober {
    site: JobSite,
    checker: Arc<dyn LivenessCheck>,
}

impl Prober {
    pub fn new(site: JobSite, checker: Arc<dyn LivenessCheck>) -> Self {
        Self { site, checker }
    }

    /// 从 `start_id` 起扫描，直到找到 `count` 个在线职位
    ///
    /// 取消令牌在每次检查前与检查进行中都会被观察；被取消时返回 `JobError::Cancelled`。
    /// 扫描越过 `u64::MAX` 时返回 `JobError::Probe`。
    pub async fn probe(
        &self,
        start_id: u64,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult, JobError> {
        let mut live = Vec::with_capacity(count as usize);
        let mut current = start_id;

        while live.len() < count as usize {
            let url = self.site.url_for(current);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
                outcome = self.checker.check(current, &url) => outcome,
            };

            match outcome {
                CheckOutcome::Live => {
                    tracing::debug!("Job {} is live", current);
                    live.push(LiveJob { job_id: current, url });
                }
                CheckOutcome::NotLive { status } => {
                    tracing::debug!("Job {} skipped (status {})", current, status);
                }
                CheckOutcome::Unreachable(reason) => {
                    tracing::debug!("Job {} skipped (unreachable: {})", current, reason);
                }
            }

            current = match current.checked_add(1) {
                Some(next) => next,
                None => {
                    return Err(JobError::Probe(format!(
                        "job id space exhausted at {} with {}/{} live",
                        current,
                        live.len(),
                        count
                    )))
                }
            };
        }

        Ok(ProbeResult {
            live,
            next_id: current,
            scanned: current - start_id,
        })
    }
}
