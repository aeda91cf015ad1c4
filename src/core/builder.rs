//! 机器人构建器：统一的组件初始化逻辑
//!
//! 由配置组装 游标存储 → 进度策略 → 探测器 → 批量调度器 → JobBot；
//! 检查器与时钟可替换（测试时注入预言机与手动时钟）。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchNotification, BatchScheduler};
use crate::bot::JobBot;
use crate::config::AppConfig;
use crate::core::JobError;
use crate::cursor::{create_cursor_store, Clock, CursorStore, SystemClock};
use crate::prober::{HttpLivenessChecker, JobSite, LivenessCheck, Prober};
use crate::progression::ProgressionPolicy;

/// 构建完成的组件
pub struct BotComponents {
    pub bot: Arc<JobBot>,
    pub store: Arc<dyn CursorStore>,
    pub scheduler: Arc<BatchScheduler>,
    pub clock: Arc<dyn Clock>,
    /// 批量完成通知（前端消费后回调 batch_ready）
    pub notifications: mpsc::UnboundedReceiver<BatchNotification>,
}

/// 机器人构建器
pub struct BotBuilder {
    config: AppConfig,
    checker: Option<Arc<dyn LivenessCheck>>,
    clock: Option<Arc<dyn Clock>>,
    shutdown: CancellationToken,
}

impl BotBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            checker: None,
            clock: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// 替换在线检查器（默认使用 HTTP）
    pub fn with_checker(mut self, checker: Arc<dyn LivenessCheck>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 关闭令牌：取消时所有未完成批量随之取消
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> Result<BotComponents, JobError> {
        let jobs = &self.config.jobs;

        let checker: Arc<dyn LivenessCheck> = match self.checker {
            Some(checker) => checker,
            None => Arc::new(HttpLivenessChecker::new(
                jobs.probe_timeout_secs,
                &jobs.user_agent,
            )?),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let store = create_cursor_store(
            jobs.start_id,
            self.config.store.idle_ttl_secs,
            self.config.store.max_conversations,
        );
        let site = JobSite::new(jobs.base_url.clone());
        let prober = Arc::new(Prober::new(site.clone(), checker));

        let delays = self.config.batch.delay_table()?;
        let (scheduler, notifications) = BatchScheduler::new(
            prober,
            Arc::clone(&store),
            delays,
            self.config.batch.reconcile,
            self.shutdown,
        );
        let scheduler = Arc::new(scheduler);

        let policy = ProgressionPolicy::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            jobs.daily_step,
            jobs.catchup_mode,
        );

        tracing::info!(
            "Job bot ready: start_id={} base_url={} catchup={:?} reconcile={:?}",
            jobs.start_id,
            jobs.base_url,
            jobs.catchup_mode,
            self.config.batch.reconcile
        );

        Ok(BotComponents {
            bot: Arc::new(JobBot::new(policy, Arc::clone(&scheduler), site)),
            store,
            scheduler,
            clock,
            notifications,
        })
    }
}
