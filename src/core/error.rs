//! 核心错误类型
//!
//! 探测失败（超时、连接错误、非 200）不在此列：它们在 Prober 内部被视为「不在线」直接跳过。
//! 这里只收录会中断一次批量任务或一次前端请求的错误。

use thiserror::Error;

/// 进度推进、批量探测与前端交互中可能出现的错误
#[derive(Error, Debug)]
pub enum JobError {
    /// 批量任务在等待或探测过程中被取消（关闭或显式取消）
    #[error("Batch cancelled")]
    Cancelled,

    /// 批量大小不在延迟表中
    #[error("Unsupported batch size: {0}")]
    UnsupportedBatchSize(u32),

    /// HTTP 客户端构建失败、ID 空间耗尽等探测器级别错误（单个 ID 的失败不会走到这里）
    #[error("Probe error: {0}")]
    Probe(String),

    /// 后台任务 panic 或被运行时中止
    #[error("Batch task aborted: {0}")]
    TaskAborted(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Telegram API error: {0}")]
    Telegram(String),
}

impl From<config::ConfigError> for JobError {
    fn from(e: config::ConfigError) -> Self {
        JobError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for JobError {
    fn from(e: reqwest::Error) -> Self {
        JobError::Probe(e.to_string())
    }
}
