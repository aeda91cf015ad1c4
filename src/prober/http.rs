//! 基于 reqwest 的 HTTP 存在性检查：GET 带固定超时与 User-Agent，仅 200 视为在线

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{CheckOutcome, LivenessCheck};
use crate::core::JobError;

/// HTTP 在线检查
pub struct HttpLivenessChecker {
    client: Client,
}

impl HttpLivenessChecker {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, JobError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LivenessCheck for HttpLivenessChecker {
    async fn check(&self, _job_id: u64, url: &str) -> CheckOutcome {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => CheckOutcome::Live,
            Ok(resp) => CheckOutcome::NotLive {
                status: resp.status().as_u16(),
            },
            Err(e) if e.is_timeout() => CheckOutcome::Unreachable("timeout".to_string()),
            Err(e) => CheckOutcome::Unreachable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let checker = HttpLivenessChecker::new(1, "Mozilla/5.0").unwrap();
        // 端口 1 上没有服务
        let outcome = checker.check(1, "http://127.0.0.1:1/jobs/1").await;
        assert!(matches!(outcome, CheckOutcome::Unreachable(_)));
        assert!(!outcome.is_live());
    }
}
