//! 预言机检查器（用于测试，无需网络）
//!
//! 按 ID 给出在线/下线/不可达，并记录检查顺序。

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CheckOutcome, LivenessCheck};

/// 预言机：集合内的 ID 在线，其余返回 404
#[derive(Debug, Default)]
pub struct OracleChecker {
    live: HashSet<u64>,
    unreachable: HashSet<u64>,
    checked: Mutex<Vec<u64>>,
}

impl OracleChecker {
    pub fn new(live: impl IntoIterator<Item = u64>) -> Self {
        Self {
            live: live.into_iter().collect(),
            ..Default::default()
        }
    }

    /// 指定一组模拟传输失败的 ID
    pub fn with_unreachable(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.unreachable = ids.into_iter().collect();
        self
    }

    /// 已检查过的 ID（按检查顺序）
    pub fn checked(&self) -> Vec<u64> {
        self.checked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LivenessCheck for OracleChecker {
    async fn check(&self, job_id: u64, _url: &str) -> CheckOutcome {
        self.checked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job_id);

        if self.unreachable.contains(&job_id) {
            CheckOutcome::Unreachable("connection reset".to_string())
        } else if self.live.contains(&job_id) {
            CheckOutcome::Live
        } else {
            CheckOutcome::NotLive { status: 404 }
        }
    }
}
