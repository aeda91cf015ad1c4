//! 进度策略：决定单链接请求与批量请求如何推进游标
//!
//! 两种请求都先做日切追赶；单链接读出当前 ID 后 +1，
//! 批量请求读出起点后立即 +count 作为乐观预留，保证同一会话的并发批量不会重叠。

use std::sync::Arc;

use crate::cursor::{CatchupMode, Clock, ConversationId, CursorStore};

/// 一次批量预留：交给调度器的探测区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub conversation_id: ConversationId,
    pub start_id: u64,
    pub count: u32,
}

/// 进度策略
pub struct ProgressionPolicy {
    store: Arc<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    daily_step: u64,
    catchup_mode: CatchupMode,
}

impl ProgressionPolicy {
    pub fn new(
        store: Arc<dyn CursorStore>,
        clock: Arc<dyn Clock>,
        daily_step: u64,
        catchup_mode: CatchupMode,
    ) -> Self {
        Self {
            store,
            clock,
            daily_step,
            catchup_mode,
        }
    }

    pub fn store(&self) -> &Arc<dyn CursorStore> {
        &self.store
    }

    /// 确保会话游标存在（首次交互时惰性创建）
    pub async fn touch(&self, conversation_id: &str) {
        let _ = self.store.get_or_create(conversation_id, self.clock.now()).await;
    }

    /// 单链接请求：追赶 → 读出 → +1，返回本次发放的 ID
    pub async fn next_single(&self, conversation_id: &str) -> u64 {
        let now = self.clock.now();
        let handle = self.store.get_or_create(conversation_id, now).await;
        let mut state = handle.lock().await;

        let days = state.apply_daily_catchup(now, self.daily_step, self.catchup_mode);
        if days > 0 {
            tracing::info!(
                "Conversation {} caught up {} day(s), cursor now {}",
                conversation_id,
                days,
                state.next_id
            );
        }

        let job_id = state.next_id;
        state.advance_by(1);
        state.record_issued(1);
        job_id
    }

    /// 批量请求：追赶 → 读出起点 → 立即 +count 预留
    ///
    /// 预留在持锁期间完成；若之后批量任务没有完成，预留区间成为永久空洞。
    pub async fn reserve_batch(&self, conversation_id: &str, count: u32) -> Reservation {
        let now = self.clock.now();
        let handle = self.store.get_or_create(conversation_id, now).await;
        let mut state = handle.lock().await;

        let days = state.apply_daily_catchup(now, self.daily_step, self.catchup_mode);
        if days > 0 {
            tracing::info!(
                "Conversation {} caught up {} day(s), cursor now {}",
                conversation_id,
                days,
                state.next_id
            );
        }

        let start_id = state.next_id;
        state.advance_by(count as u64);

        tracing::debug!(
            "Reserved [{}, {}) for conversation {}",
            start_id,
            state.next_id,
            conversation_id
        );

        Reservation {
            conversation_id: conversation_id.to_string(),
            start_id,
            count,
        }
    }
}
