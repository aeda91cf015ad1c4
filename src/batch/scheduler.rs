//! 延迟批量调度器
//!
//! 每个批量是一个独立的 tokio 任务：按延迟表等待 → 探测 → 回写游标 → 通知会话。
//! 任务可通过 `BatchHandle` 单独取消，也会随关闭令牌统一取消；结果可 await 观察。
//! 任务失败只记录日志并通知会话，不会影响其他会话的任务。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::delay::DelayTable;
use crate::core::JobError;
use crate::cursor::{ConversationId, CursorStore};
use crate::prober::{ProbeResult, Prober};
use crate::progression::Reservation;

/// 批量任务 ID
pub type BatchId = String;

/// 回写方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// 取 max(当前, 探测结果)，游标永不后退，期间的单链接推进不会丢失
    ///
    /// 探测从预留起点扫描，不跳过等待期间发给单链接的 ID：
    /// 预留区间内有 ID 不在线时，同一个 ID 可能既作为单链接发出，又出现在批量结果里。
    #[default]
    Monotonic,
    /// 无条件覆盖为探测结果，期间的单链接推进会被丢弃
    LastWriteWins,
}

/// 批量任务结束方式
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// 探测完成，`rendered` 为发给会话的文本
    Ready {
        rendered: String,
        result: ProbeResult,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

/// 批量完成通知（前端据此回调 batch_ready）
#[derive(Debug, Clone)]
pub struct BatchNotification {
    pub batch_id: BatchId,
    pub conversation_id: ConversationId,
    pub count: u32,
    pub outcome: BatchOutcome,
}

/// 已调度批量的句柄：可取消，可等待结果
#[derive(Debug)]
pub struct BatchHandle {
    id: BatchId,
    token: CancellationToken,
    join: JoinHandle<Result<ProbeResult, JobError>>,
}

impl BatchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 等待任务结束
    pub async fn join(self) -> Result<ProbeResult, JobError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(JobError::TaskAborted(e.to_string())),
        }
    }
}

/// 调度器共享的内部状态（任务内也持有一份）
struct Shared {
    prober: Arc<Prober>,
    store: Arc<dyn CursorStore>,
    reconcile: ReconcileMode,
    notification_tx: mpsc::UnboundedSender<BatchNotification>,
    /// 未结束的批量
    pending: RwLock<HashMap<BatchId, CancellationToken>>,
}

/// 延迟批量调度器
pub struct BatchScheduler {
    shared: Arc<Shared>,
    delays: DelayTable,
    shutdown: CancellationToken,
}

impl BatchScheduler {
    /// 创建调度器，返回调度器与通知接收端
    ///
    /// `shutdown` 被取消时所有未完成批量随之取消。
    pub fn new(
        prober: Arc<Prober>,
        store: Arc<dyn CursorStore>,
        delays: DelayTable,
        reconcile: ReconcileMode,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<BatchNotification>) {
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::new(Shared {
                    prober,
                    store,
                    reconcile,
                    notification_tx,
                    pending: RwLock::new(HashMap::new()),
                }),
                delays,
                shutdown,
            },
            notification_rx,
        )
    }

    pub fn delays(&self) -> &DelayTable {
        &self.delays
    }

    /// 调度一次批量探测
    ///
    /// 批量大小不在延迟表中时立即返回错误，不启动任务。
    pub async fn schedule(&self, reservation: Reservation) -> Result<BatchHandle, JobError> {
        let delay = self
            .delays
            .delay_for(reservation.count)
            .ok_or(JobError::UnsupportedBatchSize(reservation.count))?;

        let batch_id = format!("batch_{}", uuid::Uuid::new_v4());
        let token = self.shutdown.child_token();

        self.shared
            .pending
            .write()
            .await
            .insert(batch_id.clone(), token.clone());

        tracing::info!(
            "Scheduled {} for conversation {}: start={} count={} delay={:?}",
            batch_id,
            reservation.conversation_id,
            reservation.start_id,
            reservation.count,
            delay
        );

        let shared = Arc::clone(&self.shared);
        let task_id = batch_id.clone();
        let task_token = token.clone();
        let join = tokio::spawn(async move {
            // 批量主体跑在内层任务里，panic 在这里转为 TaskAborted
            let body = tokio::spawn({
                let shared = Arc::clone(&shared);
                let reservation = reservation.clone();
                async move { run_batch(&shared, &reservation, delay, &task_token).await }
            });
            let result = match body.await {
                Ok(result) => result,
                Err(e) => Err(JobError::TaskAborted(e.to_string())),
            };
            shared.pending.write().await.remove(&task_id);
            shared.finish(task_id, reservation, &result);
            result
        });

        Ok(BatchHandle {
            id: batch_id,
            token,
            join,
        })
    }

    /// 未完成的批量数
    pub async fn pending_count(&self) -> usize {
        self.shared.pending.read().await.len()
    }

    /// 取消所有未完成批量，返回取消数量
    pub async fn cancel_all(&self) -> usize {
        let pending = self.shared.pending.read().await;
        for token in pending.values() {
            token.cancel();
        }
        pending.len()
    }
}

/// 等待 → 探测 → 回写
async fn run_batch(
    shared: &Shared,
    reservation: &Reservation,
    delay: std::time::Duration,
    token: &CancellationToken,
) -> Result<ProbeResult, JobError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => return Err(JobError::Cancelled),
        _ = tokio::time::sleep(delay) => {}
    }

    let result = shared
        .prober
        .probe(reservation.start_id, reservation.count, token)
        .await?;

    shared.reconcile(reservation, &result).await;
    Ok(result)
}

impl Shared {
    /// 将探测结果回写到会话游标；会话已不存在时为空操作
    async fn reconcile(&self, reservation: &Reservation, result: &ProbeResult) {
        let Some(handle) = self.store.get(&reservation.conversation_id).await else {
            tracing::debug!(
                "Conversation {} no longer has a cursor, skipping reconcile",
                reservation.conversation_id
            );
            return;
        };

        let mut state = handle.lock().await;
        let before = state.next_id;
        match self.reconcile {
            ReconcileMode::Monotonic => {
                state.raise_next_id(result.next_id);
            }
            ReconcileMode::LastWriteWins => {
                if result.next_id < before {
                    tracing::warn!(
                        "Conversation {}: overwriting cursor {} with {}, intervening advances discarded",
                        reservation.conversation_id,
                        before,
                        result.next_id
                    );
                }
                state.set_next_id(result.next_id);
            }
        }
        state.record_issued(reservation.count as u64);

        tracing::info!(
            "Reconciled conversation {}: cursor {} -> {} ({} scanned)",
            reservation.conversation_id,
            before,
            state.next_id,
            result.scanned
        );
    }

    fn finish(
        &self,
        batch_id: BatchId,
        reservation: Reservation,
        result: &Result<ProbeResult, JobError>,
    ) {
        let outcome = match result {
            Ok(result) => BatchOutcome::Ready {
                rendered: result.render(),
                result: result.clone(),
            },
            Err(JobError::Cancelled) => {
                tracing::warn!(
                    "{} cancelled, reservation [{}, {}) for conversation {} is lost",
                    batch_id,
                    reservation.start_id,
                    reservation.start_id.saturating_add(reservation.count as u64),
                    reservation.conversation_id
                );
                BatchOutcome::Cancelled
            }
            Err(e) => {
                tracing::error!("{} failed: {}", batch_id, e);
                BatchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let notification = BatchNotification {
            batch_id,
            conversation_id: reservation.conversation_id,
            count: reservation.count,
            outcome,
        };
        let _ = self.notification_tx.send(notification);
    }
}

/// 关闭时取消未完成批量
pub struct SchedulerCleanup {
    scheduler: Arc<BatchScheduler>,
}

impl SchedulerCleanup {
    pub fn new(scheduler: Arc<BatchScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait::async_trait]
impl crate::core::shutdown::ShutdownCleanup for SchedulerCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        let cancelled = self.scheduler.cancel_all().await;
        if cancelled > 0 {
            tracing::warn!("Cancelled {} pending batch(es) on shutdown", cancelled);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "BatchScheduler"
    }
}
