//! 机器人核心入口：前端（Telegram 等）只通过这里调用进度与批量逻辑
//!
//! - `on_start` / `on_help`：欢迎与帮助
//! - `on_advance`：发放下一个链接，并附带批量选择键盘
//! - `on_request_batch`：预留区间并调度延迟批量
//! - `render_notification`：把批量完成通知渲染成发给会话的消息（即 batch_ready）

use std::sync::Arc;

use crate::batch::{BatchHandle, BatchNotification, BatchOutcome, BatchScheduler};
use crate::core::JobError;
use crate::prober::JobSite;
use crate::progression::ProgressionPolicy;
use crate::replies::{self, OutgoingMessage};

/// 机器人核心
pub struct JobBot {
    policy: ProgressionPolicy,
    scheduler: Arc<BatchScheduler>,
    site: JobSite,
}

impl JobBot {
    pub fn new(policy: ProgressionPolicy, scheduler: Arc<BatchScheduler>, site: JobSite) -> Self {
        Self {
            policy,
            scheduler,
            site,
        }
    }

    pub fn policy(&self) -> &ProgressionPolicy {
        &self.policy
    }

    pub fn scheduler(&self) -> &Arc<BatchScheduler> {
        &self.scheduler
    }

    pub async fn on_start(&self, conversation_id: &str) -> Vec<OutgoingMessage> {
        self.policy.touch(conversation_id).await;
        vec![OutgoingMessage::text(replies::welcome())]
    }

    pub fn on_help(&self) -> Vec<OutgoingMessage> {
        vec![OutgoingMessage::text(replies::help())]
    }

    /// 单链接请求：立即回复下一个链接，再给出批量选择键盘
    pub async fn on_advance(&self, conversation_id: &str) -> Vec<OutgoingMessage> {
        let job_id = self.policy.next_single(conversation_id).await;
        let url = self.site.url_for(job_id);
        tracing::info!("Conversation {} -> job {}", conversation_id, job_id);

        vec![
            OutgoingMessage::text(replies::job_link(&url)),
            OutgoingMessage::text(replies::batch_prompt())
                .with_keyboard(replies::batch_keyboard(&self.scheduler.delays().counts())),
        ]
    }

    /// 批量请求：先校验批量大小，再预留区间并调度
    ///
    /// 不支持的大小不会产生预留。
    pub async fn on_request_batch(
        &self,
        conversation_id: &str,
        count: u32,
    ) -> Result<(BatchHandle, OutgoingMessage), JobError> {
        if !self.scheduler.delays().supports(count) {
            return Err(JobError::UnsupportedBatchSize(count));
        }

        let reservation = self.policy.reserve_batch(conversation_id, count).await;
        let handle = self.scheduler.schedule(reservation).await?;
        Ok((handle, OutgoingMessage::text(replies::batch_ack(count))))
    }

    /// 处理键盘回调（`more_<n>`），返回要回复的消息
    ///
    /// 批量任务在后台运行，结果通过通知通道送达。
    pub async fn on_callback(&self, conversation_id: &str, data: &str) -> Vec<OutgoingMessage> {
        let Some(count) = replies::parse_batch_callback(data) else {
            tracing::debug!("Ignoring callback data {:?}", data);
            return Vec::new();
        };

        match self.on_request_batch(conversation_id, count).await {
            Ok((handle, ack)) => {
                tracing::debug!("{} queued for conversation {}", handle.id(), conversation_id);
                vec![ack]
            }
            Err(JobError::UnsupportedBatchSize(_)) => vec![OutgoingMessage::text(
                replies::unsupported_batch(&self.scheduler.delays().counts()),
            )],
            Err(e) => {
                tracing::error!("Batch request failed for {}: {}", conversation_id, e);
                vec![OutgoingMessage::text(replies::batch_failed(count))]
            }
        }
    }

    /// 批量完成通知 -> 会话消息；被取消的批量（关闭中）不发送
    pub fn render_notification(notification: &BatchNotification) -> Option<OutgoingMessage> {
        match &notification.outcome {
            BatchOutcome::Ready { rendered, .. } => Some(OutgoingMessage::text(rendered.clone())),
            BatchOutcome::Failed { .. } => {
                Some(OutgoingMessage::text(replies::batch_failed(notification.count)))
            }
            BatchOutcome::Cancelled => None,
        }
    }
}
