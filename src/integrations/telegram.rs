//! Telegram Bot API 集成（长轮询）
//!
//! 通过 getUpdates 接收命令与键盘回调，调用 JobBot 后用 sendMessage 回复；
//! 批量完成通知由独立任务从通知通道取出并发送到对应会话（chat id 即会话 ID）。
//! 同一 chat 的更新按到达顺序串行处理。
//!
//! 命令：/start、/help、/checkjobs；回调数据：more_<n>

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::batch::BatchNotification;
use crate::bot::JobBot;
use crate::core::JobError;
use crate::replies::{Keyboard, OutgoingMessage};

const API_BASE: &str = "https://api.telegram.org";

/// 轮询出错后的退避时间
const RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// 会话队列空闲多久后回收
const CHAT_IDLE: Duration = Duration::from_secs(300);

/// Bot API 统一响应
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// 更新所属的 chat id（回调取其原消息的 chat）
    pub fn chat_id(&self) -> Option<i64> {
        if let Some(message) = &self.message {
            return Some(message.chat.id);
        }
        self.callback_query
            .as_ref()
            .and_then(|q| q.message.as_ref())
            .map(|m| m.chat.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<Message>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

impl From<&Keyboard> for InlineKeyboardMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        Self {
            inline_keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| InlineKeyboardButton {
                            text: b.label.clone(),
                            callback_data: b.callback_data.clone(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

/// 机器人命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    CheckJobs,
}

/// 解析消息中的命令（支持 `/checkjobs@SomeBot` 形式）
pub fn parse_command(text: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name.to_ascii_lowercase().as_str() {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "checkjobs" => Some(Command::CheckJobs),
        _ => None,
    }
}

/// Bot API 客户端
pub struct TelegramClient {
    http: Client,
    api_base: String,
}

impl TelegramClient {
    /// `poll_timeout_secs` 为长轮询时长，HTTP 超时在此基础上留出余量
    pub fn new(token: &str, poll_timeout_secs: u64) -> Result<Self, JobError> {
        Self::with_api_base(API_BASE, token, poll_timeout_secs)
    }

    pub fn with_api_base(api_base: &str, token: &str, poll_timeout_secs: u64) -> Result<Self, JobError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()
            .map_err(|e| JobError::Telegram(e.to_string()))?;
        Ok(Self {
            http,
            api_base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
    ) -> Result<T, JobError> {
        let url = format!("{}/{}", self.api_base, method);
        let resp: ApiResponse<T> = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| JobError::Telegram(format!("{}: {}", method, e.without_url())))?
            .json()
            .await
            .map_err(|e| JobError::Telegram(format!("{}: {}", method, e.without_url())))?;

        if resp.error_code == Some(401) {
            return Err(JobError::Config("bot token rejected by Telegram".to_string()));
        }
        match (resp.ok, resp.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(JobError::Telegram(format!(
                "{}: {}",
                method,
                resp.description.unwrap_or_else(|| "unknown error".to_string())
            ))),
        }
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, JobError> {
        let req = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message", "callback_query"],
        };
        self.call("getUpdates", &req).await
    }

    pub async fn send_message(&self, chat_id: i64, message: &OutgoingMessage) -> Result<(), JobError> {
        let req = SendMessageRequest {
            chat_id,
            text: &message.text,
            reply_markup: message.keyboard.as_ref().map(InlineKeyboardMarkup::from),
        };
        let _: serde_json::Value = self.call("sendMessage", &req).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), JobError> {
        let req = AnswerCallbackRequest { callback_query_id };
        let _: bool = self.call("answerCallbackQuery", &req).await?;
        Ok(())
    }
}

async fn send_all(client: &TelegramClient, chat_id: i64, messages: &[OutgoingMessage]) {
    for message in messages {
        if let Err(e) = client.send_message(chat_id, message).await {
            tracing::error!("Failed to send Telegram message to {}: {}", chat_id, e);
        }
    }
}

/// 处理单个更新
async fn handle_update(bot: &JobBot, client: &TelegramClient, update: Update) {
    if let Some(query) = update.callback_query {
        if let Err(e) = client.answer_callback_query(&query.id).await {
            tracing::warn!("answerCallbackQuery failed: {}", e);
        }
        let (Some(message), Some(data)) = (query.message, query.data) else {
            return;
        };
        let chat_id = message.chat.id;
        let replies = bot.on_callback(&chat_id.to_string(), &data).await;
        send_all(client, chat_id, &replies).await;
        return;
    }

    let Some(message) = update.message else {
        return;
    };
    let Some(command) = message.text.as_deref().and_then(parse_command) else {
        return;
    };

    let chat_id = message.chat.id;
    let conversation_id = chat_id.to_string();
    let replies = match command {
        Command::Start => bot.on_start(&conversation_id).await,
        Command::Help => bot.on_help(),
        Command::CheckJobs => bot.on_advance(&conversation_id).await,
    };
    send_all(client, chat_id, &replies).await;
}

/// 按会话排队的更新分发
///
/// 同一 chat 的更新由一个工作任务按到达顺序串行处理，不同 chat 之间并发；
/// 工作任务空闲 `CHAT_IDLE` 后退出，下一条更新到来时重建。
struct ChatQueues<H> {
    handler: H,
    queues: HashMap<i64, mpsc::UnboundedSender<Update>>,
}

impl<H, Fut> ChatQueues<H>
where
    H: Fn(Update) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn new(handler: H) -> Self {
        Self {
            handler,
            queues: HashMap::new(),
        }
    }

    fn dispatch(&mut self, update: Update) {
        let Some(chat_id) = update.chat_id() else {
            tokio::spawn((self.handler)(update));
            return;
        };

        let update = match self.queues.get(&chat_id) {
            Some(tx) => match tx.send(update) {
                Ok(()) => return,
                Err(mpsc::error::SendError(update)) => update,
            },
            None => update,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(update);
        tokio::spawn(chat_worker(rx, self.handler.clone()));
        self.queues.insert(chat_id, tx);
    }

    /// 移除已退出的工作任务
    fn prune(&mut self) {
        self.queues.retain(|_, tx| !tx.is_closed());
    }
}

async fn chat_worker<H, Fut>(mut rx: mpsc::UnboundedReceiver<Update>, handler: H)
where
    H: Fn(Update) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        match tokio::time::timeout(CHAT_IDLE, rx.recv()).await {
            Ok(Some(update)) => handler(update).await,
            Ok(None) => break,
            Err(_) => {
                // 关闭后仍需处理已入队的更新
                rx.close();
                while let Ok(update) = rx.try_recv() {
                    handler(update).await;
                }
                break;
            }
        }
    }
}

/// 长轮询主循环，直到令牌取消；令牌被拒时返回错误
pub async fn run_polling(
    bot: Arc<JobBot>,
    client: Arc<TelegramClient>,
    poll_timeout_secs: u64,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let client_for_updates = Arc::clone(&client);
    let mut offset: Option<i64> = None;
    let mut queues = ChatQueues::new(move |update: Update| {
        let bot = Arc::clone(&bot);
        let client = Arc::clone(&client_for_updates);
        async move { handle_update(&bot, &client, update).await }
    });
    tracing::info!("Telegram polling started");

    loop {
        let updates = tokio::select! {
            _ = token.cancelled() => break,
            updates = client.get_updates(offset, poll_timeout_secs) => updates,
        };

        match updates {
            Ok(updates) => {
                queues.prune();
                for update in updates {
                    offset = Some(update.update_id + 1);
                    queues.dispatch(update);
                }
            }
            Err(e @ JobError::Config(_)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!("getUpdates failed: {}, retrying in {:?}", e, RETRY_BACKOFF);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                }
            }
        }
    }

    tracing::info!("Telegram polling stopped");
    Ok(())
}

/// 把批量完成通知投递到会话（batch_ready 回调）
pub fn spawn_notification_delivery(
    client: Arc<TelegramClient>,
    mut notifications: mpsc::UnboundedReceiver<BatchNotification>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let notification = tokio::select! {
                _ = token.cancelled() => break,
                n = notifications.recv() => match n {
                    Some(n) => n,
                    None => break,
                },
            };

            let Some(message) = JobBot::render_notification(&notification) else {
                continue;
            };
            let Ok(chat_id) = notification.conversation_id.parse::<i64>() else {
                tracing::warn!(
                    "Conversation {} is not a Telegram chat id, dropping batch result",
                    notification.conversation_id
                );
                continue;
            };
            send_all(&client, chat_id, std::slice::from_ref(&message)).await;
        }
    })
}
