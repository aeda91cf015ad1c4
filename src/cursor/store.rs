//! 游标存储抽象层
//!
//! 以会话 ID 为键保存游标；每个游标包在独立的 `tokio::sync::Mutex` 里，
//! 作为该会话的串行化令牌：预留与回写都必须持有它，但绝不跨网络 I/O 持有。
//!
//! 内存实现支持按空闲时长（TTL）与最大会话数淘汰。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::state::CursorState;

/// 会话 ID（前端的 chat id，整数或字符串统一转成字符串）
pub type ConversationId = String;

/// 游标句柄：持锁即获得该会话的独占修改权
pub type CursorHandle = Arc<Mutex<CursorState>>;

/// 游标存储接口
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// 获取或创建会话游标（新游标从全局起始 ID 开始，追赶基准为 `now`）
    async fn get_or_create(&self, conversation_id: &str, now: DateTime<Utc>) -> CursorHandle;

    /// 获取已存在的会话游标，不创建
    async fn get(&self, conversation_id: &str) -> Option<CursorHandle>;

    async fn remove(&self, conversation_id: &str) -> bool;

    /// 淘汰空闲过期的会话，返回淘汰数量
    async fn evict_expired(&self, now: DateTime<Utc>) -> usize;

    async fn len(&self) -> usize;

    /// 当前游标的快照
    async fn snapshot(&self, conversation_id: &str) -> Option<CursorState> {
        let handle = self.get(conversation_id).await?;
        let state = handle.lock().await.clone();
        Some(state)
    }
}

struct Entry {
    cursor: CursorHandle,
    last_seen: DateTime<Utc>,
}

impl Entry {
    /// 有人持有句柄（如正在预留）时不淘汰
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.cursor) > 1
    }
}

/// 内存游标存储
pub struct MemoryCursorStore {
    entries: RwLock<HashMap<ConversationId, Entry>>,
    start_id: u64,
    idle_ttl: Option<Duration>,
    max_conversations: Option<usize>,
}

impl MemoryCursorStore {
    /// 不淘汰的存储（进程生命周期内无限增长）
    pub fn new(start_id: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            start_id,
            idle_ttl: None,
            max_conversations: None,
        }
    }

    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    pub fn with_max_conversations(mut self, max: usize) -> Self {
        self.max_conversations = Some(max.max(1));
        self
    }

    /// 淘汰最久未访问且未被占用的会话
    fn evict_lru(entries: &mut HashMap<ConversationId, Entry>) -> Option<ConversationId> {
        let victim = entries
            .iter()
            .filter(|(_, e)| !e.in_use())
            .min_by_key(|(_, e)| e.last_seen)
            .map(|(id, _)| id.clone())?;
        entries.remove(&victim);
        Some(victim)
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get_or_create(&self, conversation_id: &str, now: DateTime<Utc>) -> CursorHandle {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(conversation_id) {
            entry.last_seen = now;
            return Arc::clone(&entry.cursor);
        }

        if let Some(max) = self.max_conversations {
            while entries.len() >= max {
                match Self::evict_lru(&mut entries) {
                    Some(victim) => tracing::debug!("Evicted cursor for conversation {}", victim),
                    None => break,
                }
            }
        }

        let cursor = Arc::new(Mutex::new(CursorState::new(self.start_id, now)));
        entries.insert(
            conversation_id.to_string(),
            Entry {
                cursor: Arc::clone(&cursor),
                last_seen: now,
            },
        );
        tracing::debug!(
            "Created cursor for conversation {} at {}",
            conversation_id,
            self.start_id
        );
        cursor
    }

    async fn get(&self, conversation_id: &str) -> Option<CursorHandle> {
        self.entries
            .read()
            .await
            .get(conversation_id)
            .map(|e| Arc::clone(&e.cursor))
    }

    async fn remove(&self, conversation_id: &str) -> bool {
        self.entries.write().await.remove(conversation_id).is_some()
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let mut entries = self.entries.write().await;
        let expired: Vec<_> = entries
            .iter()
            .filter(|(_, e)| !e.in_use() && now - e.last_seen > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            entries.remove(id);
        }

        expired.len()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// 创建游标存储（按配置决定是否启用淘汰）
pub fn create_cursor_store(
    start_id: u64,
    idle_ttl_secs: Option<u64>,
    max_conversations: Option<usize>,
) -> Arc<dyn CursorStore> {
    let mut store = MemoryCursorStore::new(start_id);
    if let Some(secs) = idle_ttl_secs {
        store = store.with_idle_ttl(Duration::seconds(secs as i64));
    }
    if let Some(max) = max_conversations {
        store = store.with_max_conversations(max);
    }
    if idle_ttl_secs.is_none() && max_conversations.is_none() {
        tracing::info!("Using unbounded in-memory cursor store");
    }
    Arc::new(store)
}

/// 后台定期清理过期会话，直到 token 被取消
pub fn spawn_sweeper(
    store: Arc<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    interval: StdDuration,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = store.evict_expired(clock.now()).await;
                    if evicted > 0 {
                        tracing::info!("Evicted {} idle conversation cursors", evicted);
                    }
                }
            }
        }
    })
}
