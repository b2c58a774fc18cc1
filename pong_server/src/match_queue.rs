//! FIFO queue of players waiting for an opponent. Deployments that scale
//! horizontally share the queue through Redis under a single well-known
//! key; the pair pop runs as a server-side script so two instances can
//! never claim the same player. Single-instance deployments (and tests)
//! use the in-process variant with identical semantics.

use std::collections::VecDeque;
use std::sync::Mutex;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

use pong_shared::PlayerId;

pub const QUEUE_KEY: &str = "pong:matchmaking:queue";

/// Pops the two oldest waiting players atomically. Duplicate enqueues of a
/// popped id are stripped, and a lone survivor is pushed back to the head
/// so it keeps its place in line.
const PAIR_POP_SCRIPT: &str = r#"
local a = redis.call('LPOP', KEYS[1])
if not a then return nil end
redis.call('LREM', KEYS[1], 0, a)
local b = redis.call('LPOP', KEYS[1])
if not b then
  redis.call('LPUSH', KEYS[1], a)
  return nil
end
redis.call('LREM', KEYS[1], 0, b)
return {a, b}
"#;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("coordination store error: {0}")]
    Store(#[from] redis::RedisError),
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
}

pub enum MatchQueue {
    Redis(RedisQueue),
    Memory(MemoryQueue),
    /// The store was configured but unreachable at startup. Matchmaking is
    /// refused until a restart; bot matches never touch the queue.
    Unavailable(String),
}

impl MatchQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        Ok(Self::Redis(RedisQueue::connect(url).await?))
    }

    pub fn in_memory() -> Self {
        Self::Memory(MemoryQueue::new())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub async fn enqueue(&self, player: &PlayerId) -> Result<(), QueueError> {
        match self {
            Self::Redis(q) => q.enqueue(player).await,
            Self::Memory(q) => Ok(q.enqueue(player)),
            Self::Unavailable(reason) => Err(QueueError::Unavailable(reason.clone())),
        }
    }

    /// Remove every queued occurrence of the player.
    pub async fn remove(&self, player: &PlayerId) -> Result<(), QueueError> {
        match self {
            Self::Redis(q) => q.remove(player).await,
            Self::Memory(q) => Ok(q.remove(player)),
            Self::Unavailable(reason) => Err(QueueError::Unavailable(reason.clone())),
        }
    }

    /// Atomically claim the two oldest waiting players, or none if fewer
    /// than two are waiting.
    pub async fn pair_pop(&self) -> Result<Option<(PlayerId, PlayerId)>, QueueError> {
        match self {
            Self::Redis(q) => q.pair_pop().await,
            Self::Memory(q) => Ok(q.pair_pop()),
            Self::Unavailable(reason) => Err(QueueError::Unavailable(reason.clone())),
        }
    }

    pub async fn depth(&self) -> Result<usize, QueueError> {
        match self {
            Self::Redis(q) => q.depth().await,
            Self::Memory(q) => Ok(q.depth()),
            Self::Unavailable(reason) => Err(QueueError::Unavailable(reason.clone())),
        }
    }

    /// Health probe for the backing store.
    pub async fn ping(&self) -> Result<(), QueueError> {
        match self {
            Self::Redis(q) => q.ping().await,
            Self::Memory(_) => Ok(()),
            Self::Unavailable(reason) => Err(QueueError::Unavailable(reason.clone())),
        }
    }
}

pub struct RedisQueue {
    conn: ConnectionManager,
    pair_pop: redis::Script,
}

impl RedisQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            pair_pop: redis::Script::new(PAIR_POP_SCRIPT),
        })
    }

    async fn enqueue(&self, player: &PlayerId) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(QUEUE_KEY, player.as_str()).await?;
        Ok(())
    }

    async fn remove(&self, player: &PlayerId) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(QUEUE_KEY, 0, player.as_str()).await?;
        Ok(())
    }

    async fn pair_pop(&self) -> Result<Option<(PlayerId, PlayerId)>, QueueError> {
        let mut conn = self.conn.clone();
        let pair: Option<(String, String)> = self
            .pair_pop
            .key(QUEUE_KEY)
            .invoke_async(&mut conn)
            .await?;
        Ok(pair.map(|(a, b)| (PlayerId::from(a), PlayerId::from(b))))
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(QUEUE_KEY).await?;
        Ok(len)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<VecDeque<PlayerId>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue(&self, player: &PlayerId) {
        self.entries.lock().unwrap().push_back(player.clone());
    }

    fn remove(&self, player: &PlayerId) {
        self.entries.lock().unwrap().retain(|p| p != player);
    }

    fn pair_pop(&self) -> Option<(PlayerId, PlayerId)> {
        let mut entries = self.entries.lock().unwrap();
        let a = entries.pop_front()?;
        entries.retain(|p| *p != a);
        let Some(b) = entries.pop_front() else {
            entries.push_front(a);
            return None;
        };
        entries.retain(|p| *p != b);
        Some((a, b))
    }

    fn depth(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
