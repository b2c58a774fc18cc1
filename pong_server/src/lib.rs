//! Authoritative real-time Pong server. The composition root wires the
//! singletons once; connection handlers, the tick loop and the health
//! endpoint all share them through [`AppState`].

use std::sync::Arc;

pub mod broadcaster;
pub mod config;
pub mod engine;
pub mod health;
pub mod hub;
pub mod input_cache;
pub mod match_queue;
pub mod scheduler;
pub mod session_store;

use broadcaster::Broadcaster;
use input_cache::InputCache;
use match_queue::MatchQueue;
use session_store::SessionStore;

pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub queue: Arc<MatchQueue>,
    pub inputs: Arc<InputCache>,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    pub fn new(queue: MatchQueue) -> Arc<Self> {
        Arc::new(Self {
            sessions: Arc::new(SessionStore::new()),
            queue: Arc::new(queue),
            inputs: Arc::new(InputCache::new()),
            broadcaster: Arc::new(Broadcaster::new()),
        })
    }
}
