//! In-memory registry of live sessions. The store owns the authoritative
//! game state; handlers and the scheduler share per-session handles and
//! serialize on the session's own lock. A secondary player-id index gives
//! O(1) lookup on the input hot path.
//!
//! Lock order: never hold two session locks, and never take the store lock
//! while holding a session lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use pong_shared::{GameState, PlayerId, SessionId};

/// Identity is immutable for the session's lifetime; only `state` is
/// guarded. `player1` drives the left paddle (side 1), `player2` the right
/// (side 2).
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub state: Mutex<SessionState>,
}

#[derive(Debug)]
pub struct SessionState {
    pub game: GameState,
    pub last_update: Instant,
    pub last_client_sync: Instant,
}

impl Session {
    pub fn new(player1: PlayerId, player2: PlayerId, game: GameState) -> Self {
        let now = Instant::now();
        Self {
            id: SessionId::from_pair(&player1, &player2),
            player1,
            player2,
            state: Mutex::new(SessionState {
                game,
                last_update: now,
                last_client_sync: now,
            }),
        }
    }

    pub fn opponent_of(&self, player: &PlayerId) -> Option<&PlayerId> {
        if *player == self.player1 {
            Some(&self.player2)
        } else if *player == self.player2 {
            Some(&self.player1)
        } else {
            None
        }
    }

    /// 1 for the left seat, 2 for the right.
    pub fn side_of(&self, player: &PlayerId) -> Option<u8> {
        if *player == self.player1 {
            Some(1)
        } else if *player == self.player2 {
            Some(2)
        } else {
            None
        }
    }

    pub fn is_bot_match(&self) -> bool {
        self.player2.is_bot()
    }
}

pub type SharedSession = Arc<Session>;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("player {0} already has an active session")]
    PlayerBusy(PlayerId),
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, SharedSession>,
    by_player: HashMap<PlayerId, SessionId>,
}

#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails if either participant is already indexed.
    pub async fn create(&self, session: Session) -> Result<SharedSession, SessionStoreError> {
        let mut inner = self.inner.write().await;
        for player in [&session.player1, &session.player2] {
            if inner.by_player.contains_key(player) {
                return Err(SessionStoreError::PlayerBusy(player.clone()));
            }
        }
        let shared = Arc::new(session);
        inner
            .by_player
            .insert(shared.player1.clone(), shared.id.clone());
        inner
            .by_player
            .insert(shared.player2.clone(), shared.id.clone());
        inner.sessions.insert(shared.id.clone(), shared.clone());
        Ok(shared)
    }

    pub async fn get_by_id(&self, id: &SessionId) -> Option<SharedSession> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    pub async fn get_by_player(&self, player: &PlayerId) -> Option<SharedSession> {
        let inner = self.inner.read().await;
        let id = inner.by_player.get(player)?;
        inner.sessions.get(id).cloned()
    }

    pub async fn session_id_for(&self, player: &PlayerId) -> Option<SessionId> {
        self.inner.read().await.by_player.get(player).cloned()
    }

    pub async fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.remove(id)?;
        inner.by_player.remove(&session.player1);
        inner.by_player.remove(&session.player2);
        Some(session)
    }

    /// Caller-owned list of handles, safe to iterate without the store lock.
    pub async fn snapshot(&self) -> Vec<SharedSession> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    /// Finished sessions are removed promptly, so the map size is the
    /// active game count.
    pub async fn count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}
