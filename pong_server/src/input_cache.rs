//! Latest-wins cache of paddle targets, written by connection handlers and
//! drained by the scheduler each tick. Entries expire after a short TTL so
//! a stale target never moves a paddle long after its sender went quiet.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use pong_shared::{PlayerId, PADDLE_MAX_Y};

pub const INPUT_TTL: Duration = Duration::from_secs(5);

struct CachedTarget {
    target_y: f32,
    received_at: Instant,
}

pub struct InputCache {
    ttl: Duration,
    entries: Mutex<HashMap<PlayerId, CachedTarget>>,
}

impl InputCache {
    pub fn new() -> Self {
        Self::with_ttl(INPUT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store the player's latest target, clamped to the legal paddle range.
    /// Returns the stored value. Non-finite targets are dropped.
    pub fn put(&self, player: &PlayerId, target_y: f32) -> Option<f32> {
        if !target_y.is_finite() {
            return None;
        }
        let clamped = target_y.clamp(0.0, PADDLE_MAX_Y);
        self.entries.lock().unwrap().insert(
            player.clone(),
            CachedTarget {
                target_y: clamped,
                received_at: Instant::now(),
            },
        );
        Some(clamped)
    }

    /// Consume the pending targets for both players of a session. Entries
    /// older than the TTL are treated as absent.
    pub fn take(&self, player1: &PlayerId, player2: &PlayerId) -> (Option<f32>, Option<f32>) {
        let mut entries = self.entries.lock().unwrap();
        let mut take_one = |player: &PlayerId| {
            entries
                .remove(player)
                .filter(|e| e.received_at.elapsed() <= self.ttl)
                .map(|e| e.target_y)
        };
        let y1 = take_one(player1);
        let y2 = take_one(player2);
        (y1, y2)
    }

    /// Drop any pending target for a departed player.
    pub fn remove(&self, player: &PlayerId) {
        self.entries.lock().unwrap().remove(player);
    }
}

impl Default for InputCache {
    fn default() -> Self {
        Self::new()
    }
}
