//! The tick loop driving every live session. One long-running task walks a
//! snapshot of the store each cycle, applies pending inputs, advances the
//! engine with a fixed delta and decides what to broadcast. The cadence
//! adapts to load; the physics step never stretches to cover a late tick,
//! so a slow cycle simulates slower rather than jumping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info};

use pong_shared::{GameState, ServerMessage};

use crate::broadcaster::Broadcaster;
use crate::engine::{self, Engine, Integrity};
use crate::input_cache::InputCache;
use crate::session_store::{SessionStore, SharedSession};
use crate::AppState;

pub const BASE_TICK: Duration = Duration::from_millis(33);
pub const RELAXED_TICK: Duration = Duration::from_millis(66);
pub const IDLE_TICK: Duration = Duration::from_millis(500);
pub const ERROR_BACKOFF: Duration = Duration::from_millis(100);
pub const CLIENT_SYNC: Duration = Duration::from_millis(100);
/// Fixed simulation step in seconds, independent of wall-clock drift.
pub const DELTA_TIME: f32 = 0.033;

/// Below this many sessions the loop relaxes to the slower cadence.
const RELAXED_THRESHOLD: usize = 3;

pub struct Scheduler {
    sessions: Arc<SessionStore>,
    inputs: Arc<InputCache>,
    broadcaster: Arc<Broadcaster>,
    engine: Engine,
    base_tick: Duration,
    client_sync: Duration,
    shutdown: watch::Receiver<bool>,
}

struct TickReport {
    active: usize,
    had_error: bool,
}

enum SessionTick {
    /// Not ready or already concluded; left untouched.
    Skipped,
    Stepped,
    /// Game over this tick; remove after the final broadcast.
    Finished,
    /// Invariant violation forced the session closed.
    Aborted,
}

impl Scheduler {
    pub fn new(app: &AppState, engine: Engine, shutdown: watch::Receiver<bool>) -> Self {
        Self::with_timing(app, engine, BASE_TICK, CLIENT_SYNC, shutdown)
    }

    pub fn with_timing(
        app: &AppState,
        engine: Engine,
        base_tick: Duration,
        client_sync: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sessions: app.sessions.clone(),
            inputs: app.inputs.clone(),
            broadcaster: app.broadcaster.clone(),
            engine,
            base_tick,
            client_sync,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("scheduler started");
        while !*self.shutdown.borrow() {
            let report = self.tick().await;
            let cadence = if report.had_error {
                ERROR_BACKOFF
            } else if report.active == 0 {
                IDLE_TICK
            } else if report.active < RELAXED_THRESHOLD {
                RELAXED_TICK
            } else {
                self.base_tick
            };

            tokio::select! {
                _ = tokio::time::sleep(cadence) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        // Drain one last tick, then end every surviving game.
        self.tick().await;
        self.terminate_all().await;
        info!("scheduler stopped");
    }

    async fn tick(&mut self) -> TickReport {
        let sessions = self.sessions.snapshot().await;
        let mut report = TickReport {
            active: sessions.len(),
            had_error: false,
        };
        let mut finished = Vec::new();

        for session in sessions {
            match self.step_session(&session).await {
                SessionTick::Skipped | SessionTick::Stepped => {}
                SessionTick::Finished => finished.push(session),
                SessionTick::Aborted => {
                    report.had_error = true;
                    finished.push(session);
                }
            }
        }

        report.active -= finished.len();
        for session in finished {
            self.sessions.remove(&session.id).await;
        }
        report
    }

    async fn step_session(&mut self, session: &SharedSession) -> SessionTick {
        let mut update: Option<GameState> = None;
        let outcome = {
            let mut state = session.state.lock().await;
            if state.game.game_over || !state.game.players_ready() {
                return SessionTick::Skipped;
            }

            let (y1, y2) = self.inputs.take(&session.player1, &session.player2);
            if let Some(y) = y1 {
                state.game.left_paddle_target_y = y;
            }
            if session.player2.is_bot() {
                engine::update_bot_target(&mut state.game);
            } else if let Some(y) = y2 {
                state.game.right_paddle_target_y = y;
            }

            let before = Observed::capture(&state.game);
            self.engine.step(&mut state.game, DELTA_TIME);
            let integrity = engine::sanitize(&mut state.game);
            match integrity {
                Integrity::Clean => {}
                Integrity::Repaired => {
                    error!(session = %session.id, "repaired out-of-range game state")
                }
                Integrity::Aborted => {
                    error!(session = %session.id, "session aborted on invariant violation")
                }
            }

            let now = Instant::now();
            match before.classify(&state.game) {
                Change::Critical => {
                    state.last_update = now;
                    state.last_client_sync = now;
                    update = Some(state.game.clone());
                }
                Change::Motion => {
                    state.last_update = now;
                    if now.duration_since(state.last_client_sync) >= self.client_sync {
                        state.last_client_sync = now;
                        update = Some(state.game.clone());
                    }
                }
                Change::None => {}
            }

            if integrity == Integrity::Aborted {
                SessionTick::Aborted
            } else if state.game.game_over {
                SessionTick::Finished
            } else {
                SessionTick::Stepped
            }
        };

        // Lock released; hand off to the per-connection channels.
        if let Some(state) = update {
            self.broadcast(session, &ServerMessage::GameUpdate(state)).await;
        }
        outcome
    }

    /// Graceful-shutdown path: every remaining session ends undecided and
    /// gets one terminal update.
    async fn terminate_all(&mut self) {
        let sessions = self.sessions.snapshot().await;
        if sessions.is_empty() {
            return;
        }
        info!(count = sessions.len(), "terminating remaining sessions");
        for session in sessions {
            let state = {
                let mut state = session.state.lock().await;
                if !state.game.game_over {
                    state.game.game_over = true;
                    state.game.winner = 0;
                }
                state.game.sequence_number += 1;
                state.game.clone()
            };
            self.broadcast(&session, &ServerMessage::GameUpdate(state)).await;
            self.sessions.remove(&session.id).await;
        }
    }

    async fn broadcast(&self, session: &SharedSession, message: &ServerMessage) {
        for player in [&session.player1, &session.player2] {
            if !player.is_bot() {
                self.broadcaster.send(player, message).await;
            }
        }
    }
}

struct Observed {
    ball: (f32, f32),
    left_y: f32,
    right_y: f32,
    left_score: u32,
    right_score: u32,
    game_over: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    /// Score or game-over transition: broadcast immediately.
    Critical,
    /// Ball or paddle movement: broadcast on the client-sync cadence.
    Motion,
    None,
}

impl Observed {
    fn capture(game: &GameState) -> Self {
        Self {
            ball: (game.ball.x, game.ball.y),
            left_y: game.left_paddle.y,
            right_y: game.right_paddle.y,
            left_score: game.left_score,
            right_score: game.right_score,
            game_over: game.game_over,
        }
    }

    fn classify(&self, game: &GameState) -> Change {
        if game.left_score != self.left_score
            || game.right_score != self.right_score
            || game.game_over != self.game_over
        {
            Change::Critical
        } else if (game.ball.x, game.ball.y) != self.ball
            || game.left_paddle.y != self.left_y
            || game.right_paddle.y != self.right_y
        {
            Change::Motion
        } else {
            Change::None
        }
    }
}
