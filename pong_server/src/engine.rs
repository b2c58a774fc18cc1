//! Pure fixed-timestep physics: paddle convergence, continuous ball-paddle
//! collision, scoring and the bot's predictive target. No I/O, no clocks;
//! the only randomness is the serve angle drawn from the engine's own RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pong_shared::{
    GameState, BALL_MAX_Y, BALL_SIZE, BALL_SPEED, BOT_SPEED_FACTOR, COLLISION_BUFFER, FIELD_H,
    FIELD_W, MAX_BALL_SPEED, PADDLE_H, PADDLE_MAX_Y, PADDLE_SPEED, PADDLE_W, WIN_SCORE,
};

/// Maximum bounce angle off a paddle, in radians.
const MAX_BOUNCE_ANGLE: f32 = 0.8;

/// Serve angle is drawn uniformly from (-PI/8, +PI/8).
const SERVE_SPREAD: f32 = std::f32::consts::FRAC_PI_8;

pub struct Engine {
    rng: StdRng,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded constructor so tests get reproducible serves.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advance `state` by `dt` seconds. Velocities are expressed in pixels
    /// per frame at 60 Hz, so displacement scales by `dt * 60`. No-op while
    /// the game is over or either player is not ready.
    pub fn step(&mut self, state: &mut GameState, dt: f32) {
        if state.game_over || !state.players_ready() {
            return;
        }

        // Serve on the first live tick of a round.
        if state.ball.velocity_x == 0.0 && state.ball.velocity_y == 0.0 {
            let dir = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            self.reset_ball(state, dir);
        }

        let scale = dt * 60.0;

        // Paddles converge toward their targets at bounded speed.
        state.left_paddle.y = move_toward(
            state.left_paddle.y,
            state.left_paddle_target_y,
            PADDLE_SPEED * scale,
        )
        .clamp(0.0, PADDLE_MAX_Y);
        state.right_paddle.y = move_toward(
            state.right_paddle.y,
            state.right_paddle_target_y,
            PADDLE_SPEED * scale,
        )
        .clamp(0.0, PADDLE_MAX_Y);

        let prev = (state.ball.x, state.ball.y);
        state.ball.x += state.ball.velocity_x * scale;
        state.ball.y += state.ball.velocity_y * scale;

        // Top and bottom walls.
        if state.ball.y <= 0.0 || state.ball.y >= BALL_MAX_Y {
            state.ball.velocity_y = -state.ball.velocity_y;
            state.ball.y = state.ball.y.clamp(0.0, BALL_MAX_Y);
        }

        let cur = (state.ball.x, state.ball.y);
        let left_rect = contact_rect(state.left_paddle.x, state.left_paddle.y);
        let right_rect = contact_rect(state.right_paddle.x, state.right_paddle.y);
        let left_hit = swept_hit(prev, cur, &left_rect, Side::Left);
        let right_hit = swept_hit(prev, cur, &right_rect, Side::Right);

        match (left_hit, right_hit) {
            (true, true) => {
                // Not reachable in one frame at game speeds; take the side
                // the ball was moving toward.
                if state.ball.velocity_x < 0.0 {
                    bounce(state, Side::Left);
                } else {
                    bounce(state, Side::Right);
                }
            }
            (true, false) => bounce(state, Side::Left),
            (false, true) => bounce(state, Side::Right),
            (false, false) => {}
        }

        // Scoring.
        if state.ball.x < 0.0 {
            state.right_score += 1;
            self.reset_ball(state, -1.0);
        } else if state.ball.x > FIELD_W {
            state.left_score += 1;
            self.reset_ball(state, 1.0);
        }
        if state.left_score >= WIN_SCORE || state.right_score >= WIN_SCORE {
            state.game_over = true;
            state.winner = if state.left_score > state.right_score {
                1
            } else {
                2
            };
        }

        state.sequence_number += 1;
    }

    /// Park the ball at the field center and serve toward `dir` (+1 right,
    /// -1 left) at a shallow random angle.
    pub fn reset_ball(&mut self, state: &mut GameState, dir: f32) {
        let angle = self.rng.gen_range(-SERVE_SPREAD..SERVE_SPREAD);
        state.ball.x = (FIELD_W - BALL_SIZE) / 2.0;
        state.ball.y = (FIELD_H - BALL_SIZE) / 2.0;
        state.ball.velocity_x = BALL_SPEED * dir * angle.cos();
        state.ball.velocity_y = BALL_SPEED * angle.sin();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Retarget the bot paddle. Predicts the ball's arrival height when it is
/// inbound, otherwise shadows the ball, and converges the target at a
/// fraction of full paddle speed. Never writes the paddle's `y`; the next
/// step moves the paddle like any other.
pub fn update_bot_target(state: &mut GameState) {
    let ball = &state.ball;
    let predicted = if ball.velocity_x > 0.0 {
        let flight = (state.right_paddle.x - ball.x) / ball.velocity_x.abs();
        (ball.y + ball.velocity_y * flight).clamp(0.0, BALL_MAX_Y)
    } else {
        ball.y
    };
    let target = (predicted - PADDLE_H / 2.0 + BALL_SIZE / 2.0).clamp(0.0, PADDLE_MAX_Y);
    state.right_paddle_target_y = move_toward(
        state.right_paddle.y,
        target,
        PADDLE_SPEED * BOT_SPEED_FACTOR,
    );
}

/// Step toward `target` by at most `max_delta`.
pub fn move_toward(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    Clean,
    Repaired,
    Aborted,
}

/// Clamp any value that escaped its invariant range back in. Non-finite
/// values fall back to a neutral position. A nonsensical winner cannot be
/// repaired and aborts the session.
pub fn sanitize(state: &mut GameState) -> Integrity {
    if state.winner > 2 {
        state.game_over = true;
        state.winner = 0;
        return Integrity::Aborted;
    }

    let mut repaired = false;
    repaired |= repair(
        &mut state.ball.x,
        -BALL_SIZE,
        FIELD_W + BALL_SIZE,
        (FIELD_W - BALL_SIZE) / 2.0,
    );
    repaired |= repair(&mut state.ball.y, 0.0, BALL_MAX_Y, (FIELD_H - BALL_SIZE) / 2.0);
    repaired |= repair(
        &mut state.ball.velocity_x,
        -MAX_BALL_SPEED,
        MAX_BALL_SPEED,
        BALL_SPEED,
    );
    repaired |= repair(
        &mut state.ball.velocity_y,
        -MAX_BALL_SPEED,
        MAX_BALL_SPEED,
        0.0,
    );
    repaired |= repair(&mut state.left_paddle.y, 0.0, PADDLE_MAX_Y, PADDLE_MAX_Y / 2.0);
    repaired |= repair(&mut state.right_paddle.y, 0.0, PADDLE_MAX_Y, PADDLE_MAX_Y / 2.0);
    repaired |= repair(
        &mut state.left_paddle_target_y,
        0.0,
        PADDLE_MAX_Y,
        PADDLE_MAX_Y / 2.0,
    );
    repaired |= repair(
        &mut state.right_paddle_target_y,
        0.0,
        PADDLE_MAX_Y,
        PADDLE_MAX_Y / 2.0,
    );

    if repaired {
        Integrity::Repaired
    } else {
        Integrity::Clean
    }
}

fn repair(value: &mut f32, lo: f32, hi: f32, fallback: f32) -> bool {
    if !value.is_finite() {
        *value = fallback;
        true
    } else if *value < lo || *value > hi {
        *value = value.clamp(lo, hi);
        true
    } else {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

struct Rect {
    min_x: f32,
    max_x: f32,
    min_y: f32,
    max_y: f32,
}

/// Contact region for a paddle: half the collision buffer widens each
/// striking face, while the vertical span stays the bare paddle extent so
/// a ball tangent to the paddle tip (`y = paddleY - BALL_SIZE`) passes
/// clean.
fn contact_rect(paddle_x: f32, paddle_y: f32) -> Rect {
    Rect {
        min_x: paddle_x - COLLISION_BUFFER / 2.0,
        max_x: paddle_x + PADDLE_W + COLLISION_BUFFER / 2.0,
        min_y: paddle_y,
        max_y: paddle_y + PADDLE_H,
    }
}

/// Continuous collision test: a hit is either the ball's leading edge
/// crossing the paddle's near face between frames, or plain AABB overlap
/// this frame. The crossing test catches tunneling at high speed.
/// Inequalities are strict, so a ball exactly tangent to the paddle tip
/// is a miss while any real vertical overlap is contact.
fn swept_hit(prev: (f32, f32), cur: (f32, f32), rect: &Rect, side: Side) -> bool {
    let (_, cur_y) = cur;
    let y_overlap = cur_y < rect.max_y && cur_y + BALL_SIZE > rect.min_y;
    if !y_overlap {
        return false;
    }

    let x_overlap = cur.0 < rect.max_x && cur.0 + BALL_SIZE > rect.min_x;
    if x_overlap {
        return true;
    }

    match side {
        // Leading edge is the ball's left side, near face the rect's right.
        Side::Left => prev.0 >= rect.max_x && cur.0 <= rect.max_x,
        // Leading edge is the ball's right side, near face the rect's left.
        Side::Right => prev.0 + BALL_SIZE <= rect.min_x && cur.0 + BALL_SIZE >= rect.min_x,
    }
}

/// Redirect the ball off a paddle. The bounce angle scales with how far
/// from the paddle center the ball struck; speed is preserved. The ball is
/// ejected just clear of the paddle face to avoid an immediate re-hit.
fn bounce(state: &mut GameState, side: Side) {
    let (paddle_x, paddle_y) = match side {
        Side::Left => (state.left_paddle.x, state.left_paddle.y),
        Side::Right => (state.right_paddle.x, state.right_paddle.y),
    };
    let ball = &mut state.ball;

    let speed = (ball.velocity_x * ball.velocity_x + ball.velocity_y * ball.velocity_y).sqrt();
    let relative = (paddle_y + PADDLE_H / 2.0) - (ball.y + BALL_SIZE / 2.0);
    let normalized = (relative / (PADDLE_H / 2.0)).clamp(-1.0, 1.0);
    let angle = normalized * MAX_BOUNCE_ANGLE;

    match side {
        Side::Left => {
            ball.velocity_x = (speed * angle.cos()).abs();
            ball.x = paddle_x + PADDLE_W + 0.1;
        }
        Side::Right => {
            ball.velocity_x = -(speed * angle.cos()).abs();
            ball.x = paddle_x - BALL_SIZE - 0.1;
        }
    }
    ball.velocity_y = -speed * angle.sin();
}
