use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FIELD_W: f32 = 800.0;
pub const FIELD_H: f32 = 600.0;
pub const PADDLE_W: f32 = 16.0;
pub const PADDLE_H: f32 = 100.0;
pub const BALL_SIZE: f32 = 16.0;
pub const PADDLE_SPEED: f32 = 6.0;
pub const BALL_SPEED: f32 = 6.0;
pub const MAX_BALL_SPEED: f32 = 12.0;
pub const BOT_SPEED_FACTOR: f32 = 0.85;
pub const WIN_SCORE: u32 = 5;
pub const COLLISION_BUFFER: f32 = 4.0;

pub const LEFT_PADDLE_X: f32 = 0.0;
pub const RIGHT_PADDLE_X: f32 = FIELD_W - PADDLE_W;
/// Largest legal paddle `y` (field height minus paddle height).
pub const PADDLE_MAX_Y: f32 = FIELD_H - PADDLE_H;
/// Largest legal ball `y` (field height minus ball size).
pub const BALL_MAX_Y: f32 = FIELD_H - BALL_SIZE;

const BOT_PREFIX: &str = "bot_";

/// Stable identifier for one participant. Doubles as the connection id for
/// real players; bot ids carry a `bot_` prefix and have no connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn bot() -> Self {
        Self(format!("{BOT_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_bot(&self) -> bool {
        self.0.starts_with(BOT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Session identifier, derived from the lexicographically ordered player
/// pair so both sides compute the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn from_pair(a: &PlayerId, b: &PlayerId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{}:{}", lo.as_str(), hi.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
}

/// Authoritative game state. Field names on the wire follow the client
/// contract (`velocityX`, `sequenceNumber`, ...); origin is top-left, units
/// are pixels, ball and paddle positions are the top-left corner of their
/// bounding boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub ball: Ball,
    pub left_paddle: Paddle,
    pub right_paddle: Paddle,
    pub left_score: u32,
    pub right_score: u32,
    pub game_over: bool,
    /// 0 = undecided (or server shutdown), 1 = left, 2 = right.
    pub winner: u8,
    pub sequence_number: u64,
    pub left_paddle_target_y: f32,
    pub right_paddle_target_y: f32,
    pub left_player_ready: bool,
    pub right_player_ready: bool,
}

impl GameState {
    /// Fresh state: paddles and targets centered, ball parked at the field
    /// center with zero velocity. The engine serves on the first live tick.
    pub fn new() -> Self {
        let paddle_y = PADDLE_MAX_Y / 2.0;
        Self {
            ball: Ball {
                x: (FIELD_W - BALL_SIZE) / 2.0,
                y: (FIELD_H - BALL_SIZE) / 2.0,
                velocity_x: 0.0,
                velocity_y: 0.0,
            },
            left_paddle: Paddle {
                x: LEFT_PADDLE_X,
                y: paddle_y,
            },
            right_paddle: Paddle {
                x: RIGHT_PADDLE_X,
                y: paddle_y,
            },
            left_score: 0,
            right_score: 0,
            game_over: false,
            winner: 0,
            sequence_number: 0,
            left_paddle_target_y: paddle_y,
            right_paddle_target_y: paddle_y,
            left_player_ready: false,
            right_player_ready: false,
        }
    }

    pub fn players_ready(&self) -> bool {
        self.left_player_ready && self.right_player_ready
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    JoinMatchmaking,
    StartBotMatch,
    #[serde(rename_all = "camelCase")]
    SendPaddleInput { target_y: f32 },
    RequestStartGame,
    KeepAlive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    MatchFound {
        opponent: String,
        /// 1 = left paddle, 2 = right paddle.
        side: u8,
        #[serde(default)]
        is_bot: bool,
    },
    WaitingForOpponent,
    AlreadyInGame,
    GameStarted,
    GameUpdate(GameState),
    #[serde(rename_all = "camelCase")]
    OpponentPaddleInput { target_y: f32 },
    OpponentDisconnected(GameState),
    /// UTC milliseconds since the Unix epoch.
    Pong { timestamp: u64 },
}
