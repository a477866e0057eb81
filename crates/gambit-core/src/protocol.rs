use serde::{Deserialize, Serialize};

use crate::ids::{GameId, UserId};
use crate::model::{Color, GameResult, GameSession, GameStatus};

/// Every message that crosses a push channel, keyed by the top-level `type`
/// tag. Unrecognized tags land in `Unknown` so the dispatch loop can log and
/// drop them instead of dying on a deserialization error.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    ConnectionEstablished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
    Move {
        #[serde(rename = "move")]
        notation: String,
        /// Authoritative move number assigned by the legality service.
        /// Deduplication key for every merge path.
        ordinal: u32,
        player: UserId,
        fen: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_status: Option<GameStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<GameResult>,
    },
    GameUpdate {
        game: GameSession,
    },
    Resign {
        player: Color,
    },
    Challenge {
        challenger: UserId,
        challenged: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_id: Option<GameId>,
    },
    ChallengeResponse {
        accepted: bool,
        challenger: UserId,
        challenged: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_id: Option<GameId>,
    },
    UserOnline {
        username: UserId,
    },
    UserOffline {
        username: UserId,
    },
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

impl PushMessage {
    /// Tag string used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::Error { .. } => "error",
            Self::Move { .. } => "move",
            Self::GameUpdate { .. } => "game_update",
            Self::Resign { .. } => "resign",
            Self::Challenge { .. } => "challenge",
            Self::ChallengeResponse { .. } => "challenge_response",
            Self::UserOnline { .. } => "user_online",
            Self::UserOffline { .. } => "user_offline",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Unknown => "unknown",
        }
    }
}
