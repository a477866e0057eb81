use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{GameId, InvitationId, UserId};

/// Side of the board. Presence in a session decides who a push is about.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// The result recorded when this color wins.
    pub fn win(self) -> GameResult {
        match self {
            Self::White => GameResult::WhiteWin,
            Self::Black => GameResult::BlackWin,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Finished,
}

impl GameStatus {
    /// Position in the one-way Waiting -> Active -> Finished order.
    pub fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Active => 1,
            Self::Finished => 2,
        }
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
}

/// One confirmed move in a session's log.
///
/// The ordinal is assigned by the move-legality service and is the
/// deduplication key for every merge path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveRecord {
    pub ordinal: u32,
    pub notation: String,
    pub player: UserId,
    /// Opaque position token (FEN) after the move. Never interpreted here.
    pub position: String,
}

/// Authoritative-as-known mirror of one game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSession {
    pub id: GameId,
    pub white: UserId,
    pub black: UserId,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
    pub position: String,
    #[serde(default)]
    pub moves: Vec<MoveRecord>,
    /// Server-assigned creation time; absent on sessions we mint locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl GameSession {
    pub fn new(id: GameId, white: UserId, black: UserId, position: impl Into<String>) -> Self {
        Self {
            id,
            white,
            black,
            status: GameStatus::Waiting,
            result: None,
            position: position.into(),
            moves: Vec::new(),
            created_at: None,
        }
    }

    /// Highest applied move ordinal, 0 when the log is empty.
    pub fn last_ordinal(&self) -> u32 {
        self.moves.last().map_or(0, |m| m.ordinal)
    }

    pub fn color_of(&self, user: &UserId) -> Option<Color> {
        if *user == self.white {
            Some(Color::White)
        } else if *user == self.black {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Declined)
    }
}

/// A challenge from one user to another.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub sender: UserId,
    pub recipient: UserId,
    pub status: InvitationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn pending(id: InvitationId, sender: UserId, recipient: UserId) -> Self {
        Self {
            id,
            sender,
            recipient,
            status: InvitationStatus::Pending,
            created_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GameSession {
        GameSession::new(
            GameId::from_raw("7"),
            UserId::from_raw("ana"),
            UserId::from_raw("boris"),
            "startpos",
        )
    }

    #[test]
    fn opponent_flips_color() {
        assert_eq!(Color::White.opponent(), Color::Black);
        assert_eq!(Color::Black.opponent(), Color::White);
    }

    #[test]
    fn win_maps_color_to_result() {
        assert_eq!(Color::White.win(), GameResult::WhiteWin);
        assert_eq!(Color::Black.win(), GameResult::BlackWin);
    }

    #[test]
    fn status_rank_is_monotonic() {
        assert!(GameStatus::Waiting.rank() < GameStatus::Active.rank());
        assert!(GameStatus::Active.rank() < GameStatus::Finished.rank());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&GameStatus::Active).unwrap(), r#""active""#);
        assert_eq!(
            serde_json::to_string(&GameResult::WhiteWin).unwrap(),
            r#""white_win""#
        );
    }

    #[test]
    fn last_ordinal_empty_log() {
        assert_eq!(session().last_ordinal(), 0);
    }

    #[test]
    fn last_ordinal_tracks_log() {
        let mut s = session();
        s.moves.push(MoveRecord {
            ordinal: 1,
            notation: "e4".into(),
            player: UserId::from_raw("ana"),
            position: "p1".into(),
        });
        assert_eq!(s.last_ordinal(), 1);
    }

    #[test]
    fn color_of_players() {
        let s = session();
        assert_eq!(s.color_of(&UserId::from_raw("ana")), Some(Color::White));
        assert_eq!(s.color_of(&UserId::from_raw("boris")), Some(Color::Black));
        assert_eq!(s.color_of(&UserId::from_raw("carl")), None);
    }

    #[test]
    fn invitation_terminal_states() {
        assert!(!InvitationStatus::Pending.is_terminal());
        assert!(InvitationStatus::Accepted.is_terminal());
        assert!(InvitationStatus::Declined.is_terminal());
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut s = session();
        s.status = GameStatus::Finished;
        s.result = Some(GameResult::Draw);
        let json = serde_json::to_string(&s).unwrap();
        let parsed: GameSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, GameStatus::Finished);
        assert_eq!(parsed.result, Some(GameResult::Draw));
    }
}
