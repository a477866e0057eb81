use gambit_core::ids::GameId;
use gambit_core::model::GameStatus;
use gambit_core::SyncError;

/// Merge failures the store refuses to paper over.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown game {0}")]
    UnknownGame(GameId),
    #[error("move ordinal {got} breaks the sequence in game {game} (last applied {last})")]
    OrdinalGap { game: GameId, got: u32, last: u32 },
    #[error("game {0} is already finished")]
    SessionFinished(GameId),
    #[error("status cannot move from {from} to {to} in game {game}")]
    StatusRegression {
        game: GameId,
        from: GameStatus,
        to: GameStatus,
    },
}

impl StoreError {
    /// Whether recovery is a full session fetch from the persistence service.
    pub fn needs_resync(&self) -> bool {
        // Everything here means our mirror and the server disagree; the
        // authoritative copy wins, never a local patch.
        true
    }

    /// The game the inconsistency is about.
    pub fn game_id(&self) -> &GameId {
        match self {
            Self::UnknownGame(id)
            | Self::OrdinalGap { game: id, .. }
            | Self::SessionFinished(id)
            | Self::StatusRegression { game: id, .. } => id,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::StateInconsistency(e.to_string())
    }
}
