//! Move submission: confirm with the REST collaborator first, merge the
//! confirmed record locally, then echo it to the peer over the game channel.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use gambit_core::ids::GameId;
use gambit_core::model::MoveRecord;
use gambit_core::{PushMessage, SyncError};
use gambit_net::Connection;
use gambit_store::{MoveOutcome, SessionStore};

use crate::api::GameService;

/// One confirmed submission at a time per game. The guard exists because a
/// second submit racing the first would hand the collaborator two moves for
/// the same position.
pub struct MovePipeline {
    store: Arc<SessionStore>,
    service: Arc<dyn GameService>,
    in_flight: Mutex<HashSet<GameId>>,
}

impl MovePipeline {
    pub fn new(store: Arc<SessionStore>, service: Arc<dyn GameService>) -> Self {
        Self {
            store,
            service,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Submit a move. On confirmation the record is merged into the store
    /// and, when the game channel is open, echoed to the peer. Rejections
    /// come back with the collaborator's message untouched.
    pub async fn submit(
        &self,
        game_id: &GameId,
        notation: &str,
        channel: Option<&Connection>,
    ) -> Result<MoveRecord, SyncError> {
        if !self.in_flight.lock().insert(game_id.clone()) {
            return Err(SyncError::Submission(
                "a move for this game is already being submitted".into(),
            ));
        }
        let _guard = InFlight {
            pipeline: self,
            game: game_id.clone(),
        };

        let confirmation = self.service.submit_move(game_id, notation).await?;
        let game_status = confirmation.game_status;
        let result = confirmation.result;
        let record = confirmation.into_record();
        tracing::info!(
            game_id = %game_id,
            ordinal = record.ordinal,
            notation = %record.notation,
            "Move confirmed"
        );

        match self.store.apply_move(game_id, record.clone()) {
            Ok(MoveOutcome::Applied) => {
                if let Some(status) = game_status {
                    if let Err(e) = self.store.apply_status(game_id, status, result) {
                        self.resync(game_id, &e.into()).await;
                    }
                }
            }
            Ok(MoveOutcome::Duplicate) => {
                // The push echo beat the HTTP response; the log already
                // holds this ordinal.
                tracing::debug!(game_id = %game_id, ordinal = record.ordinal, "Confirmation was already merged");
            }
            Err(e) => self.resync(game_id, &e.into()).await,
        }

        match channel {
            Some(connection) if connection.is_open() => {
                let push = PushMessage::Move {
                    notation: record.notation.clone(),
                    ordinal: record.ordinal,
                    player: record.player.clone(),
                    fen: record.position.clone(),
                    game_status,
                    result,
                };
                if let Err(e) = connection.send(&push).await {
                    // The move is committed server-side; the peer catches up
                    // on its next resynchronization.
                    tracing::warn!(game_id = %game_id, error = %e, "Peer echo failed after confirmed move");
                }
            }
            _ => {
                tracing::debug!(game_id = %game_id, "Game channel not open, skipping peer echo");
            }
        }

        Ok(record)
    }

    async fn resync(&self, game_id: &GameId, cause: &SyncError) {
        tracing::warn!(
            game_id = %game_id,
            error = %cause,
            "Confirmation does not fit the local log, resynchronizing"
        );
        match self.service.fetch_game(game_id).await {
            Ok(session) => self.store.replace_session(session),
            Err(e) => {
                tracing::error!(game_id = %game_id, error = %e, "Resynchronization failed");
            }
        }
    }
}

struct InFlight<'a> {
    pipeline: &'a MovePipeline,
    game: GameId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.pipeline.in_flight.lock().remove(&self.game);
    }
}
