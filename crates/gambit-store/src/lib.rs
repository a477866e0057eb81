//! Authoritative-as-known mirror of lobby and game state.
//!
//! Every merge operation is idempotent with respect to already-applied
//! events: redelivery is a no-op, reordering converges, and anything that
//! cannot be reconciled surfaces as a [`StoreError`] instead of a silent
//! patch.

mod error;
mod lobby;

pub use error::StoreError;
pub use lobby::{LobbyView, Notification};

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use gambit_core::ids::{GameId, UserId};
use gambit_core::model::{
    Color, GameResult, GameSession, GameStatus, Invitation, MoveRecord,
};

use crate::lobby::LobbyState;

/// What `apply_move` did with the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Appended as the next ordinal.
    Applied,
    /// Ordinal already in the log; nothing changed.
    Duplicate,
}

/// Full-state view for the presentation layer.
#[derive(Clone, Debug, Serialize)]
pub struct StoreSnapshot {
    pub sessions: Vec<GameSession>,
    pub lobby: LobbyView,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<GameId, GameSession>,
    lobby: LobbyState,
}

/// The session state store. One per client; all components share it.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Game sessions ---

    /// Authoritative overwrite: used for the initial fetch, `game_update`
    /// pushes, and resynchronization.
    pub fn replace_session(&self, session: GameSession) {
        let mut inner = self.inner.write();
        inner.sessions.insert(session.id.clone(), session);
    }

    /// Insert a session only if it is not already mirrored.
    pub fn insert_if_absent(&self, session: GameSession) -> bool {
        let mut inner = self.inner.write();
        match inner.sessions.entry(session.id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(session);
                true
            }
        }
    }

    /// Merge a move into a session's log, deduplicating by ordinal.
    ///
    /// Exactly `last + 1` appends; an ordinal already in the contiguous log
    /// is a no-op; anything else is an inconsistency the caller must answer
    /// with a resynchronization fetch.
    pub fn apply_move(
        &self,
        game_id: &GameId,
        record: MoveRecord,
    ) -> Result<MoveOutcome, StoreError> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(game_id)
            .ok_or_else(|| StoreError::UnknownGame(game_id.clone()))?;

        if session.is_finished() {
            return Err(StoreError::SessionFinished(game_id.clone()));
        }

        let last = session.last_ordinal();
        if record.ordinal >= 1 && record.ordinal <= last {
            // The log is contiguous, so any ordinal at or below the last one
            // has already been applied. Peer echo of our own move lands here.
            return Ok(MoveOutcome::Duplicate);
        }
        if record.ordinal != last + 1 {
            return Err(StoreError::OrdinalGap {
                game: game_id.clone(),
                got: record.ordinal,
                last,
            });
        }

        session.position = record.position.clone();
        session.moves.push(record);
        Ok(MoveOutcome::Applied)
    }

    /// Validated status transition along Waiting -> Active -> Finished.
    /// Equal status is an idempotent no-op; regression is an inconsistency.
    pub fn apply_status(
        &self,
        game_id: &GameId,
        status: GameStatus,
        result: Option<GameResult>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(game_id)
            .ok_or_else(|| StoreError::UnknownGame(game_id.clone()))?;

        if status.rank() < session.status.rank() {
            return Err(StoreError::StatusRegression {
                game: game_id.clone(),
                from: session.status,
                to: status,
            });
        }
        if status.rank() == session.status.rank() {
            return Ok(false);
        }
        session.status = status;
        if result.is_some() {
            session.result = result;
        }
        Ok(true)
    }

    /// Resignation: the non-resigning color wins. Repeat delivery after the
    /// game finished is a no-op.
    pub fn apply_resign(&self, game_id: &GameId, player: Color) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(game_id)
            .ok_or_else(|| StoreError::UnknownGame(game_id.clone()))?;

        if session.is_finished() {
            return Ok(false);
        }
        session.status = GameStatus::Finished;
        session.result = Some(player.opponent().win());
        Ok(true)
    }

    pub fn session(&self, game_id: &GameId) -> Option<GameSession> {
        self.inner.read().sessions.get(game_id).cloned()
    }

    pub fn sessions(&self) -> Vec<GameSession> {
        let mut all: Vec<_> = self.inner.read().sessions.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    // --- Lobby ---

    /// Returns true if the user was not already marked online.
    pub fn set_online(&self, user: UserId) -> bool {
        self.inner.write().lobby.online.insert(user)
    }

    pub fn set_offline(&self, user: &UserId) -> bool {
        self.inner.write().lobby.online.remove(user)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.inner.read().lobby.online.iter().cloned().collect()
    }

    /// Authoritative overwrite of the presence set. A resynchronization uses
    /// this instead of `set_online` so users who went offline during a gap
    /// do not linger.
    pub fn replace_online(&self, users: Vec<UserId>) {
        self.inner.write().lobby.online = users.into_iter().collect();
    }

    /// Merge an invitation by id. Terminal statuses are immutable: once
    /// Accepted or Declined, no later event changes them.
    pub fn apply_invitation(&self, invitation: Invitation) -> bool {
        let mut inner = self.inner.write();
        match inner
            .lobby
            .invitations
            .iter_mut()
            .find(|i| i.id == invitation.id)
        {
            Some(existing) => {
                if existing.status.is_terminal() {
                    if existing.status != invitation.status {
                        tracing::warn!(
                            invitation_id = %invitation.id,
                            current = ?existing.status,
                            incoming = ?invitation.status,
                            "Ignoring transition on terminal invitation"
                        );
                    }
                    false
                } else if existing.status == invitation.status {
                    false
                } else {
                    existing.status = invitation.status;
                    true
                }
            }
            None => {
                inner.lobby.invitations.push(invitation);
                true
            }
        }
    }

    pub fn invitations(&self) -> Vec<Invitation> {
        self.inner.read().lobby.invitations.clone()
    }

    pub fn invitation(&self, id: &gambit_core::ids::InvitationId) -> Option<Invitation> {
        self.inner
            .read()
            .lobby
            .invitations
            .iter()
            .find(|i| i.id == *id)
            .cloned()
    }

    // --- Notifications (transient, UI-facing) ---

    pub fn push_notification(&self, n: Notification) {
        self.inner.write().lobby.push_notification(n);
    }

    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.inner.write().lobby.notifications.drain(..).collect()
    }

    // --- Snapshot ---

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        let mut sessions: Vec<_> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        StoreSnapshot {
            sessions,
            lobby: LobbyView {
                online: inner.lobby.online.clone(),
                invitations: inner.lobby.invitations.clone(),
            },
        }
    }
}
