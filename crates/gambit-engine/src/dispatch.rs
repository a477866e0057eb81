//! Push-message dispatch: decode, route by tag, merge into the store
//! idempotently, and answer anything unreconcilable with a full refetch.

use std::sync::Arc;

use gambit_core::ids::GameId;
use gambit_core::model::MoveRecord;
use gambit_core::{ChannelScope, PushMessage, SyncError};
use gambit_store::{MoveOutcome, Notification, SessionStore};

use crate::api::GameService;

/// Handles every message arriving on one channel scope. Pure over the store
/// and the REST collaborator; it never touches the wire directly, so the
/// caller forwards any reply it returns.
pub struct EventDispatcher {
    scope: ChannelScope,
    store: Arc<SessionStore>,
    service: Arc<dyn GameService>,
}

impl EventDispatcher {
    pub fn new(scope: ChannelScope, store: Arc<SessionStore>, service: Arc<dyn GameService>) -> Self {
        Self {
            scope,
            store,
            service,
        }
    }

    /// Decode and dispatch one raw payload. Undecodable input is logged and
    /// dropped; the channel stays up.
    pub async fn handle_raw(&self, text: &str) -> Option<PushMessage> {
        match serde_json::from_str::<PushMessage>(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                tracing::warn!(context = %self.scope, error = %e, "Dropping undecodable push");
                None
            }
        }
    }

    /// Dispatch one decoded message. Returns a reply the caller should put
    /// on the wire (only `Pong`, today).
    pub async fn handle(&self, message: PushMessage) -> Option<PushMessage> {
        tracing::debug!(context = %self.scope, kind = message.kind(), "Push received");
        match message {
            PushMessage::ConnectionEstablished { message } => {
                tracing::info!(
                    context = %self.scope,
                    detail = message.as_deref().unwrap_or(""),
                    "Channel acknowledged"
                );
            }
            PushMessage::Error { message } => {
                tracing::warn!(context = %self.scope, message = %message, "Server-reported error");
                self.store
                    .push_notification(Notification::ServerError { message });
            }
            PushMessage::Move {
                notation,
                ordinal,
                player,
                fen,
                game_status,
                result,
            } => {
                let Some(game_id) = self.game_scope("move") else {
                    return None;
                };
                let record = MoveRecord {
                    ordinal,
                    notation,
                    player,
                    position: fen,
                };
                match self.store.apply_move(&game_id, record) {
                    Ok(MoveOutcome::Applied) => {
                        if let Some(status) = game_status {
                            if let Err(e) = self.store.apply_status(&game_id, status, result) {
                                self.resync_game(&game_id, &e.into()).await;
                                return None;
                            }
                        }
                    }
                    Ok(MoveOutcome::Duplicate) => {
                        tracing::debug!(game_id = %game_id, ordinal, "Duplicate move push ignored");
                    }
                    Err(e) => self.resync_game(&game_id, &e.into()).await,
                }
            }
            PushMessage::GameUpdate { game } => {
                tracing::debug!(game_id = %game.id, status = %game.status, "Full session update");
                self.store.replace_session(game);
            }
            PushMessage::Resign { player } => {
                let Some(game_id) = self.game_scope("resign") else {
                    return None;
                };
                match self.store.apply_resign(&game_id, player) {
                    Ok(true) => self.store.push_notification(Notification::OpponentResigned {
                        game_id,
                        player,
                    }),
                    Ok(false) => {
                        tracing::debug!(game_id = %game_id, "Resign push after finish ignored");
                    }
                    Err(e) => self.resync_game(&game_id, &e.into()).await,
                }
            }
            PushMessage::Challenge {
                challenger,
                challenged: _,
                game_id: _,
            } => {
                self.store.push_notification(Notification::ChallengeReceived {
                    challenger,
                    invitation: None,
                });
                // The push carries no invitation id; fetch the list so the
                // pending entry shows up with one.
                self.refresh_invitations().await;
            }
            PushMessage::ChallengeResponse {
                accepted,
                challenger,
                challenged,
                game_id,
            } => {
                self.store.push_notification(Notification::ChallengeAnswered {
                    accepted,
                    challenger,
                    challenged,
                    game_id: game_id.clone(),
                });
                self.refresh_invitations().await;
                if accepted {
                    if let Some(id) = game_id {
                        match self.service.fetch_game(&id).await {
                            Ok(session) => self.store.replace_session(session),
                            Err(e) => {
                                tracing::warn!(game_id = %id, error = %e, "Could not fetch accepted game");
                            }
                        }
                    }
                }
            }
            PushMessage::UserOnline { username } => {
                if self.store.set_online(username.clone()) {
                    self.store.push_notification(Notification::UserOnline(username));
                }
            }
            PushMessage::UserOffline { username } => {
                if self.store.set_offline(&username) {
                    self.store.push_notification(Notification::UserOffline(username));
                }
            }
            PushMessage::Ping => return Some(PushMessage::Pong),
            PushMessage::Pong => {}
            PushMessage::Unknown => {
                tracing::warn!(context = %self.scope, "Dropping unrecognized push");
            }
        }
        None
    }

    /// Refetch everything this scope mirrors. Run on every channel open so a
    /// reconnect window never leaves stale state behind.
    pub async fn resynchronize(&self) {
        match &self.scope {
            ChannelScope::Lobby => {
                self.refresh_invitations().await;
                match self.service.fetch_online_users().await {
                    // Wholesale replacement: an offline transition missed
                    // during the gap must not survive the resync.
                    Ok(users) => self.store.replace_online(users),
                    Err(e) => tracing::warn!(error = %e, "Could not refresh online users"),
                }
            }
            ChannelScope::Game(id) => {
                let id = id.clone();
                match self.service.fetch_game(&id).await {
                    Ok(session) => self.store.replace_session(session),
                    Err(e) => {
                        tracing::error!(game_id = %id, error = %e, "Resynchronization failed");
                    }
                }
            }
        }
    }

    fn game_scope(&self, kind: &str) -> Option<GameId> {
        match &self.scope {
            ChannelScope::Game(id) => Some(id.clone()),
            ChannelScope::Lobby => {
                tracing::warn!(kind, "Game-scoped push arrived on the lobby channel, dropping");
                None
            }
        }
    }

    async fn resync_game(&self, game_id: &GameId, cause: &SyncError) {
        tracing::warn!(
            game_id = %game_id,
            error = %cause,
            "State inconsistency, resynchronizing"
        );
        match self.service.fetch_game(game_id).await {
            Ok(session) => self.store.replace_session(session),
            Err(e) => {
                tracing::error!(game_id = %game_id, error = %e, "Resynchronization failed");
            }
        }
    }

    async fn refresh_invitations(&self) {
        match self.service.fetch_invitations().await {
            Ok(invitations) => {
                for invitation in invitations {
                    self.store.apply_invitation(invitation);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not refresh invitations"),
        }
    }
}
