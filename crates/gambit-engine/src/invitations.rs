//! Invitation workflow: challenges go through the REST collaborator for the
//! record, then out over the lobby channel so the other side hears about it
//! without polling.

use std::sync::Arc;

use gambit_core::ids::{InvitationId, UserId};
use gambit_core::model::{GameSession, Invitation, InvitationStatus};
use gambit_core::{PushMessage, SyncError};
use gambit_net::Connection;
use gambit_store::SessionStore;

use crate::api::GameService;

pub struct InvitationWorkflow {
    user: UserId,
    store: Arc<SessionStore>,
    service: Arc<dyn GameService>,
}

impl InvitationWorkflow {
    pub fn new(user: UserId, store: Arc<SessionStore>, service: Arc<dyn GameService>) -> Self {
        Self {
            user,
            store,
            service,
        }
    }

    /// Pull the invitation list and merge it. Terminal entries in the store
    /// stay terminal whatever the fetch says.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        for invitation in self.service.fetch_invitations().await? {
            self.store.apply_invitation(invitation);
        }
        Ok(())
    }

    /// Challenge another user. The pending invitation is recorded first; the
    /// lobby push is best effort on top of that.
    pub async fn invite(
        &self,
        recipient: &UserId,
        lobby: Option<&Connection>,
    ) -> Result<Invitation, SyncError> {
        let invitation = self.service.send_invitation(recipient).await?;
        self.store.apply_invitation(invitation.clone());
        tracing::info!(invitation_id = %invitation.id, recipient = %recipient, "Challenge sent");

        self.push_lobby(
            lobby,
            PushMessage::Challenge {
                challenger: self.user.clone(),
                challenged: recipient.clone(),
                game_id: None,
            },
        )
        .await;
        Ok(invitation)
    }

    /// Accept a challenge. The collaborator creates the game and returns the
    /// full session, which becomes the local mirror.
    pub async fn accept(
        &self,
        id: &InvitationId,
        lobby: Option<&Connection>,
    ) -> Result<GameSession, SyncError> {
        let challenger = self.store.invitation(id).map(|i| i.sender);
        let session = self.service.accept_invitation(id).await?;

        if let Some(mut invitation) = self.store.invitation(id) {
            invitation.status = InvitationStatus::Accepted;
            self.store.apply_invitation(invitation);
        }
        self.store.replace_session(session.clone());
        tracing::info!(invitation_id = %id, game_id = %session.id, "Challenge accepted");

        let challenger = challenger.unwrap_or_else(|| {
            if session.white == self.user {
                session.black.clone()
            } else {
                session.white.clone()
            }
        });
        self.push_lobby(
            lobby,
            PushMessage::ChallengeResponse {
                accepted: true,
                challenger,
                challenged: self.user.clone(),
                game_id: Some(session.id.clone()),
            },
        )
        .await;
        Ok(session)
    }

    pub async fn decline(
        &self,
        id: &InvitationId,
        lobby: Option<&Connection>,
    ) -> Result<Invitation, SyncError> {
        let invitation = self.service.decline_invitation(id).await?;
        self.store.apply_invitation(invitation.clone());
        tracing::info!(invitation_id = %id, "Challenge declined");

        self.push_lobby(
            lobby,
            PushMessage::ChallengeResponse {
                accepted: false,
                challenger: invitation.sender.clone(),
                challenged: self.user.clone(),
                game_id: None,
            },
        )
        .await;
        Ok(invitation)
    }

    async fn push_lobby(&self, lobby: Option<&Connection>, message: PushMessage) {
        match lobby {
            Some(connection) if connection.is_open() => {
                if let Err(e) = connection.send(&message).await {
                    tracing::warn!(kind = message.kind(), error = %e, "Lobby push failed");
                }
            }
            _ => {
                tracing::debug!(kind = message.kind(), "Lobby channel not open, skipping push");
            }
        }
    }
}
