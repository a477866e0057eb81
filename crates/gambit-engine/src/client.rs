//! Composition root: one store, one REST client, and a channel task per
//! joined scope, tied together behind a single handle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use gambit_core::ids::{GameId, InvitationId, UserId};
use gambit_core::model::{GameSession, Invitation, MoveRecord};
use gambit_core::{ChannelScope, PushMessage, SessionContext, SyncError};
use gambit_net::{Connection, ConnectionManager, LinkEvent, Transport};
use gambit_store::{Notification, SessionStore};

use crate::api::GameService;
use crate::dispatch::EventDispatcher;
use crate::invitations::InvitationWorkflow;
use crate::moves::MovePipeline;

type ChannelMap = Arc<Mutex<HashMap<ChannelScope, Connection>>>;

pub struct GambitClient {
    user: UserId,
    store: Arc<SessionStore>,
    service: Arc<dyn GameService>,
    moves: MovePipeline,
    invitations: InvitationWorkflow,
    connections: ConnectionManager,
    channels: ChannelMap,
}

impl GambitClient {
    pub fn new(
        ctx: SessionContext,
        service: Arc<dyn GameService>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let user = ctx.user.clone();
        Self {
            moves: MovePipeline::new(store.clone(), service.clone()),
            invitations: InvitationWorkflow::new(user.clone(), store.clone(), service.clone()),
            connections: ConnectionManager::new(ctx, transport),
            user,
            store,
            service,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn store(&self) -> Arc<SessionStore> {
        self.store.clone()
    }

    /// Seed the store with everything the collaborator knows: games,
    /// invitations, who is online.
    pub async fn bootstrap(&self) -> Result<(), SyncError> {
        for session in self.service.fetch_games().await? {
            self.store.replace_session(session);
        }
        for invitation in self.service.fetch_invitations().await? {
            self.store.apply_invitation(invitation);
        }
        for user in self.service.fetch_online_users().await? {
            self.store.set_online(user);
        }
        Ok(())
    }

    pub fn join_lobby(&self) -> Connection {
        self.join(ChannelScope::Lobby)
    }

    pub fn join_game(&self, id: GameId) -> Connection {
        self.join(ChannelScope::Game(id))
    }

    /// Intentionally leave a scope; its channel closes without reconnecting.
    pub fn leave(&self, scope: &ChannelScope) {
        if let Some(connection) = self.channels.lock().remove(scope) {
            connection.close();
        }
    }

    pub fn close_all(&self) {
        for (_, connection) in self.channels.lock().drain() {
            connection.close();
        }
    }

    fn join(&self, scope: ChannelScope) -> Connection {
        let (connection, events) = self.connections.open(scope.clone());
        self.channels.lock().insert(scope.clone(), connection.clone());

        let dispatcher =
            EventDispatcher::new(scope.clone(), self.store.clone(), self.service.clone());
        tokio::spawn(run_channel(
            scope,
            events,
            connection.clone(),
            dispatcher,
            self.store.clone(),
            Arc::clone(&self.channels),
        ));
        connection
    }

    /// The live handle for a scope, if one is registered. Dead channels are
    /// dropped from the registry when their task ends.
    pub fn channel(&self, scope: &ChannelScope) -> Option<Connection> {
        self.channels.lock().get(scope).cloned()
    }

    pub async fn submit_move(
        &self,
        game_id: &GameId,
        notation: &str,
    ) -> Result<MoveRecord, SyncError> {
        let channel = self.game_channel(game_id);
        self.moves.submit(game_id, notation, channel.as_ref()).await
    }

    /// Resign through the collaborator, mirror the returned session, and
    /// tell the peer if the game channel is up.
    pub async fn resign(&self, game_id: &GameId) -> Result<(), SyncError> {
        let session = self.service.resign(game_id).await?;
        let color = session.color_of(&self.user);
        self.store.replace_session(session);
        tracing::info!(game_id = %game_id, "Resigned");

        if let (Some(player), Some(channel)) = (color, self.game_channel(game_id)) {
            if channel.is_open() {
                if let Err(e) = channel.send(&PushMessage::Resign { player }).await {
                    tracing::warn!(game_id = %game_id, error = %e, "Resign push failed");
                }
            }
        }
        Ok(())
    }

    pub async fn invite(&self, recipient: &UserId) -> Result<Invitation, SyncError> {
        let lobby = self.lobby_channel();
        self.invitations.invite(recipient, lobby.as_ref()).await
    }

    pub async fn accept_invitation(&self, id: &InvitationId) -> Result<GameSession, SyncError> {
        let lobby = self.lobby_channel();
        self.invitations.accept(id, lobby.as_ref()).await
    }

    pub async fn decline_invitation(&self, id: &InvitationId) -> Result<Invitation, SyncError> {
        let lobby = self.lobby_channel();
        self.invitations.decline(id, lobby.as_ref()).await
    }

    fn lobby_channel(&self) -> Option<Connection> {
        self.channel(&ChannelScope::Lobby)
    }

    fn game_channel(&self, game_id: &GameId) -> Option<Connection> {
        self.channel(&ChannelScope::Game(game_id.clone()))
    }
}

/// Per-channel task: dispatch inbound messages, resynchronize on every open,
/// and turn link trouble into notifications the presentation layer can show.
async fn run_channel(
    scope: ChannelScope,
    mut events: mpsc::Receiver<LinkEvent>,
    connection: Connection,
    dispatcher: EventDispatcher,
    store: Arc<SessionStore>,
    channels: ChannelMap,
) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Opened => {
                // Covers both the first open and every reconnect; anything
                // missed during a gap is refetched here.
                dispatcher.resynchronize().await;
            }
            LinkEvent::Message(text) => {
                if let Some(reply) = dispatcher.handle_raw(&text).await {
                    if let Err(e) = connection.send(&reply).await {
                        tracing::debug!(context = %scope, error = %e, "Reply not sent");
                    }
                }
            }
            LinkEvent::Lost { attempt, delay } => {
                store.push_notification(Notification::LinkDown {
                    context: scope.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            LinkEvent::Failed(e) => {
                tracing::error!(context = %scope, error = %e, "Channel failed");
                store.push_notification(Notification::LinkLost {
                    context: scope.to_string(),
                });
                break;
            }
            LinkEvent::Closed => break,
        }
    }

    // Drop the dead handle so callers stop seeing a closed channel, unless a
    // rejoin already registered a successor for this scope.
    {
        let mut channels = channels.lock();
        if channels
            .get(&scope)
            .is_some_and(|current| current.same_link(&connection))
        {
            channels.remove(&scope);
        }
    }
    tracing::debug!(context = %scope, "Channel task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeService, LoopTransport};
    use gambit_core::model::GameStatus;
    use gambit_net::Frame;
    use secrecy::SecretString;

    fn ana() -> UserId {
        UserId::from_raw("ana")
    }

    fn game() -> GameId {
        GameId::from_raw("7")
    }

    fn active_session() -> GameSession {
        let mut s = GameSession::new(game(), ana(), UserId::from_raw("boris"), "startpos");
        s.status = GameStatus::Active;
        s
    }

    fn client() -> (GambitClient, Arc<FakeService>, Arc<LoopTransport>) {
        let service = Arc::new(FakeService::default());
        service.put_game(active_session());
        let transport = Arc::new(LoopTransport::default());
        let ctx = SessionContext::new(
            "http://test",
            "ws://test",
            ana(),
            SecretString::from("tok"),
        );
        (
            GambitClient::new(ctx, service.clone(), transport.clone()),
            service,
            transport,
        )
    }

    async fn settle_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never settled");
    }

    #[tokio::test]
    async fn joining_a_game_resynchronizes_it() {
        let (client, service, _transport) = client();
        let connection = client.join_game(game());
        settle_until(|| connection.is_open()).await;
        let store = client.store();
        settle_until(|| store.session(&game()).is_some()).await;
        assert!(service.game_fetches() >= 1);
    }

    #[tokio::test]
    async fn inbound_move_push_reaches_the_store() {
        let (client, _service, transport) = client();
        let connection = client.join_game(game());
        settle_until(|| connection.is_open()).await;

        let server = transport.take_end();
        server
            .to_client
            .send(Frame::Text(
                r#"{"type":"move","move":"e4","ordinal":1,"player":"ana","fen":"pos-1"}"#.into(),
            ))
            .await
            .unwrap();

        let store = client.store();
        settle_until(|| {
            store
                .session(&game())
                .is_some_and(|s| s.last_ordinal() == 1)
        })
        .await;
    }

    #[tokio::test]
    async fn submitted_move_is_echoed_to_the_peer() {
        let (client, _service, transport) = client();
        let connection = client.join_game(game());
        settle_until(|| connection.is_open()).await;
        let mut server = transport.take_end();

        client.submit_move(&game(), "e4").await.unwrap();

        loop {
            match server.from_client.recv().await.expect("wire closed") {
                Frame::Text(text) if text.contains(r#""type":"move""#) => {
                    assert!(text.contains(r#""move":"e4""#));
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn failed_channel_is_dropped_from_the_registry() {
        let service = Arc::new(FakeService::default());
        let ctx = SessionContext::new(
            "http://test",
            "ws://test",
            ana(),
            SecretString::from("tok"),
        );
        let client = GambitClient::new(
            ctx,
            service,
            Arc::new(crate::testing::RejectingTransport),
        );

        client.join_game(game());
        let scope = ChannelScope::Game(game());
        settle_until(|| client.channel(&scope).is_none()).await;
        assert!(client
            .store()
            .drain_notifications()
            .iter()
            .any(|n| matches!(n, Notification::LinkLost { .. })));
    }

    #[tokio::test]
    async fn closed_handle_is_dropped_from_the_registry() {
        let (client, _service, _transport) = client();
        let connection = client.join_game(game());
        settle_until(|| connection.is_open()).await;

        connection.close();
        let scope = ChannelScope::Game(game());
        settle_until(|| client.channel(&scope).is_none()).await;
    }

    #[tokio::test]
    async fn rejoining_keeps_the_successor_registered() {
        let (client, _service, _transport) = client();
        let first = client.join_game(game());
        settle_until(|| first.is_open()).await;

        let second = client.join_game(game());
        settle_until(|| second.is_open()).await;
        settle_until(|| first.state() == gambit_net::LinkState::Closed).await;
        // Let the superseded channel task run its cleanup.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        let current = client
            .channel(&ChannelScope::Game(game()))
            .expect("successor was evicted");
        assert!(current.same_link(&second));
    }

    #[tokio::test]
    async fn leave_closes_without_reconnect() {
        let (client, _service, _transport) = client();
        let connection = client.join_game(game());
        settle_until(|| connection.is_open()).await;

        client.leave(&ChannelScope::Game(game()));
        settle_until(|| connection.state() == gambit_net::LinkState::Closed).await;
    }
}
