//! In-memory fakes shared by the engine's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use gambit_core::ids::{GameId, InvitationId, UserId};
use gambit_core::model::{
    GameResult, GameSession, GameStatus, Invitation, InvitationStatus, MoveRecord,
};
use gambit_core::SyncError;
use gambit_net::{Frame, Transport, WireStream};

use crate::api::{GameService, MoveConfirmation};

/// REST collaborator stand-in. Confirms moves against its own copy of each
/// game unless a scripted reply is queued.
pub(crate) struct FakeService {
    games: Mutex<HashMap<GameId, GameSession>>,
    invitations: Mutex<Vec<Invitation>>,
    online: Mutex<Vec<UserId>>,
    move_reply: Mutex<Option<Result<MoveConfirmation, SyncError>>>,
    submit_gate: Mutex<Option<Arc<Notify>>>,
    game_fetches: AtomicUsize,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            games: Mutex::new(HashMap::new()),
            invitations: Mutex::new(Vec::new()),
            online: Mutex::new(Vec::new()),
            move_reply: Mutex::new(None),
            submit_gate: Mutex::new(None),
            game_fetches: AtomicUsize::new(0),
        }
    }
}

impl FakeService {
    pub(crate) fn put_game(&self, session: GameSession) {
        self.games.lock().insert(session.id.clone(), session);
    }

    pub(crate) fn put_invitation(&self, invitation: Invitation) {
        self.invitations.lock().push(invitation);
    }

    pub(crate) fn set_online_users(&self, users: Vec<UserId>) {
        *self.online.lock() = users;
    }

    pub(crate) fn game_fetches(&self) -> usize {
        self.game_fetches.load(Ordering::SeqCst)
    }

    /// Queue one reply for the next `submit_move` call.
    pub(crate) fn script_move_reply(&self, reply: Result<MoveConfirmation, SyncError>) {
        *self.move_reply.lock() = Some(reply);
    }

    /// Make `submit_move` park until the returned handle is notified.
    pub(crate) fn hold_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl GameService for FakeService {
    async fn fetch_games(&self) -> Result<Vec<GameSession>, SyncError> {
        Ok(self.games.lock().values().cloned().collect())
    }

    async fn fetch_game(&self, id: &GameId) -> Result<GameSession, SyncError> {
        self.game_fetches.fetch_add(1, Ordering::SeqCst);
        self.games
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::Submission("game not found".into()))
    }

    async fn submit_move(
        &self,
        game: &GameId,
        notation: &str,
    ) -> Result<MoveConfirmation, SyncError> {
        let gate = self.submit_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(reply) = self.move_reply.lock().take() {
            return reply;
        }

        let mut games = self.games.lock();
        let session = games
            .get_mut(game)
            .ok_or_else(|| SyncError::Submission("game not found".into()))?;
        let ordinal = session.last_ordinal() + 1;
        let player = if ordinal % 2 == 1 {
            session.white.clone()
        } else {
            session.black.clone()
        };
        let position = format!("pos-{ordinal}");
        session.moves.push(MoveRecord {
            ordinal,
            notation: notation.into(),
            player: player.clone(),
            position: position.clone(),
        });
        session.position = position.clone();
        Ok(MoveConfirmation {
            move_number: ordinal,
            move_notation: notation.into(),
            player,
            fen_after_move: position,
            game_status: None,
            result: None,
        })
    }

    async fn resign(&self, game: &GameId) -> Result<GameSession, SyncError> {
        let mut games = self.games.lock();
        let session = games
            .get_mut(game)
            .ok_or_else(|| SyncError::Submission("game not found".into()))?;
        session.status = GameStatus::Finished;
        session.result = Some(GameResult::BlackWin);
        Ok(session.clone())
    }

    async fn fetch_invitations(&self) -> Result<Vec<Invitation>, SyncError> {
        Ok(self.invitations.lock().clone())
    }

    async fn send_invitation(&self, recipient: &UserId) -> Result<Invitation, SyncError> {
        let invitation = Invitation::pending(
            InvitationId::new(),
            UserId::from_raw("ana"),
            recipient.clone(),
        );
        self.invitations.lock().push(invitation.clone());
        Ok(invitation)
    }

    async fn accept_invitation(&self, id: &InvitationId) -> Result<GameSession, SyncError> {
        let mut invitations = self.invitations.lock();
        let invitation = invitations
            .iter_mut()
            .find(|i| i.id == *id)
            .ok_or_else(|| SyncError::Submission("invitation not found".into()))?;
        invitation.status = InvitationStatus::Accepted;

        let mut session = GameSession::new(
            GameId::from_raw("100"),
            invitation.sender.clone(),
            invitation.recipient.clone(),
            "startpos",
        );
        session.status = GameStatus::Active;
        self.games.lock().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn decline_invitation(&self, id: &InvitationId) -> Result<Invitation, SyncError> {
        let mut invitations = self.invitations.lock();
        let invitation = invitations
            .iter_mut()
            .find(|i| i.id == *id)
            .ok_or_else(|| SyncError::Submission("invitation not found".into()))?;
        invitation.status = InvitationStatus::Declined;
        Ok(invitation.clone())
    }

    async fn fetch_online_users(&self) -> Result<Vec<UserId>, SyncError> {
        Ok(self.online.lock().clone())
    }
}

/// Server half of a wire handed out by [`LoopTransport`].
pub(crate) struct ServerEnd {
    pub(crate) from_client: mpsc::Receiver<Frame>,
    pub(crate) to_client: mpsc::Sender<Frame>,
}

/// Transport that accepts every connect and exposes the server half.
#[derive(Default)]
pub(crate) struct LoopTransport {
    ends: Mutex<Vec<ServerEnd>>,
}

impl LoopTransport {
    pub(crate) fn take_end(&self) -> ServerEnd {
        self.ends.lock().pop().expect("no established wire")
    }
}

/// Transport whose handshake always fails fatally.
pub(crate) struct RejectingTransport;

#[async_trait]
impl Transport for RejectingTransport {
    async fn connect(&self, _url: &str) -> Result<WireStream, SyncError> {
        Err(SyncError::Auth("token expired".into()))
    }
}

#[async_trait]
impl Transport for LoopTransport {
    async fn connect(&self, _url: &str) -> Result<WireStream, SyncError> {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        self.ends.lock().push(ServerEnd {
            from_client: out_rx,
            to_client: in_tx,
        });
        Ok(WireStream {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
