use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;

use gambit_core::ids::{GameId, InvitationId, UserId};
use gambit_core::model::{Color, Invitation};

/// Oldest notifications are dropped past this point; they are UI hints,
/// not authoritative state.
const NOTIFICATION_CAP: usize = 256;

/// Ephemeral, UI-facing events. Drained by the presentation layer and never
/// part of the authoritative snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    ChallengeReceived {
        challenger: UserId,
        invitation: Option<InvitationId>,
    },
    ChallengeAnswered {
        accepted: bool,
        challenger: UserId,
        challenged: UserId,
        game_id: Option<GameId>,
    },
    UserOnline(UserId),
    UserOffline(UserId),
    OpponentResigned {
        game_id: GameId,
        player: Color,
    },
    ServerError {
        message: String,
    },
    LinkDown {
        context: String,
        attempt: u32,
        delay_ms: u64,
    },
    LinkLost {
        context: String,
    },
}

/// Lobby-scoped state: who is online, which challenges are outstanding.
#[derive(Debug, Default)]
pub struct LobbyState {
    pub online: BTreeSet<UserId>,
    pub invitations: Vec<Invitation>,
    pub(crate) notifications: VecDeque<Notification>,
}

impl LobbyState {
    pub(crate) fn push_notification(&mut self, n: Notification) {
        if self.notifications.len() >= NOTIFICATION_CAP {
            self.notifications.pop_front();
        }
        self.notifications.push_back(n);
    }
}

/// Authoritative portion of the lobby, as handed out by `snapshot`.
#[derive(Clone, Debug, Serialize)]
pub struct LobbyView {
    pub online: BTreeSet<UserId>,
    pub invitations: Vec<Invitation>,
}
