use secrecy::{ExposeSecret, SecretString};

use crate::ids::{GameId, UserId};

/// Which push channel a connection serves.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum ChannelScope {
    Lobby,
    Game(GameId),
}

impl std::fmt::Display for ChannelScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Game(id) => write!(f, "game/{id}"),
        }
    }
}

/// Everything a component needs to talk to the collaborators on behalf of
/// one authenticated user. Threaded explicitly into constructors; nothing
/// reads ambient global state.
#[derive(Clone)]
pub struct SessionContext {
    /// REST collaborator base, e.g. `http://127.0.0.1:8000`.
    pub api_base: String,
    /// Push channel base, e.g. `ws://127.0.0.1:8000`.
    pub ws_base: String,
    pub user: UserId,
    token: SecretString,
}

impl SessionContext {
    pub fn new(
        api_base: impl Into<String>,
        ws_base: impl Into<String>,
        user: UserId,
        token: SecretString,
    ) -> Self {
        Self {
            api_base: trim_slash(api_base.into()),
            ws_base: trim_slash(ws_base.into()),
            user,
            token,
        }
    }

    /// `Authorization` header value for the REST collaborator.
    pub fn auth_header(&self) -> String {
        format!("Token {}", self.token.expose_secret())
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    /// Push channel endpoint for a scope; the token rides in the query
    /// string because the handshake carries no headers we control.
    pub fn ws_endpoint(&self, scope: &ChannelScope) -> String {
        let token = self.token.expose_secret();
        match scope {
            ChannelScope::Lobby => format!("{}/ws/lobby/?token={token}", self.ws_base),
            ChannelScope::Game(id) => {
                format!("{}/ws/game/{id}/?token={token}", self.ws_base)
            }
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("api_base", &self.api_base)
            .field("ws_base", &self.ws_base)
            .field("user", &self.user)
            .field("token", &"[redacted]")
            .finish()
    }
}

fn trim_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}
