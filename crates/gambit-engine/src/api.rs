//! REST collaborator client. Every mutation of record goes through here;
//! push channels only ever echo what these endpoints confirmed.

use async_trait::async_trait;
use reqwest::header;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gambit_core::ids::{GameId, InvitationId, UserId};
use gambit_core::model::{GameResult, GameSession, GameStatus, Invitation, MoveRecord};
use gambit_core::{SessionContext, SyncError};

/// Confirmation returned by the move endpoint: the authoritative ordinal,
/// notation as recorded, and the resulting position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveConfirmation {
    pub move_number: u32,
    pub move_notation: String,
    pub player: UserId,
    pub fen_after_move: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_status: Option<GameStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
}

impl MoveConfirmation {
    pub fn into_record(self) -> MoveRecord {
        MoveRecord {
            ordinal: self.move_number,
            notation: self.move_notation,
            player: self.player,
            position: self.fen_after_move,
        }
    }
}

/// Seam between the engine and the REST collaborator. Production is
/// [`HttpGameService`]; tests swap in an in-memory fake.
#[async_trait]
pub trait GameService: Send + Sync + 'static {
    async fn fetch_games(&self) -> Result<Vec<GameSession>, SyncError>;
    async fn fetch_game(&self, id: &GameId) -> Result<GameSession, SyncError>;
    async fn submit_move(
        &self,
        game: &GameId,
        notation: &str,
    ) -> Result<MoveConfirmation, SyncError>;
    async fn resign(&self, game: &GameId) -> Result<GameSession, SyncError>;

    async fn fetch_invitations(&self) -> Result<Vec<Invitation>, SyncError>;
    async fn send_invitation(&self, recipient: &UserId) -> Result<Invitation, SyncError>;
    /// Accepting creates the game; the full session comes back.
    async fn accept_invitation(&self, id: &InvitationId) -> Result<GameSession, SyncError>;
    async fn decline_invitation(&self, id: &InvitationId) -> Result<Invitation, SyncError>;

    async fn fetch_online_users(&self) -> Result<Vec<UserId>, SyncError>;
}

pub struct HttpGameService {
    http: reqwest::Client,
    ctx: SessionContext,
}

impl HttpGameService {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            http: reqwest::Client::new(),
            ctx,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let response = self
            .http
            .get(self.ctx.api_url(path))
            .header(header::AUTHORIZATION, self.ctx.auth_header())
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;
        decode(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let response = self
            .http
            .post(self.ctx.api_url(path))
            .header(header::AUTHORIZATION, self.ctx.auth_header())
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;
        decode(response).await
    }
}

#[async_trait]
impl GameService for HttpGameService {
    async fn fetch_games(&self) -> Result<Vec<GameSession>, SyncError> {
        self.get("/api/chess/games/").await
    }

    async fn fetch_game(&self, id: &GameId) -> Result<GameSession, SyncError> {
        self.get(&format!("/api/chess/games/{id}/")).await
    }

    async fn submit_move(
        &self,
        game: &GameId,
        notation: &str,
    ) -> Result<MoveConfirmation, SyncError> {
        #[derive(Serialize)]
        struct Body<'a> {
            game: &'a GameId,
            move_notation: &'a str,
        }
        self.post(
            "/api/chess/moves/",
            &Body {
                game,
                move_notation: notation,
            },
        )
        .await
    }

    async fn resign(&self, game: &GameId) -> Result<GameSession, SyncError> {
        self.post(&format!("/api/chess/resign-game/{game}/"), &serde_json::json!({}))
            .await
    }

    async fn fetch_invitations(&self) -> Result<Vec<Invitation>, SyncError> {
        self.get("/api/chess/invitations/").await
    }

    async fn send_invitation(&self, recipient: &UserId) -> Result<Invitation, SyncError> {
        #[derive(Serialize)]
        struct Body<'a> {
            recipient: &'a UserId,
        }
        self.post("/api/chess/invitations/", &Body { recipient }).await
    }

    async fn accept_invitation(&self, id: &InvitationId) -> Result<GameSession, SyncError> {
        self.post(
            &format!("/api/chess/accept-invitation/{id}/"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn decline_invitation(&self, id: &InvitationId) -> Result<Invitation, SyncError> {
        self.post(
            &format!("/api/chess/decline-invitation/{id}/"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn fetch_online_users(&self) -> Result<Vec<UserId>, SyncError> {
        self.get("/api/auth/users/").await
    }
}

/// Non-success statuses carry the collaborator's own message; it reaches the
/// caller verbatim so "Invalid move" reads the same everywhere.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::from_status(status.as_u16(), server_detail(&body)));
    }
    response
        .json()
        .await
        .map_err(|e| SyncError::Protocol(e.to_string()))
}

/// Pull the human-readable message out of an error body, falling back to the
/// raw text when it is not the usual `{"error": ...}` shape.
fn server_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    body.to_string()
}

// --- Authentication (pre-session; no SessionContext exists yet) ---

#[derive(Clone, Debug, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Token handed out by the auth endpoints, plus who it belongs to.
pub struct AuthSession {
    pub user: UserId,
    pub token: SecretString,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    username: UserId,
}

pub async fn login(api_base: &str, credentials: &Credentials) -> Result<AuthSession, SyncError> {
    auth_request(api_base, "/api/auth/login/", credentials).await
}

pub async fn register(api_base: &str, credentials: &Credentials) -> Result<AuthSession, SyncError> {
    auth_request(api_base, "/api/auth/register/", credentials).await
}

/// Invalidate the token server-side. Best effort on the way out.
pub async fn logout(ctx: &SessionContext) -> Result<(), SyncError> {
    let response = reqwest::Client::new()
        .post(ctx.api_url("/api/auth/logout/"))
        .header(header::AUTHORIZATION, ctx.auth_header())
        .send()
        .await
        .map_err(|e| SyncError::Connectivity(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::from_status(status.as_u16(), server_detail(&body)));
    }
    Ok(())
}

async fn auth_request(
    api_base: &str,
    path: &str,
    credentials: &Credentials,
) -> Result<AuthSession, SyncError> {
    let base = api_base.trim_end_matches('/');
    let response = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(credentials)
        .send()
        .await
        .map_err(|e| SyncError::Connectivity(e.to_string()))?;
    let parsed: TokenResponse = decode(response).await?;
    Ok(AuthSession {
        user: parsed.username,
        token: SecretString::from(parsed.token),
    })
}
