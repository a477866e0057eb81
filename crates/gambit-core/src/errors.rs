/// Typed error hierarchy for the synchronization engine.
/// Classifies failures as transient (backoff handles them), fatal
/// (user-visible, no retry), or recoverable via resynchronization.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SyncError {
    // Transient: the connection manager retries with backoff
    #[error("channel dropped: {0}")]
    Connectivity(String),

    // Fatal: no further automatic retry
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ConnectivityExhausted { attempts: u32 },
    #[error("authentication failed: {0}")]
    Auth(String),

    // Recovered locally, logged and dropped
    #[error("malformed or unrecognized message: {0}")]
    Protocol(String),

    // Recovered by a full resynchronization fetch
    #[error("state inconsistency: {0}")]
    StateInconsistency(String),

    // Surfaced to the caller verbatim, no retry, no mutation
    #[error("submission rejected: {0}")]
    Submission(String),
}

impl SyncError {
    /// Backoff-and-retry territory.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    /// The caller must intervene (re-authenticate, reopen manually).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectivityExhausted { .. } | Self::Auth(_))
    }

    /// Recovery is a full session fetch from the persistence service.
    pub fn needs_resync(&self) -> bool {
        matches!(self, Self::StateInconsistency(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::ConnectivityExhausted { .. } => "connectivity_exhausted",
            Self::Auth(_) => "auth",
            Self::Protocol(_) => "protocol",
            Self::StateInconsistency(_) => "state_inconsistency",
            Self::Submission(_) => "submission",
        }
    }

    /// Classify an HTTP status from a collaborator endpoint.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Auth(body),
            400..=499 => Self::Submission(body),
            _ => Self::Connectivity(format!("status {status}: {body}")),
        }
    }
}
