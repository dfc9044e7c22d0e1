//! Error taxonomy for the arena server.
//!
//! Every variant maps onto one [`ErrorKind`] on the wire. Only
//! [`Error::StoreUnavailable`] is worth retrying; a retried vote that already
//! landed comes back as [`Error::DuplicateVote`], never as a second vote.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use types_rs::arena::{
    api::{ErrorBody, ErrorKind},
    BattleId, InvalidBattle, InvalidChoice, LifecycleState, VoterId,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("battle not found: {0}")]
    BattleNotFound(BattleId),

    #[error("battle not found: {0:?} is not a battle id")]
    MalformedBattleId(String),

    #[error("battle {battle_id} is not open for voting (currently {state})")]
    BattleNotOpen {
        battle_id: BattleId,
        state: LifecycleState,
    },

    #[error(transparent)]
    InvalidChoice(#[from] InvalidChoice),

    #[error("voter {voter_id} has already voted in battle {battle_id}")]
    DuplicateVote {
        battle_id: BattleId,
        voter_id: VoterId,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("invalid battle: {0}")]
    InvalidBattle(#[from] InvalidBattle),
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::BattleNotFound(_) | Error::MalformedBattleId(_) => ErrorKind::BattleNotFound,
            Error::BattleNotOpen { .. } => ErrorKind::BattleNotOpen,
            Error::InvalidChoice(_) => ErrorKind::InvalidChoice,
            Error::DuplicateVote { .. } => ErrorKind::DuplicateVote,
            Error::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::InvalidBattle(_) => ErrorKind::InvalidBattle,
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::BattleNotFound => StatusCode::NOT_FOUND,
            ErrorKind::BattleNotOpen | ErrorKind::DuplicateVote => StatusCode::CONFLICT,
            ErrorKind::InvalidChoice | ErrorKind::InvalidBattle => StatusCode::BAD_REQUEST,
            ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    pub(crate) fn store_unavailable(message: &'static str) -> Self {
        Error::StoreUnavailable(message.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::StoreUnavailable(Box::new(e))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            error: self.kind(),
            message: self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("Responding with error: {status} {body:?}");
        } else {
            tracing::warn!("Responding with error: {status} {body:?}");
        }

        (status, Json(body)).into_response()
    }
}
