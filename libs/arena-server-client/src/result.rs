use reqwest::StatusCode;
use types_rs::arena::api::{ErrorBody, ErrorKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("base URL cannot take path segments: {0}")]
    InvalidBaseUrl(url::Url),

    /// The server rejected the request with one of its known error kinds.
    #[error("{kind} (status_code={status_code:?}): {message}")]
    Api {
        status_code: StatusCode,
        kind: ErrorKind,
        message: String,
    },

    /// The server responded with an error this client does not understand.
    #[error("HTTP error: {context} status_code={status_code:?} {text}")]
    Http {
        status_code: StatusCode,
        text: String,
        context: String,
    },
}

impl Error {
    /// The server-side error kind, if the server reported one.
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether repeating the request may succeed. Votes are safe to repeat: a
    /// vote that already landed comes back as [`ErrorKind::DuplicateVote`].
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { kind, .. } => kind.is_retryable(),
            Self::Reqwest(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status_code, .. } => status_code.is_server_error(),
            Self::InvalidBaseUrl(_) => false,
        }
    }

    /// Builds an error from an unsuccessful response body.
    pub(crate) fn from_response(status_code: StatusCode, text: String, context: String) -> Self {
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(ErrorBody { error, message, .. }) => Self::Api {
                status_code,
                kind: error,
                message,
            },
            Err(_) => Self::Http {
                status_code,
                text,
                context,
            },
        }
    }
}
