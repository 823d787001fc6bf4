// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Error types shared by the gateway, the session store and the durable store.

use thiserror::Error;

/// Failure of a single request dispatched through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// HTTP 401. The gateway has already cleared the session and redirected.
    #[error("session expired")]
    AuthExpired,

    /// Any other 4xx (and non-2xx statuses outside 4xx/5xx).
    #[error("request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    /// 5xx
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// No response was received at all.
    #[error("network error: {0}")]
    Transport(String),

    /// A response arrived but did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// HTTP status carried by the error, if the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::AuthExpired => Some(401),
            GatewayError::Client { status, .. } | GatewayError::Server { status, .. } => Some(*status),
            GatewayError::Transport(_) | GatewayError::Malformed(_) => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

/// Durable key-value store failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Session lifecycle failure.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The authentication service refused the login or could not be reached.
    #[error("login failed: {0}")]
    Login(GatewayError),

    /// The backend rejected the stored credential; the session has been cleared.
    #[error("credential rejected by the server")]
    CredentialRejected,

    /// Profile fetch failed for a reason other than a rejected credential. Retryable.
    #[error("failed to fetch user profile: {0}")]
    Profile(GatewayError),

    /// Any other request made on behalf of the session failed.
    #[error(transparent)]
    Request(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Configuration load/save failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: String, message: String },
}
