//! Client error types.

/// Errors returned by `AuthClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request never produced a response
    Transport(String),
    /// The server answered with a non-success status
    Status { status: u16, error: String },
    /// The session could not be refreshed; the user has to log in again
    RefreshFailed,
    /// There is no session
    NotAuthenticated,
    /// The current identity lacks the permission a route requires
    PermissionDenied,
    /// The response body did not have the expected shape
    Decode(String),
}

impl ClientError {
    /// HTTP status of a `Status` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "Request failed: {}", e),
            ClientError::Status { status, error } => write!(f, "HTTP {}: {}", status, error),
            ClientError::RefreshFailed => write!(f, "Session expired, please log in again"),
            ClientError::NotAuthenticated => write!(f, "Not logged in"),
            ClientError::PermissionDenied => write!(f, "Insufficient permissions"),
            ClientError::Decode(e) => write!(f, "Invalid response: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}
