use thiserror::Error;

/// Any failure of the generation call.
///
/// The kind is kept for logging only; callers treat every kind the same.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RequestFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RequestFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Quota, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidRequest, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Server, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Malformed, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 => FailureKind::InvalidRequest,
            401 | 403 => FailureKind::Auth,
            429 => FailureKind::Quota,
            500..=599 => FailureKind::Server,
            _ => FailureKind::Unknown,
        };
        Self::new(kind, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Auth,
    Quota,
    InvalidRequest,
    Server,
    Malformed,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network error",
            FailureKind::Auth => "authentication failed",
            FailureKind::Quota => "quota exceeded",
            FailureKind::InvalidRequest => "invalid request",
            FailureKind::Server => "server error",
            FailureKind::Malformed => "malformed response",
            FailureKind::Unknown => "request failed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
