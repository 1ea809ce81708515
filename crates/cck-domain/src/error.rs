use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP-style status classification for a failed service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed input: empty arrays, heterogeneous primitive kinds, empty topic/message.
    BadRequest,
    Unauthorized,
    /// File-system or ACL denial.
    Forbidden,
    /// Absent item, object or subscription target.
    NotFound,
    /// Existence collision, e.g. put without overwrite.
    Conflict,
    /// A conditional operation's precondition did not hold.
    PreconditionFailed,
    /// Retry budget exhausted against a throttling backend.
    TooManyRequests,
    /// Backend failure not otherwise classified.
    Internal,
    /// An optional dependency (e.g. pub/sub for change publishing) is absent.
    NotImplemented,
    /// Connection to the backend unavailable after a reconnect attempt.
    BadGateway,
    /// Service disposed or not initialized.
    Unavailable,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::Internal => 500,
            ErrorCode::NotImplemented => 501,
            ErrorCode::BadGateway => 502,
            ErrorCode::Unavailable => 503,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// The error half of every public service operation.
///
/// Domain failures never cross a service boundary as panics or backend
/// exception types; they arrive as an `OpError` carrying the status code and
/// a human-readable message, and the caller decides recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct OpError {
    pub code: ErrorCode,
    pub message: String,
}

impl OpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        OpError { code, message: message.into() }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::BadRequest, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::Forbidden, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::NotFound, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::Conflict, msg)
    }

    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::PreconditionFailed, msg)
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::TooManyRequests, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::Internal, msg)
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::NotImplemented, msg)
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::BadGateway, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        OpError::new(ErrorCode::Unavailable, msg)
    }

    pub fn status(&self) -> u16 {
        self.code.as_u16()
    }
}

/// Result alias used by all four service traits.
pub type OpResult<T> = Result<T, OpError>;
