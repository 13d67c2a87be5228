// src/client/errors.rs
use thiserror::Error;

/// Failure raised once at connect time. Retried opportunistically by
/// housekeeping and the wake logic, never synchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Initial state before any connect attempt.
    #[error("not connected")]
    NotConnected,
    #[error("backend is unreachable")]
    Unreachable,
    #[error("backend protocol version is not supported")]
    UnsupportedVersion,
    #[error("backend service API is unavailable")]
    ApiUnavailable,
}

/// Result codes crossing the component boundary. None of the components
/// panic or throw across it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PvrError {
    /// A backend mutation did not succeed. Connection loss mid-operation is
    /// reported the same way.
    #[error("backend operation failed")]
    OperationFailed,
    /// Stale client-side reference: the recording, channel or timer is gone.
    #[error("no such recording, channel or timer")]
    NotFound,
    #[error("operation requires a newer backend service version")]
    Unsupported,
    /// A live-session or scheduling invariant blocks the request.
    #[error("conflicts with the active live session")]
    Conflict,
}

/// Transport-level error from the control link. Collapsed to
/// [`PvrError::OperationFailed`] (or `NotFound`) at the component boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("entity not found on backend")]
    Missing,
}

impl From<BackendError> for PvrError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Missing => PvrError::NotFound,
            _ => PvrError::OperationFailed,
        }
    }
}
