//! Error types for the client session.

use std::path::PathBuf;

use ferry_protocol::{FrameError, Opcode, ProtocolError};

/// Errors produced by the client session.
///
/// Environmental failures (`Connect`, `Io`, `NotFound`, `QuotaExceeded`,
/// `Timeout`) are expected outcomes the caller handles; `InvalidState`
/// indicates a caller bug (overlapping requests, empty upload batch). The
/// session never retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach server: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("expected {expected}, server sent {got:?}")]
    UnexpectedReply {
        expected: &'static str,
        got: Opcode,
    },

    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    #[error("upload quota exceeded: {requested} bytes requested, {remaining} remaining")]
    QuotaExceeded { requested: u64, remaining: u64 },

    #[error("file not found on server: {0}")]
    NotFound(String),

    #[error("invalid local path: {0}")]
    InvalidPath(PathBuf),

    #[error("server rejected upload of {name} (status {status})")]
    UploadRejected { name: String, status: u8 },

    #[error("timed out waiting for server response")]
    Timeout,
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => Self::Io(e),
            FrameError::Protocol(e) => Self::Protocol(e),
        }
    }
}
