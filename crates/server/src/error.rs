//! Error types for the file server.

use ferry_protocol::{FrameError, ProtocolError};

/// Errors produced by the server and its per-connection sessions.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("client sent {0:?}, which only a server may send")]
    ClientSentServerOpcode(ferry_protocol::Opcode),

    #[error("server shut down")]
    Cancelled,
}

impl From<FrameError> for ServerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => Self::Io(e),
            FrameError::Protocol(e) => Self::Protocol(e),
        }
    }
}
