//! Error types for the wire protocol.

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("declared payload length {declared} exceeds maximum {max}")]
    Oversize { declared: u64, max: u64 },

    #[error("truncated payload while reading {0}")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("name too long: {0} bytes (max {max})", max = u16::MAX)]
    NameTooLong(usize),

    #[error("name is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}
