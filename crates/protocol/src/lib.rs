//! Wire protocol for the ferry transfer session.
//!
//! Every exchange between client and server travels over one persistent
//! TCP connection as length-framed messages:
//!
//! ```text
//! FRAME: [opcode:1][len:4 BE][payload:len]
//!
//! ListRequest   (c -> s): empty
//! ListResponse  (s -> c): [count:4] then per entry [nameLen:2][name][size:4]
//! FileRequest   (c -> s): [nameLen:2][name]
//! FileResponse  (s -> c): [fileLen:4][fileBytes]   (fileLen=0 => not found)
//! UploadRequest (c -> s): [nameLen:2][name][fileLen:4][fileBytes]
//! UploadAck     (s -> c): [status:1]               (0=ok, nonzero=rejected)
//! Ping / Pong   (either): empty
//! ```
//!
//! All multi-byte integers are big-endian. A whole file travels in a single
//! frame, so [`MAX_FRAME_LEN`] is also the largest transferable file.

pub mod error;
pub mod payload;
pub mod wire;

pub use error::ProtocolError;
pub use payload::DirectoryEntry;
pub use wire::{Frame, FrameError, Opcode};

use std::time::Duration;

/// Fixed port the server listens on.
pub const DEFAULT_PORT: u16 = 4815;

/// Upper bound on a frame's declared payload length (256 MB).
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Timeout for the initial TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the liveness probe waits for a Pong.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// How long an upload waits for the server's acknowledgement.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// UploadAck status: accepted.
pub const ACK_OK: u8 = 0;

/// UploadAck status: the file name was rejected.
pub const ACK_BAD_NAME: u8 = 1;

/// UploadAck status: the server failed to persist the file.
pub const ACK_WRITE_FAILED: u8 = 2;
