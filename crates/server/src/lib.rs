//! Shared-directory file server.
//!
//! Binds a TCP listener and answers ferry transfer sessions: directory
//! listings, whole-file downloads, uploads into the shared directory, and
//! Ping/Pong liveness probes. Each accepted connection gets its own session
//! task; within a session, requests are answered strictly one at a time,
//! matching the client's single-outstanding-request view.

pub mod error;
pub mod server;
pub mod session;

pub use error::ServerError;
pub use server::{BoundServer, FileServer};
