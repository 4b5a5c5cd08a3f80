//! Client transfer session.
//!
//! A [`Session`] owns one persistent TCP connection to a ferry server and
//! serializes every protocol exchange over it: directory listing refreshes,
//! whole-file downloads, staged uploads under a byte quota, and liveness
//! probes. Downloaded bytes are delivered asynchronously through the
//! [`SessionEvent`] channel injected at connect time; the embedding layer
//! (a UI or otherwise) decides what to do with them.
//!
//! The session is strictly one-request-at-a-time. Issuing an operation while
//! another response is still owed is a caller bug and reported as
//! [`ClientError::InvalidState`], never queued.

pub mod error;
pub mod events;
pub mod quota;
pub mod session;

pub use error::ClientError;
pub use events::{SessionEvent, TransferResult};
pub use quota::QuotaTracker;
pub use session::Session;
