//! Events delivered to the embedding layer.

/// A completed download.
///
/// Ownership of the bytes passes to the receiver; the session keeps no copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Server-side file name that was requested.
    pub name: String,
    /// Full file content.
    pub bytes: Vec<u8>,
}

/// Events emitted by a [`Session`](crate::Session) on the channel injected
/// at connect time. The embedding layer handles any thread marshaling.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A download finished; the result carries the file content.
    DownloadComplete(TransferResult),
}
