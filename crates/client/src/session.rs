//! The client transfer session.
//!
//! Connects to the server, frames and dispatches directory / file / upload
//! requests over the single persistent connection, tracks the shared upload
//! quota, and probes liveness. All operations are serialized by `&mut self`
//! ownership; the one-slot [`Pending`] state catches the split
//! request/receive listing pair and rejects overlapping transfers.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ferry_protocol::payload::{
    decode_file_response, decode_listing, decode_upload_ack, encode_file_request, encode_upload,
};
use ferry_protocol::wire::{read_frame, write_frame};
use ferry_protocol::{
    ACK_OK, ACK_TIMEOUT, CONNECT_TIMEOUT, DirectoryEntry, Opcode, PROBE_TIMEOUT, ProtocolError,
};

use crate::error::ClientError;
use crate::events::{SessionEvent, TransferResult};
use crate::quota::QuotaTracker;

/// Response the session is still owed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// A ListRequest was sent; the next inbound frame is a ListResponse.
    Listing,
}

/// A file reserved against the quota, awaiting [`Session::commit_upload`].
#[derive(Debug, Clone)]
struct StagedFile {
    path: PathBuf,
    size: u64,
}

/// Client-side transfer session over one persistent TCP connection.
///
/// Created by [`connect`](Session::connect), destroyed by
/// [`disconnect`](Session::disconnect) or by dropping it after a fatal
/// fault. Reconnecting means creating a new session.
pub struct Session {
    addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    catalog: Vec<DirectoryEntry>,
    staged: Vec<StagedFile>,
    quota: Arc<QuotaTracker>,
    events: mpsc::Sender<SessionEvent>,
    pending: Option<Pending>,
    /// Set when the wire state is unknown (timeout mid-read, stray opcode).
    /// Every subsequent operation fails until the caller reconnects.
    poisoned: bool,
}

impl Session {
    /// Opens the TCP connection and builds a session around it.
    ///
    /// `quota` is the shared upload budget; `events` receives completed
    /// downloads. Fails with [`ClientError::Connect`] when the peer is
    /// unreachable, refuses, or the attempt times out.
    pub async fn connect(
        addr: SocketAddr,
        quota: Arc<QuotaTracker>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, ClientError> {
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ClientError::Connect(format!("{addr}: {e}"))),
            Err(_) => return Err(ClientError::Connect(format!("{addr}: connection timed out"))),
        };

        info!(%addr, "session connected");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            addr,
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            catalog: Vec::new(),
            staged: Vec::new(),
            quota,
            events,
            pending: None,
            poisoned: false,
        })
    }

    /// Address this session is connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Remaining upload budget, in bytes.
    pub fn remaining_quota(&self) -> u64 {
        self.quota.remaining()
    }

    /// Last cached directory snapshot. Empty before the first refresh.
    pub fn listing(&self) -> &[DirectoryEntry] {
        &self.catalog
    }

    fn ensure_idle(&self) -> Result<(), ClientError> {
        if self.poisoned {
            return Err(ClientError::InvalidState(
                "session poisoned by an earlier fault; reconnect",
            ));
        }
        if self.pending.is_some() {
            return Err(ClientError::InvalidState(
                "a previous request is still awaiting its response",
            ));
        }
        Ok(())
    }

    async fn send(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), ClientError> {
        write_frame(&mut self.writer, opcode, payload).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads the next frame and checks its opcode. Anything unexpected
    /// poisons the session: the stream can no longer be trusted.
    async fn expect(
        &mut self,
        opcode: Opcode,
        expected: &'static str,
    ) -> Result<Vec<u8>, ClientError> {
        let frame = match read_frame(&mut self.reader).await {
            Ok(frame) => frame,
            Err(e) => {
                self.poisoned = true;
                return Err(e.into());
            }
        };
        if frame.opcode != opcode {
            self.poisoned = true;
            return Err(ClientError::UnexpectedReply {
                expected,
                got: frame.opcode,
            });
        }
        Ok(frame.payload)
    }

    /// Lifts a payload decode result, poisoning the session on failure.
    /// A malformed body is as fatal as a malformed frame: the peer cannot
    /// be trusted to stay in sync.
    fn decode<T>(&mut self, result: Result<T, ProtocolError>) -> Result<T, ClientError> {
        result.map_err(|e| {
            self.poisoned = true;
            e.into()
        })
    }

    /// Sends a ListRequest. The listing must then be consumed with
    /// [`receive_directory`](Session::receive_directory); the two are
    /// separate calls so a refresh can be triggered ahead of consumption.
    pub async fn request_directory(&mut self) -> Result<(), ClientError> {
        self.ensure_idle()?;
        self.send(Opcode::ListRequest, &[]).await?;
        self.pending = Some(Pending::Listing);
        debug!("directory refresh requested");
        Ok(())
    }

    /// Blocks for the ListResponse and replaces the cached catalog
    /// wholesale, preserving server-declared order.
    pub async fn receive_directory(&mut self) -> Result<&[DirectoryEntry], ClientError> {
        if self.poisoned {
            return Err(ClientError::InvalidState(
                "session poisoned by an earlier fault; reconnect",
            ));
        }
        if self.pending != Some(Pending::Listing) {
            return Err(ClientError::InvalidState(
                "no directory refresh is in flight",
            ));
        }

        let payload = self.expect(Opcode::ListResponse, "ListResponse").await?;
        self.pending = None;
        let decoded = decode_listing(&payload);
        self.catalog = self.decode(decoded)?;
        debug!(entries = self.catalog.len(), "directory listing received");
        Ok(&self.catalog)
    }

    /// Downloads a file. The whole content arrives in one FileResponse and
    /// is handed off through the event channel as a
    /// [`SessionEvent::DownloadComplete`]; the session keeps no copy.
    ///
    /// Fails with [`ClientError::NotFound`] when the server reports the file
    /// missing (the session stays usable) and with
    /// [`ClientError::InvalidState`] when another request is outstanding.
    pub async fn download(&mut self, name: &str) -> Result<(), ClientError> {
        self.ensure_idle()?;

        self.send(Opcode::FileRequest, &encode_file_request(name)?)
            .await?;
        let payload = self.expect(Opcode::FileResponse, "FileResponse").await?;

        let decoded = decode_file_response(&payload);
        let Some(bytes) = self.decode(decoded)? else {
            debug!(name, "server reported file not found");
            return Err(ClientError::NotFound(name.to_string()));
        };

        info!(name, size = bytes.len(), "download complete");
        let result = TransferResult {
            name: name.to_string(),
            bytes,
        };
        // Deliver without blocking; a full or dropped receiver loses the
        // event, never stalls the session.
        let _ = self.events.try_send(SessionEvent::DownloadComplete(result));
        Ok(())
    }

    /// Stages a local file for upload, reserving its size against the quota.
    ///
    /// Purely local (no network I/O), so a batch can be accumulated before
    /// committing. Fails with [`ClientError::QuotaExceeded`] without
    /// reserving anything when the file does not fit the remaining budget.
    pub async fn stage(&mut self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|_| ClientError::InvalidPath(path.to_path_buf()))?
            .len();

        if !self.quota.try_reserve(size) {
            return Err(ClientError::QuotaExceeded {
                requested: size,
                remaining: self.quota.remaining(),
            });
        }

        debug!(path = %path.display(), size, "file staged for upload");
        self.staged.push(StagedFile {
            path: path.to_path_buf(),
            size,
        });
        Ok(())
    }

    /// Removes a staged file and returns its reservation to the quota.
    pub fn unstage(&mut self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let path = path.as_ref();
        let index = self
            .staged
            .iter()
            .position(|staged| staged.path == path)
            .ok_or(ClientError::InvalidState("path is not staged"))?;

        let staged = self.staged.remove(index);
        self.quota.release(staged.size);
        debug!(path = %path.display(), "file unstaged");
        Ok(())
    }

    /// Number of files currently staged.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Sends every staged file, in stage order, waiting for each UploadAck
    /// before the next file (no pipelining).
    ///
    /// Files acked before a fault count as delivered and leave the staged
    /// set; the failed file and the rest stay staged with their quota
    /// reservations intact, and nothing is retried automatically. On full
    /// success the staged set is cleared and the catalog refreshed so the
    /// listing reflects the new files.
    pub async fn commit_upload(&mut self) -> Result<(), ClientError> {
        self.ensure_idle()?;
        if self.staged.is_empty() {
            return Err(ClientError::InvalidState("upload batch is empty"));
        }

        while let Some(staged) = self.staged.first().cloned() {
            let bytes = tokio::fs::read(&staged.path)
                .await
                .map_err(|_| ClientError::InvalidPath(staged.path.clone()))?;
            let name = staged
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ClientError::InvalidPath(staged.path.clone()))?
                .to_string();

            self.send(Opcode::UploadRequest, &encode_upload(&name, &bytes)?)
                .await?;

            let payload =
                match tokio::time::timeout(ACK_TIMEOUT, self.expect(Opcode::UploadAck, "UploadAck"))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        self.poisoned = true;
                        return Err(ClientError::Timeout);
                    }
                };

            let decoded = decode_upload_ack(&payload);
            let status = self.decode(decoded)?;
            if status != ACK_OK {
                warn!(%name, status, "server rejected upload");
                return Err(ClientError::UploadRejected { name, status });
            }

            debug!(%name, size = bytes.len(), "upload acknowledged");
            self.staged.remove(0);
        }

        info!("upload batch complete, refreshing listing");
        self.request_directory().await?;
        self.receive_directory().await?;
        Ok(())
    }

    /// Probes the server with a Ping, waiting up to the probe timeout for a
    /// Pong. Returns `false` on timeout or any fault — advisory only; the
    /// caller decides whether to tear the session down.
    ///
    /// A timed-out or garbled probe leaves the wire state unknown, so it
    /// also poisons the session.
    pub async fn is_alive(&mut self) -> bool {
        if self.poisoned {
            return false;
        }
        if self.pending.is_some() {
            // A response is owed; probing now would desync the stream.
            // The connection was healthy when the request went out.
            return true;
        }

        if self.send(Opcode::Ping, &[]).await.is_err() {
            self.poisoned = true;
            return false;
        }

        match tokio::time::timeout(PROBE_TIMEOUT, self.expect(Opcode::Pong, "Pong")).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                warn!(addr = %self.addr, "liveness probe timed out");
                self.poisoned = true;
                false
            }
        }
    }

    /// Tears the connection down. Terminal: a new session is required to
    /// reconnect. Staged but unsent files return their quota reservations.
    pub async fn disconnect(mut self) {
        for staged in self.staged.drain(..) {
            self.quota.release(staged.size);
        }
        let _ = self.writer.shutdown().await;
        info!(addr = %self.addr, "session disconnected");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.addr)
            .field("catalog_entries", &self.catalog.len())
            .field("staged", &self.staged.len())
            .field("pending", &self.pending)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
