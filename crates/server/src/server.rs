//! TCP listener and accept loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::session;

/// The shared-directory file server.
///
/// `root` is the directory whose regular files are listed, served, and
/// written to. Uploads land flat in `root`; names with directory components
/// are rejected at the wire.
#[derive(Debug, Clone)]
pub struct FileServer {
    root: PathBuf,
    cancel: CancellationToken,
}

impl FileServer {
    pub fn new(root: PathBuf, cancel: CancellationToken) -> Self {
        Self { root, cancel }
    }

    /// Binds the listener. Port 0 asks the OS for an ephemeral port; the
    /// bound address is available from [`BoundServer::local_addr`].
    pub async fn bind(self, addr: SocketAddr) -> Result<BoundServer, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, root = %self.root.display(), "file server bound");
        Ok(BoundServer {
            server: self,
            listener,
            local_addr,
        })
    }
}

/// A bound server, ready to accept sessions.
#[derive(Debug)]
pub struct BoundServer {
    server: FileServer,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until cancelled, spawning one session task per
    /// client. A failed session tears down only that connection; the
    /// listener keeps serving.
    pub async fn run(self) -> Result<(), ServerError> {
        let root = Arc::new(self.server.root);

        loop {
            let (stream, addr) = tokio::select! {
                biased;
                _ = self.server.cancel.cancelled() => {
                    info!("file server shutting down");
                    return Err(ServerError::Cancelled);
                }
                result = self.listener.accept() => result?,
            };

            info!(%addr, "session accepted");
            let root = Arc::clone(&root);
            let cancel = self.server.cancel.clone();
            tokio::spawn(async move {
                match session::serve(stream, &root, cancel).await {
                    Ok(()) => info!(%addr, "session closed"),
                    Err(e) => warn!(%addr, error = %e, "session ended with error"),
                }
            });
        }
    }
}
