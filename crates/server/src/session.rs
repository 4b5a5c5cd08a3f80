//! Per-connection session loop.
//!
//! Each client gets one of these, running until the client disconnects, the
//! server is cancelled, or the client breaks protocol. Requests are answered
//! strictly in order; the loop never reads ahead.

use std::path::Path;

use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ferry_protocol::payload::{
    decode_file_request, decode_upload, encode_file_response, encode_listing, encode_upload_ack,
};
use ferry_protocol::wire::{try_read_frame, write_frame};
use ferry_protocol::{ACK_BAD_NAME, ACK_OK, ACK_WRITE_FAILED, DirectoryEntry, Frame, Opcode};

use crate::error::ServerError;

/// Serves one client connection to completion.
///
/// Returns `Ok(())` on a clean client disconnect (EOF between frames);
/// protocol violations and I/O faults close only this session.
pub async fn serve(
    stream: TcpStream,
    root: &Path,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServerError::Cancelled),
            result = try_read_frame(&mut reader) => match result? {
                Some(frame) => frame,
                None => {
                    debug!("client disconnected");
                    return Ok(());
                }
            },
        };

        dispatch(frame, root, &mut writer).await?;
        writer.flush().await?;
    }
}

async fn dispatch<W: tokio::io::AsyncWrite + Unpin>(
    frame: Frame,
    root: &Path,
    writer: &mut W,
) -> Result<(), ServerError> {
    match frame.opcode {
        Opcode::ListRequest => {
            let entries = scan_directory(root).await?;
            debug!(entries = entries.len(), "listing sent");
            write_frame(writer, Opcode::ListResponse, &encode_listing(&entries)?).await?;
        }

        Opcode::FileRequest => {
            let name = decode_file_request(&frame.payload)?;
            let response = read_shared_file(root, &name).await;
            write_frame(
                writer,
                Opcode::FileResponse,
                &encode_file_response(response.as_deref()),
            )
            .await?;
        }

        Opcode::UploadRequest => {
            let (name, bytes) = decode_upload(&frame.payload)?;
            let status = store_upload(root, &name, &bytes).await;
            write_frame(writer, Opcode::UploadAck, &encode_upload_ack(status)).await?;
        }

        Opcode::Ping => {
            write_frame(writer, Opcode::Pong, &[]).await?;
        }

        // A stray Pong is harmless; the server never probes.
        Opcode::Pong => debug!("ignoring unsolicited Pong"),

        other @ (Opcode::ListResponse | Opcode::FileResponse | Opcode::UploadAck) => {
            return Err(ServerError::ClientSentServerOpcode(other));
        }
    }
    Ok(())
}

/// Scans the shared directory. Only regular files are listed; order is as
/// the filesystem yields them and becomes the client's user-visible order.
async fn scan_directory(root: &Path) -> Result<Vec<DirectoryEntry>, ServerError> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(root).await?;

    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            warn!(name = ?entry.file_name(), "skipping non-UTF-8 file name");
            continue;
        };
        // Listing sizes are 4 bytes on the wire; larger files cannot be
        // transferred whole-frame anyway.
        let size = u32::try_from(metadata.len()).unwrap_or(u32::MAX);
        entries.push(DirectoryEntry { name, size });
    }

    Ok(entries)
}

/// Reads a requested file, or `None` for the not-found sentinel.
async fn read_shared_file(root: &Path, name: &str) -> Option<Vec<u8>> {
    if validate_name(name).is_err() {
        warn!(name, "rejected file request with invalid name");
        return None;
    }

    match tokio::fs::read(root.join(name)).await {
        Ok(bytes) => {
            debug!(name, size = bytes.len(), "file served");
            Some(bytes)
        }
        Err(e) => {
            debug!(name, error = %e, "requested file not readable");
            None
        }
    }
}

/// Persists an upload into the shared directory, returning the ack status.
async fn store_upload(root: &Path, name: &str, bytes: &[u8]) -> u8 {
    if let Err(reason) = validate_name(name) {
        warn!(name, reason, "rejected upload name");
        return ACK_BAD_NAME;
    }

    match tokio::fs::write(root.join(name), bytes).await {
        Ok(()) => {
            debug!(name, size = bytes.len(), "upload stored");
            ACK_OK
        }
        Err(e) => {
            warn!(name, error = %e, "failed to store upload");
            ACK_WRITE_FAILED
        }
    }
}

/// Validates an upload or request name. The shared directory is flat, so
/// any separator or traversal component is rejected outright.
fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.contains('/') || name.contains('\\') {
        return Err("path separator in name");
    }
    if name == "." || name == ".." {
        return Err("traversal component");
    }
    if name.contains(':') {
        return Err("drive prefix in name");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_rejects_empty() {
        assert!(validate_name("").is_err());
    }

    #[test]
    fn validate_name_rejects_separators() {
        assert!(validate_name("a/b.txt").is_err());
        assert!(validate_name("a\\b.txt").is_err());
        assert!(validate_name("/etc/passwd").is_err());
    }

    #[test]
    fn validate_name_rejects_traversal() {
        assert!(validate_name("..").is_err());
        assert!(validate_name("../secret").is_err());
    }

    #[test]
    fn validate_name_rejects_drive_prefix() {
        assert!(validate_name("C:evil.exe").is_err());
    }

    #[test]
    fn validate_name_allows_plain_files() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name("no_extension").is_ok());
        assert!(validate_name(".hidden").is_ok());
    }

    #[tokio::test]
    async fn scan_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.txt"), b"bbb").unwrap();

        let entries = scan_directory(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].size, 3);
    }

    #[tokio::test]
    async fn read_shared_file_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_shared_file(dir.path(), "nope.bin").await.is_none());
    }

    #[tokio::test]
    async fn read_shared_file_rejects_invalid_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.txt"), b"data").unwrap();
        assert!(read_shared_file(dir.path(), "../ok.txt").await.is_none());
    }

    #[tokio::test]
    async fn store_upload_writes_into_root() {
        let dir = tempfile::tempdir().unwrap();
        let status = store_upload(dir.path(), "new.bin", b"\x01\x02").await;
        assert_eq!(status, ACK_OK);
        assert_eq!(std::fs::read(dir.path().join("new.bin")).unwrap(), b"\x01\x02");
    }

    #[tokio::test]
    async fn store_upload_rejects_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        let status = store_upload(dir.path(), "../evil.bin", b"x").await;
        assert_eq!(status, ACK_BAD_NAME);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
