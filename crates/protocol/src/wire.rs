//! Frame-level encoding: `[opcode:1][len:4][payload]`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_FRAME_LEN;
use crate::error::ProtocolError;

/// Message opcodes. One byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    ListRequest = 0x01,
    ListResponse = 0x02,
    FileRequest = 0x03,
    FileResponse = 0x04,
    UploadRequest = 0x05,
    UploadAck = 0x06,
    Ping = 0x07,
    Pong = 0x08,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0x01 => Ok(Self::ListRequest),
            0x02 => Ok(Self::ListResponse),
            0x03 => Ok(Self::FileRequest),
            0x04 => Ok(Self::FileResponse),
            0x05 => Ok(Self::UploadRequest),
            0x06 => Ok(Self::UploadAck),
            0x07 => Ok(Self::Ping),
            0x08 => Ok(Self::Pong),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// One framed message: opcode plus its full payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Framing failures, wrapping both protocol and I/O faults.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Writes one frame to the stream. Does not flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    opcode: Opcode,
    payload: &[u8],
) -> Result<(), FrameError> {
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(ProtocolError::Oversize {
            declared: payload.len() as u64,
            max: MAX_FRAME_LEN as u64,
        }
        .into());
    }

    writer.write_u8(opcode as u8).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Reads one full frame from the stream.
///
/// Fails on an unrecognized opcode, an oversize length declaration, or the
/// stream closing mid-frame (`UnexpectedEof` from the underlying read).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    let opcode = Opcode::try_from(reader.read_u8().await?)?;
    read_frame_body(reader, opcode).await
}

/// Like [`read_frame`], but returns `None` when the stream closes cleanly
/// between frames. EOF after the opcode byte is still an error.
pub async fn try_read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Frame>, FrameError> {
    let byte = match reader.read_u8().await {
        Ok(byte) => byte,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let opcode = Opcode::try_from(byte)?;
    Ok(Some(read_frame_body(reader, opcode).await?))
}

async fn read_frame_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    opcode: Opcode,
) -> Result<Frame, FrameError> {
    let len = reader.read_u32().await?;

    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::Oversize {
            declared: len as u64,
            max: MAX_FRAME_LEN as u64,
        }
        .into());
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Frame { opcode, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip_all_opcodes() {
        let opcodes = [
            Opcode::ListRequest,
            Opcode::ListResponse,
            Opcode::FileRequest,
            Opcode::FileResponse,
            Opcode::UploadRequest,
            Opcode::UploadAck,
            Opcode::Ping,
            Opcode::Pong,
        ];

        for opcode in opcodes {
            let mut buf = Vec::new();
            write_frame(&mut buf, opcode, b"payload").await.unwrap();

            let mut cursor = &buf[..];
            let frame = read_frame(&mut cursor).await.unwrap();
            assert_eq!(frame.opcode, opcode);
            assert_eq!(frame.payload, b"payload");
        }
    }

    #[tokio::test]
    async fn empty_payload_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, Opcode::Ping, &[]).await.unwrap();
        assert_eq!(buf, [0x07, 0, 0, 0, 0]);

        let mut cursor = &buf[..];
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.opcode, Opcode::Ping);
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn unknown_opcode_rejected() {
        let buf = [0xFFu8, 0, 0, 0, 0];
        let mut cursor = &buf[..];
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::Protocol(ProtocolError::UnknownOpcode(0xFF))
        ));
    }

    #[tokio::test]
    async fn oversize_declaration_rejected() {
        let mut buf = vec![0x04u8];
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut cursor = &buf[..];
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::Protocol(ProtocolError::Oversize { .. })
        ));
    }

    #[tokio::test]
    async fn eof_mid_frame_is_io_error() {
        // Declares 10 payload bytes but provides 3.
        let mut buf = vec![0x03u8];
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"abc");

        let mut cursor = &buf[..];
        let err = read_frame(&mut cursor).await.unwrap_err();
        match err {
            FrameError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected I/O error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn try_read_frame_clean_eof() {
        let mut cursor: &[u8] = &[];
        assert!(try_read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn try_read_frame_eof_after_opcode_is_error() {
        let buf = [0x01u8];
        let mut cursor = &buf[..];
        assert!(try_read_frame(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn length_field_is_big_endian() {
        let mut buf = Vec::new();
        write_frame(&mut buf, Opcode::FileRequest, &[0u8; 258])
            .await
            .unwrap();
        assert_eq!(&buf[1..5], &[0, 0, 1, 2]);
    }
}
