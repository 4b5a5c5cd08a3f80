//! Payload-level codecs for the fixed message bodies.
//!
//! Frames carry opaque byte payloads; the functions here encode and decode
//! the per-opcode layouts documented in the crate root. Decoding operates on
//! the complete payload of an already-read frame, so every decoder rejects
//! both truncation and trailing garbage.

use crate::error::ProtocolError;

/// One entry of the server's shared directory listing.
///
/// Order and duplicates are preserved exactly as the server declared them;
/// a duplicate name is a server-side anomaly but decodes as two entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// File name (no directory components).
    pub name: String,
    /// File size in bytes.
    pub size: u32,
}

/// Cursor over a payload slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ProtocolError::Truncated(what))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, ProtocolError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, ProtocolError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn name(&mut self) -> Result<String, ProtocolError> {
        let len = self.u16("name length")?;
        let bytes = self.take(len as usize, "name")?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Fails if any bytes remain past the declared content.
    fn finish(self) -> Result<(), ProtocolError> {
        let rest = self.buf.len() - self.pos;
        if rest > 0 {
            return Err(ProtocolError::TrailingBytes(rest));
        }
        Ok(())
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) -> Result<(), ProtocolError> {
    let bytes = name.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(ProtocolError::NameTooLong(bytes.len()));
    }
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Encodes a ListResponse payload: `[count:4]` then per entry
/// `[nameLen:2][name][size:4]`.
pub fn encode_listing(entries: &[DirectoryEntry]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for entry in entries {
        put_name(&mut out, &entry.name)?;
        out.extend_from_slice(&entry.size.to_be_bytes());
    }
    Ok(out)
}

/// Decodes a ListResponse payload, preserving server order.
pub fn decode_listing(payload: &[u8]) -> Result<Vec<DirectoryEntry>, ProtocolError> {
    let mut reader = Reader::new(payload);
    let count = reader.u32("entry count")?;
    let mut entries = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let name = reader.name()?;
        let size = reader.u32("entry size")?;
        entries.push(DirectoryEntry { name, size });
    }
    reader.finish()?;
    Ok(entries)
}

/// Encodes a FileRequest payload: `[nameLen:2][name]`.
pub fn encode_file_request(name: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    put_name(&mut out, name)?;
    Ok(out)
}

/// Decodes a FileRequest payload.
pub fn decode_file_request(payload: &[u8]) -> Result<String, ProtocolError> {
    let mut reader = Reader::new(payload);
    let name = reader.name()?;
    reader.finish()?;
    Ok(name)
}

/// Encodes a FileResponse payload: `[fileLen:4][fileBytes]`.
///
/// `None` encodes the not-found sentinel (`fileLen=0`). A genuinely empty
/// shared file is therefore reported as not found; the sentinel layout from
/// the wire table makes the two indistinguishable.
pub fn encode_file_response(bytes: Option<&[u8]>) -> Vec<u8> {
    match bytes {
        Some(data) => {
            let mut out = Vec::with_capacity(4 + data.len());
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(data);
            out
        }
        None => 0u32.to_be_bytes().to_vec(),
    }
}

/// Decodes a FileResponse payload. `None` means the server reported the
/// file as missing.
pub fn decode_file_response(payload: &[u8]) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut reader = Reader::new(payload);
    let len = reader.u32("file length")?;
    if len == 0 {
        reader.finish()?;
        return Ok(None);
    }
    let bytes = reader.take(len as usize, "file bytes")?.to_vec();
    reader.finish()?;
    Ok(Some(bytes))
}

/// Encodes an UploadRequest payload: `[nameLen:2][name][fileLen:4][fileBytes]`.
pub fn encode_upload(name: &str, bytes: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(2 + name.len() + 4 + bytes.len());
    put_name(&mut out, name)?;
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Decodes an UploadRequest payload into `(name, bytes)`.
pub fn decode_upload(payload: &[u8]) -> Result<(String, Vec<u8>), ProtocolError> {
    let mut reader = Reader::new(payload);
    let name = reader.name()?;
    let len = reader.u32("file length")?;
    let bytes = reader.take(len as usize, "file bytes")?.to_vec();
    reader.finish()?;
    Ok((name, bytes))
}

/// Encodes an UploadAck payload: one status byte.
pub fn encode_upload_ack(status: u8) -> Vec<u8> {
    vec![status]
}

/// Decodes an UploadAck payload.
pub fn decode_upload_ack(payload: &[u8]) -> Result<u8, ProtocolError> {
    let mut reader = Reader::new(payload);
    let status = reader.u8("ack status")?;
    reader.finish()?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u32) -> DirectoryEntry {
        DirectoryEntry {
            name: name.into(),
            size,
        }
    }

    #[test]
    fn listing_roundtrip_preserves_order() {
        let entries = vec![
            entry("zebra.bin", 1024),
            entry("apple.txt", 3),
            entry("middle.dat", 0),
        ];
        let encoded = encode_listing(&entries).unwrap();
        let decoded = decode_listing(&encoded).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn listing_preserves_duplicate_names() {
        let entries = vec![entry("same.txt", 1), entry("same.txt", 2)];
        let decoded = decode_listing(&encode_listing(&entries).unwrap()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, decoded[1].name);
        assert_ne!(decoded[0].size, decoded[1].size);
    }

    #[test]
    fn empty_listing_roundtrip() {
        let decoded = decode_listing(&encode_listing(&[]).unwrap()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn listing_rejects_truncation() {
        let mut encoded = encode_listing(&[entry("file.txt", 99)]).unwrap();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            decode_listing(&encoded),
            Err(ProtocolError::Truncated(_))
        ));
    }

    #[test]
    fn listing_rejects_trailing_bytes() {
        let mut encoded = encode_listing(&[entry("file.txt", 99)]).unwrap();
        encoded.push(0xAA);
        assert!(matches!(
            decode_listing(&encoded),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn listing_rejects_bad_utf8() {
        // count=1, nameLen=2, invalid UTF-8, size=0
        let mut payload = 1u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&2u16.to_be_bytes());
        payload.extend_from_slice(&[0xFF, 0xFE]);
        payload.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            decode_listing(&payload),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn file_request_roundtrip() {
        let encoded = encode_file_request("report.pdf").unwrap();
        assert_eq!(decode_file_request(&encoded).unwrap(), "report.pdf");
    }

    #[test]
    fn file_request_name_too_long() {
        let long = "a".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            encode_file_request(&long),
            Err(ProtocolError::NameTooLong(_))
        ));
    }

    #[test]
    fn file_response_roundtrip() {
        let encoded = encode_file_response(Some(b"contents"));
        assert_eq!(
            decode_file_response(&encoded).unwrap(),
            Some(b"contents".to_vec())
        );
    }

    #[test]
    fn file_response_not_found_sentinel() {
        let encoded = encode_file_response(None);
        assert_eq!(encoded, [0, 0, 0, 0]);
        assert_eq!(decode_file_response(&encoded).unwrap(), None);
    }

    #[test]
    fn file_response_rejects_short_body() {
        // Declares 8 bytes, carries 3.
        let mut payload = 8u32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"abc");
        assert!(matches!(
            decode_file_response(&payload),
            Err(ProtocolError::Truncated(_))
        ));
    }

    #[test]
    fn upload_roundtrip() {
        let encoded = encode_upload("save.dat", b"\x00\x01\x02").unwrap();
        let (name, bytes) = decode_upload(&encoded).unwrap();
        assert_eq!(name, "save.dat");
        assert_eq!(bytes, b"\x00\x01\x02");
    }

    #[test]
    fn upload_empty_file_is_representable() {
        // Unlike FileResponse, an upload of zero bytes is a real zero-length
        // file because the name disambiguates it.
        let encoded = encode_upload("empty.txt", b"").unwrap();
        let (name, bytes) = decode_upload(&encoded).unwrap();
        assert_eq!(name, "empty.txt");
        assert!(bytes.is_empty());
    }

    #[test]
    fn upload_ack_roundtrip() {
        for status in [0u8, 1, 2, 255] {
            assert_eq!(decode_upload_ack(&encode_upload_ack(status)).unwrap(), status);
        }
    }

    #[test]
    fn upload_ack_rejects_extra_bytes() {
        assert!(matches!(
            decode_upload_ack(&[0, 0]),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn upload_ack_rejects_empty() {
        assert!(matches!(
            decode_upload_ack(&[]),
            Err(ProtocolError::Truncated(_))
        ));
    }
}
