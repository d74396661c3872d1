//! Utility functions for DNS wire data.
//!
//! This module provides helpers for reading big-endian fields and for
//! decoding and encoding domain names.

use crate::errors::DnsError;

/// A single domain name label, kept as raw bytes so it re-encodes exactly.
pub type Label = Vec<u8>;

/// Upper bound on compression pointers followed while decoding one name.
pub const MAX_POINTER_HOPS: usize = 32;

/// Length bytes with both top bits set introduce a compression pointer.
const POINTER_MASK: u8 = 0xC0;

/// Read a big-endian `u16` at `pos`.
pub fn read_u16(buf: &[u8], pos: usize) -> Result<u16, DnsError> {
    match buf.get(pos..pos + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(DnsError::malformed(format!(
            "16-bit field at offset {} runs past end of message ({} bytes)",
            pos,
            buf.len()
        ))),
    }
}

/// Read a big-endian `u32` at `pos`.
pub fn read_u32(buf: &[u8], pos: usize) -> Result<u32, DnsError> {
    match buf.get(pos..pos + 4) {
        Some(b) => Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(DnsError::malformed(format!(
            "32-bit field at offset {} runs past end of message ({} bytes)",
            pos,
            buf.len()
        ))),
    }
}

/// Decode a domain name starting at `offset`.
///
/// Compression pointers are resolved against the whole message in `buf`.
/// A pointer always ends the name in which it appears, so the returned
/// offset sits two bytes past the first pointer, or one byte past the
/// terminating zero when the name has no pointer.
///
/// # Arguments
/// * `buf` - The complete DNS message.
/// * `offset` - Position of the first length byte.
///
/// # Returns
/// The labels in order and the offset of the byte following the name.
pub fn decode_name(buf: &[u8], offset: usize) -> Result<(Vec<Label>, usize), DnsError> {
    let mut labels = Vec::new();
    let mut pos = offset;
    let mut resume_at = None;
    let mut hops = 0;

    loop {
        let len = *buf.get(pos).ok_or_else(|| {
            DnsError::malformed(format!("name at offset {} has no terminator", offset))
        })?;

        if len == 0 {
            pos += 1;
            break;
        }

        if len & POINTER_MASK == POINTER_MASK {
            let target = read_u16(buf, pos)? & 0x3FFF;
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(DnsError::malformed(format!(
                    "name at offset {} follows more than {} compression pointers",
                    offset, MAX_POINTER_HOPS
                )));
            }
            if resume_at.is_none() {
                resume_at = Some(pos + 2);
            }
            pos = target as usize;
            continue;
        }

        let start = pos + 1;
        let end = start + len as usize;
        let label = buf.get(start..end).ok_or_else(|| {
            DnsError::malformed(format!(
                "label at offset {} claims {} bytes past end of message",
                pos, len
            ))
        })?;
        labels.push(label.to_vec());
        pos = end;
    }

    Ok((labels, resume_at.unwrap_or(pos)))
}

/// Encode labels as an uncompressed, zero-terminated name.
///
/// Fails with `EncodingOverflow` if a label is too long for its length byte.
pub fn encode_name(labels: &[Label], out: &mut Vec<u8>) -> Result<(), DnsError> {
    for label in labels {
        let len = u8::try_from(label.len())
            .ok()
            .filter(|len| len & POINTER_MASK != POINTER_MASK)
            .ok_or_else(|| {
                DnsError::EncodingOverflow(format!(
                    "label of {} bytes cannot be length-prefixed",
                    label.len()
                ))
            })?;
        out.push(len);
        out.extend_from_slice(label);
    }
    out.push(0);
    Ok(())
}

/// Join labels with '.' for display and upstream lookups.
pub fn labels_to_name(labels: &[Label]) -> String {
    labels
        .iter()
        .map(|l| String::from_utf8_lossy(l))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(parts: &[&str]) -> Vec<Label> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn decodes_plain_name() {
        let buf = b"\x07example\x03com\x00\xff";
        let (decoded, next) = decode_name(buf, 0).unwrap();
        assert_eq!(decoded, labels(&["example", "com"]));
        assert_eq!(next, 13);
    }

    #[test]
    fn pointer_consumes_two_bytes() {
        // "example.com" at 0, then "www" + pointer to 0 at 13.
        let mut buf = b"\x07example\x03com\x00".to_vec();
        buf.extend_from_slice(b"\x03www\xc0\x00\xaa");
        let (decoded, next) = decode_name(&buf, 13).unwrap();
        assert_eq!(decoded, labels(&["www", "example", "com"]));
        assert_eq!(next, 13 + 4 + 2);
    }

    #[test]
    fn bare_pointer_matches_uncompressed_form() {
        let mut buf = b"\x07example\x03com\x00".to_vec();
        buf.extend_from_slice(&[0xc0, 0x00]);
        let (plain, _) = decode_name(&buf, 0).unwrap();
        let (compressed, next) = decode_name(&buf, 13).unwrap();
        assert_eq!(plain, compressed);
        assert_eq!(next, 15);
    }

    #[test]
    fn root_name_is_empty() {
        let (decoded, next) = decode_name(&[0], 0).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn rejects_self_referencing_pointer() {
        let buf = [0xc0, 0x00];
        assert!(matches!(
            decode_name(&buf, 0),
            Err(DnsError::MalformedMessage(_))
        ));
    }

    #[test]
    fn rejects_pointer_cycle() {
        // 0 -> "a" then pointer to 4; 4 -> "b" then pointer to 0.
        let buf = [1, b'a', 0xc0, 0x04, 1, b'b', 0xc0, 0x00];
        assert!(matches!(
            decode_name(&buf, 0),
            Err(DnsError::MalformedMessage(_))
        ));
    }

    #[test]
    fn rejects_truncated_label() {
        let buf = b"\x07exam";
        assert!(decode_name(buf, 0).is_err());
    }

    #[test]
    fn rejects_missing_terminator() {
        let buf = b"\x03com";
        assert!(decode_name(buf, 0).is_err());
    }

    #[test]
    fn rejects_half_pointer() {
        let buf = [0xc0];
        assert!(decode_name(&buf, 0).is_err());
    }

    #[test]
    fn encodes_uncompressed_name() {
        let mut out = Vec::new();
        encode_name(&labels(&["example", "com"]), &mut out).unwrap();
        assert_eq!(out, b"\x07example\x03com\x00");
    }

    #[test]
    fn encode_rejects_oversized_label() {
        let mut out = Vec::new();
        let err = encode_name(&[vec![b'a'; 200]], &mut out).unwrap_err();
        assert!(matches!(err, DnsError::EncodingOverflow(_)));
    }

    #[test]
    fn reads_big_endian_fields() {
        let buf = [0x12, 0x34, 0x00, 0x00, 0x0e, 0x10];
        assert_eq!(read_u16(&buf, 0).unwrap(), 0x1234);
        assert_eq!(read_u32(&buf, 2).unwrap(), 3600);
        assert!(read_u16(&buf, 5).is_err());
    }

    #[test]
    fn joins_labels() {
        assert_eq!(labels_to_name(&labels(&["example", "com"])), "example.com");
        assert_eq!(labels_to_name(&[]), "");
    }
}
