//! Payload header: magic bytes followed by a big-endian data model version.

use crate::defaults::{HEADER_MAGIC_LEN, HEADER_VERSION_LEN};
use crate::error::{Error, Result};

/// Total header length in bytes.
pub const HEADER_LEN: usize = HEADER_MAGIC_LEN + HEADER_VERSION_LEN;

/// Prefix `body` with `magic` and `version`.
pub fn write_header(magic: &[u8; HEADER_MAGIC_LEN], version: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(magic);
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Split a payload into its stamped version and body.
///
/// Fails with `Serialization` if the payload is shorter than a header or its
/// magic does not match.
pub fn read_header<'a>(magic: &[u8; HEADER_MAGIC_LEN], bytes: &'a [u8]) -> Result<(u32, &'a [u8])> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Serialization(format!(
            "payload of {} bytes is shorter than the {}-byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let (found_magic, rest) = bytes.split_at(HEADER_MAGIC_LEN);
    if found_magic != magic {
        return Err(Error::Serialization(format!(
            "invalid header: expected {:?}, found {:?}",
            String::from_utf8_lossy(magic),
            String::from_utf8_lossy(found_magic)
        )));
    }

    let (version_bytes, body) = rest.split_at(HEADER_VERSION_LEN);
    let mut buf = [0u8; HEADER_VERSION_LEN];
    buf.copy_from_slice(version_bytes);
    Ok((u32::from_be_bytes(buf), body))
}
