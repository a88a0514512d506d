//! Minimal CBOR reader/writer for the announce record.
//!
//! Only the major types the record uses are supported. Every length header is
//! checked against a caller-supplied maximum before anything is allocated.

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::cid::{self, ContentId};

pub(crate) const MAJOR_BYTES: u8 = 2;
pub(crate) const MAJOR_TEXT: u8 = 3;
pub(crate) const MAJOR_ARRAY: u8 = 4;
pub(crate) const MAJOR_TAG: u8 = 6;

/// CBOR tag for content identifiers.
pub const CID_TAG: u64 = 42;

/// Identity multibase prefix carried in front of a tagged identifier.
const MULTIBASE_IDENTITY: u8 = 0x00;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("expected major type {expected}, found {found}")]
    UnexpectedType { expected: u8, found: u8 },

    #[error("unsupported additional info {0}")]
    UnsupportedHeader(u8),

    #[error("record must have 3 or 4 fields, found {0}")]
    FieldCount(u64),

    #[error("{what} too long: {len} > {max}")]
    TooLong {
        what: &'static str,
        len: u64,
        max: u64,
    },

    #[error("expected tag {expected}, found {found}")]
    UnexpectedTag { expected: u64, found: u64 },

    #[error("invalid content id")]
    InvalidCid(#[from] cid::Error),

    #[error("missing multibase prefix on content id")]
    MissingMultibasePrefix,

    #[error("text field is not valid utf-8")]
    InvalidUtf8,

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

pub(crate) fn write_header(buf: &mut impl BufMut, major: u8, value: u64) {
    let major = major << 5;

    match value {
        0..=23 => {
            let small = u8::try_from(value).unwrap_or_default();
            buf.put_u8(major | small);
        }
        24..=0xff => {
            buf.put_u8(major | 24);
            buf.put_u8(u8::try_from(value).unwrap_or_default());
        }
        0x100..=0xffff => {
            buf.put_u8(major | 25);
            buf.put_u16(u16::try_from(value).unwrap_or_default());
        }
        0x1_0000..=0xffff_ffff => {
            buf.put_u8(major | 26);
            buf.put_u32(u32::try_from(value).unwrap_or_default());
        }
        _ => {
            buf.put_u8(major | 27);
            buf.put_u64(value);
        }
    }
}

pub(crate) fn write_bytes(buf: &mut impl BufMut, data: &[u8]) {
    write_header(buf, MAJOR_BYTES, data.len() as u64);
    buf.put_slice(data);
}

pub(crate) fn write_text(buf: &mut impl BufMut, text: &str) {
    write_header(buf, MAJOR_TEXT, text.len() as u64);
    buf.put_slice(text.as_bytes());
}

pub(crate) fn write_cid(buf: &mut impl BufMut, cid: &ContentId) {
    let bytes = cid.to_bytes();

    write_header(buf, MAJOR_TAG, CID_TAG);
    write_header(buf, MAJOR_BYTES, (bytes.len() as u64) + 1);
    buf.put_u8(MULTIBASE_IDENTITY);
    buf.put_slice(&bytes);
}

/// Reads a header and returns `(major, value)`.
pub(crate) fn read_header(buf: &mut impl Buf) -> Result<(u8, u64), CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::UnexpectedEof);
    }

    let initial = buf.get_u8();
    let major = initial >> 5;
    let info = initial & 0x1f;

    let value = match info {
        0..=23 => u64::from(info),
        24 => u64::from(need(buf, 1)?.get_u8()),
        25 => u64::from(need(buf, 2)?.get_u16()),
        26 => u64::from(need(buf, 4)?.get_u32()),
        27 => need(buf, 8)?.get_u64(),
        other => return Err(CodecError::UnsupportedHeader(other)),
    };

    Ok((major, value))
}

pub(crate) fn expect_header(
    buf: &mut impl Buf,
    expected: u8,
    what: &'static str,
    max: u64,
) -> Result<u64, CodecError> {
    let (major, value) = read_header(buf)?;

    if major != expected {
        return Err(CodecError::UnexpectedType {
            expected,
            found: major,
        });
    }

    if value > max {
        return Err(CodecError::TooLong {
            what,
            len: value,
            max,
        });
    }

    Ok(value)
}

pub(crate) fn read_bytes(
    buf: &mut impl Buf,
    what: &'static str,
    max: u64,
) -> Result<Vec<u8>, CodecError> {
    let len = expect_header(buf, MAJOR_BYTES, what, max)?;
    let len = usize::try_from(len).map_err(|_| CodecError::UnexpectedEof)?;

    let buf = need(buf, len)?;
    let mut out = vec![0; len];
    buf.copy_to_slice(&mut out);

    Ok(out)
}

pub(crate) fn read_text(
    buf: &mut impl Buf,
    what: &'static str,
    max: u64,
) -> Result<String, CodecError> {
    let len = expect_header(buf, MAJOR_TEXT, what, max)?;
    let len = usize::try_from(len).map_err(|_| CodecError::UnexpectedEof)?;

    let buf = need(buf, len)?;
    let mut out = vec![0; len];
    buf.copy_to_slice(&mut out);

    String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8)
}

pub(crate) fn read_cid(buf: &mut impl Buf) -> Result<ContentId, CodecError> {
    let (major, tag) = read_header(buf)?;

    if major != MAJOR_TAG {
        return Err(CodecError::UnexpectedType {
            expected: MAJOR_TAG,
            found: major,
        });
    }

    if tag != CID_TAG {
        return Err(CodecError::UnexpectedTag {
            expected: CID_TAG,
            found: tag,
        });
    }

    let bytes = read_bytes(buf, "content id", (cid::CID_LEN as u64) + 1)?;

    let Some((&MULTIBASE_IDENTITY, rest)) = bytes.split_first() else {
        return Err(CodecError::MissingMultibasePrefix);
    };

    Ok(ContentId::from_bytes(rest)?)
}

fn need<B: Buf>(buf: &mut B, len: usize) -> Result<&mut B, CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEof);
    }

    Ok(buf)
}
