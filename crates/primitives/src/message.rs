#[cfg(test)]
#[path = "tests/message.rs"]
mod tests;

use bytes::Buf;

use crate::cid::ContentId;
use crate::codec::{self, CodecError, MAJOR_ARRAY};

/// Maximum number of addresses in an announce.
pub const MAX_ARRAY_LEN: u64 = 8192;

/// Maximum length of each address and of the extra data.
pub const MAX_BYTE_STRING_LEN: u64 = 2 * 1024 * 1024;

/// Maximum length of the origin peer string.
pub const MAX_TEXT_STRING_LEN: u64 = 8192;

const FIELDS_DIRECT: u64 = 3;
const FIELDS_RELAYED: u64 = 4;

/// Message broadcast by a publisher whenever its head changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnounceMessage {
    /// The new head.
    pub head: ContentId,

    /// Binary multiaddresses the publisher can be reached on.
    pub addrs: Vec<Vec<u8>>,

    /// Opaque application data.
    pub extra_data: Vec<u8>,

    /// Set when the message is relayed on behalf of another peer.
    pub orig_peer: Option<String>,
}

impl AnnounceMessage {
    #[must_use]
    pub const fn new(head: ContentId) -> Self {
        Self {
            head,
            addrs: Vec::new(),
            extra_data: Vec::new(),
            orig_peer: None,
        }
    }

    #[must_use]
    pub fn with_addrs(mut self, addrs: Vec<Vec<u8>>) -> Self {
        self.addrs = addrs;
        self
    }

    #[must_use]
    pub fn with_extra_data(mut self, extra_data: Vec<u8>) -> Self {
        self.extra_data = extra_data;
        self
    }

    #[must_use]
    pub fn with_orig_peer(mut self, orig_peer: impl Into<String>) -> Self {
        let orig_peer = orig_peer.into();
        self.orig_peer = (!orig_peer.is_empty()).then_some(orig_peer);
        self
    }

    /// The relay origin, if any. Empty strings count as absent.
    #[must_use]
    pub fn orig_peer(&self) -> Option<&str> {
        self.orig_peer.as_deref().filter(|peer| !peer.is_empty())
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        check_len("addrs", self.addrs.len(), MAX_ARRAY_LEN)?;
        for addr in &self.addrs {
            check_len("addr", addr.len(), MAX_BYTE_STRING_LEN)?;
        }
        check_len("extra data", self.extra_data.len(), MAX_BYTE_STRING_LEN)?;

        let orig_peer = self.orig_peer();
        if let Some(orig_peer) = orig_peer {
            check_len("orig peer", orig_peer.len(), MAX_TEXT_STRING_LEN)?;
        }

        let mut buf = Vec::new();

        let fields = if orig_peer.is_some() {
            FIELDS_RELAYED
        } else {
            FIELDS_DIRECT
        };
        codec::write_header(&mut buf, MAJOR_ARRAY, fields);

        codec::write_cid(&mut buf, &self.head);

        codec::write_header(&mut buf, MAJOR_ARRAY, self.addrs.len() as u64);
        for addr in &self.addrs {
            codec::write_bytes(&mut buf, addr);
        }

        codec::write_bytes(&mut buf, &self.extra_data);

        if let Some(orig_peer) = orig_peer {
            codec::write_text(&mut buf, orig_peer);
        }

        Ok(buf)
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, CodecError> {
        let buf = &mut data;

        let (major, fields) = codec::read_header(buf)?;
        if major != MAJOR_ARRAY {
            return Err(CodecError::UnexpectedType {
                expected: MAJOR_ARRAY,
                found: major,
            });
        }

        let relayed = match fields {
            FIELDS_DIRECT => false,
            FIELDS_RELAYED => true,
            other => return Err(CodecError::FieldCount(other)),
        };

        let head = codec::read_cid(buf)?;

        let count = codec::expect_header(buf, MAJOR_ARRAY, "addrs", MAX_ARRAY_LEN)?;
        let mut addrs = Vec::new();
        for _ in 0..count {
            addrs.push(codec::read_bytes(buf, "addr", MAX_BYTE_STRING_LEN)?);
        }

        let extra_data = codec::read_bytes(buf, "extra data", MAX_BYTE_STRING_LEN)?;

        let orig_peer = if relayed {
            Some(codec::read_text(buf, "orig peer", MAX_TEXT_STRING_LEN)?)
                .filter(|peer| !peer.is_empty())
        } else {
            None
        };

        if buf.has_remaining() {
            return Err(CodecError::TrailingBytes(buf.remaining()));
        }

        Ok(Self {
            head,
            addrs,
            extra_data,
            orig_peer,
        })
    }
}

fn check_len(what: &'static str, len: usize, max: u64) -> Result<(), CodecError> {
    let len = len as u64;

    if len > max {
        return Err(CodecError::TooLong { what, len, max });
    }

    Ok(())
}
