//! Shared types for dagsync: content identifiers, the announce record and
//! configuration helpers.

pub mod cid;
pub mod codec;
pub mod common;
pub mod message;

pub use cid::ContentId;
pub use codec::CodecError;
pub use message::AnnounceMessage;
