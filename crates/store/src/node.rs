use borsh::{BorshDeserialize, BorshSerialize};
use dagsync_primitives::ContentId;

use crate::error::StoreError;

/// A linked block: an opaque payload plus references to child blocks.
///
/// Leaves are nodes without links. The block bytes are the borsh encoding of
/// the node, so the identifier of a node is the hash of that encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Node {
    pub data: Vec<u8>,
    pub links: Vec<ContentId>,
}

impl Node {
    #[must_use]
    pub const fn new(data: Vec<u8>, links: Vec<ContentId>) -> Self {
        Self { data, links }
    }

    #[must_use]
    pub const fn leaf(data: Vec<u8>) -> Self {
        Self::new(data, Vec::new())
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        borsh::to_vec(self).map_err(StoreError::Encode)
    }

    pub fn decode(cid: ContentId, bytes: &[u8]) -> Result<Self, StoreError> {
        borsh::from_slice(bytes).map_err(|source| StoreError::InvalidNode { cid, source })
    }
}
