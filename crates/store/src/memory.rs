use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dagsync_primitives::ContentId;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::node::Node;
use crate::traversal::BlockLoader;
use crate::BlockStore;

/// In-memory block store. Clones share the same blocks.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    blocks: Arc<DashMap<ContentId, Bytes>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under their own identifier.
    pub fn insert(&self, data: impl Into<Bytes>) -> ContentId {
        let data = data.into();
        let cid = ContentId::for_block(&data);

        drop(self.blocks.insert(cid, data));

        cid
    }

    /// Encodes and stores a node, returning its identifier.
    pub fn insert_node(&self, node: &Node) -> Result<ContentId, StoreError> {
        Ok(self.insert(node.encode()?))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for MemoryStore {
    fn get(&self, cid: &ContentId) -> Result<Option<Bytes>, StoreError> {
        Ok(self.blocks.get(cid).map(|entry| entry.value().clone()))
    }

    fn put(&self, cid: ContentId, data: Bytes) -> Result<(), StoreError> {
        drop(self.blocks.insert(cid, data));
        Ok(())
    }

    fn has(&self, cid: &ContentId) -> Result<bool, StoreError> {
        Ok(self.blocks.contains_key(cid))
    }
}

#[async_trait]
impl BlockLoader for MemoryStore {
    type Error = StoreError;

    async fn load(&self, cid: &ContentId) -> Result<Bytes, Self::Error> {
        self.get(cid)?.ok_or(StoreError::NotFound(*cid))
    }
}
