#[cfg(test)]
#[path = "tests/traversal.rs"]
mod tests;

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use dagsync_primitives::ContentId;
use tracing::trace;

use crate::error::StoreError;
use crate::node::Node;
use crate::selector::Selector;

/// Source of block bytes for a traversal.
///
/// The sync layer implements this over a local store plus a remote block
/// stream; [`MemoryStore`](crate::MemoryStore) implements it for purely local
/// walks.
#[async_trait]
pub trait BlockLoader: Send + Sync {
    type Error: From<StoreError> + Send;

    async fn load(&self, cid: &ContentId) -> Result<Bytes, Self::Error>;
}

/// A block reached by a traversal.
#[derive(Clone, Debug)]
pub struct Visit {
    pub cid: ContentId,
    pub data: Bytes,
    pub node: Node,
    pub depth: usize,
}

/// Lazy depth-first, pre-order walk over linked [`Node`] blocks.
///
/// Each identifier is visited at most once. Links are followed in the order
/// they appear in the node.
#[derive(Debug)]
pub struct Traversal {
    selector: Selector,
    pending: Vec<(ContentId, usize)>,
    seen: HashSet<ContentId>,
}

impl Traversal {
    #[must_use]
    pub fn new(root: ContentId, selector: Selector) -> Self {
        Self {
            selector,
            pending: vec![(root, 0)],
            seen: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Loads and returns the next block, or `None` once the walk is done.
    pub async fn next<L>(&mut self, loader: &L) -> Result<Option<Visit>, L::Error>
    where
        L: BlockLoader + ?Sized,
    {
        while let Some((cid, depth)) = self.pending.pop() {
            if self.selector.is_stop(&cid) {
                trace!(%cid, "Reached stop node");
                continue;
            }

            if !self.seen.insert(cid) {
                continue;
            }

            let data = loader.load(&cid).await?;
            let node = Node::decode(cid, &data)?;

            if self.selector.descends_below(depth) {
                let child_depth = depth.saturating_add(1);
                self.pending
                    .extend(node.links.iter().rev().map(|link| (*link, child_depth)));
            }

            return Ok(Some(Visit {
                cid,
                data,
                node,
                depth,
            }));
        }

        Ok(None)
    }
}
