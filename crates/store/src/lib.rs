//! Block storage and DAG traversal for dagsync.
//!
//! Blocks are opaque byte strings addressed by their [`ContentId`]. Linked
//! blocks use the [`Node`] format, whose links are walked by [`Traversal`]
//! according to a [`Selector`].
//!
//! [`ContentId`]: dagsync_primitives::ContentId

pub mod error;
pub mod memory;
pub mod node;
pub mod selector;
pub mod traversal;

use bytes::Bytes;
use dagsync_primitives::ContentId;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use node::Node;
pub use selector::Selector;
pub use traversal::{BlockLoader, Traversal, Visit};

/// Content-addressed block storage.
///
/// Implementations must be safe to share between tasks; the sync layer reads
/// and writes concurrently from every in-flight traversal.
pub trait BlockStore: Send + Sync {
    fn get(&self, cid: &ContentId) -> Result<Option<Bytes>, StoreError>;

    fn put(&self, cid: ContentId, data: Bytes) -> Result<(), StoreError>;

    fn has(&self, cid: &ContentId) -> Result<bool, StoreError>;
}
