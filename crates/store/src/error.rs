use std::io;

use dagsync_primitives::ContentId;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("block {0} not found")]
    NotFound(ContentId),

    #[error("block {cid} is not a valid node")]
    InvalidNode {
        cid: ContentId,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode node")]
    Encode(#[source] io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}
