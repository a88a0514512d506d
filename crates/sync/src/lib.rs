//! Head announcement and incremental DAG sync between peers.
//!
//! A [`Publisher`] owns the head of a content-addressed DAG, announces every
//! new head over gossip and serves the blocks below it. A [`Subscriber`]
//! listens for announces, fetches whatever part of the DAG it is missing from
//! each publisher, and notifies watchers once a head has been synced.

mod cancel;
pub mod config;
pub mod error;
pub mod events;
mod handler;
pub mod protocol;
pub mod publisher;
pub mod rate_limiter;
mod registry;
pub mod request;
pub mod subscriber;

pub use config::{DagsyncConfig, PublisherConfig, RateLimitConfig, SubscriberConfig};
pub use error::{PublisherError, SyncError};
pub use events::{SyncFinished, WatchCancel};
pub use protocol::head::query_head;
pub use publisher::Publisher;
pub use rate_limiter::{RateLimiter, RateLimiterFactory};
pub use request::{AllowPeer, BlockHook, SyncRequest};
pub use subscriber::Subscriber;
