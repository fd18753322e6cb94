//! A replicated, hierarchical key-value store.
//!
//! The store is organized as nested buckets addressed by slash-delimited
//! paths (see [`path::BucketPath`]), each holding its own key/value
//! pairs and child buckets. A single process's data lives in
//! [`engine::Database`], a transactional local engine with no awareness
//! of replication; [`node::ReplicationNode`] layers an `openraft`-backed
//! Raft log on top of it so that writes, and reads that need to observe
//! every prior write, are linearizable across a cluster. Callers that can
//! tolerate reading slightly stale state may bypass the log entirely for
//! lower-latency weak reads.
//!
//! Writes and strong reads issued against a non-leader return
//! [`error::Error::NotLeader`]; callers are expected to retry against the
//! current leader, which [`node::ReplicationNode::wait_for_leader`] can
//! help discover.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod node;
pub mod path;
pub mod raft;
pub mod traits;

pub use command::{Command, Op};
pub use config::Config;
pub use engine::{Bucket, Cursor, Database, Item};
pub use error::{Error, Result};
pub use node::{ReplicationBucket, ReplicationNode};
pub use path::BucketPath;
pub use traits::{Buckets, Consensus, Membership, Store, ValueDeleter, ValueGetter, ValueLister, ValueSetter};
