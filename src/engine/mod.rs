//! The local engine: a transactional nested-bucket store, with no
//! awareness of replication. [`crate::node::ReplicationNode`] is the only
//! caller that's supposed to reach into this module from outside the
//! crate boundary on a strong-write path; weak reads and local tooling
//! may use [`Database`] and [`Bucket`] directly.

pub mod bucket;
pub mod cursor;
pub mod database;
pub mod tree;

pub use bucket::Bucket;
pub use cursor::Cursor;
pub use database::{CommandResponse, Database};
pub use tree::{BucketNode, Item};
