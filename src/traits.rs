//! Capability traits shared between the local engine and the replicated
//! layer built on top of it.
//!
//! These mirror the narrow, single-purpose interfaces the Go original
//! composed its `Store` type from (`ValueGetter`, `ValueSetter`,
//! `ValueDeleter`, `ValueLister`, `Buckets`) rather than one fat
//! interface, so a caller that only needs to read never has to depend on
//! write or bucket-management capability.

use async_trait::async_trait;

use crate::engine::Item;
use crate::error::Result;

pub trait ValueGetter {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
}

pub trait ValueSetter {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
}

pub trait ValueDeleter {
    fn delete(&self, key: &[u8]) -> Result<()>;
}

pub trait ValueLister {
    fn list(&self) -> Result<Vec<Item>>;
    fn seek(&self, key: &[u8]) -> Result<Vec<u8>>;
}

/// Bucket management: creating, opening, and removing child buckets.
/// `Child` is whatever handle type the implementor hands back for a
/// descended-into bucket.
pub trait Buckets {
    type Child;

    fn bucket(&self, name: &[u8]) -> Result<Self::Child>;
    fn create_bucket(&self, name: &[u8]) -> Result<Self::Child>;
    fn delete_bucket(&self, name: &[u8]) -> Result<()>;
}

/// The full local-engine surface: everything a caller that already holds
/// a bucket handle within one process can do to it.
pub trait Store: ValueGetter + ValueSetter + ValueDeleter + ValueLister {}

impl<T> Store for T where T: ValueGetter + ValueSetter + ValueDeleter + ValueLister {}

/// The replicated surface: the same operations as [`Store`], but routed
/// through consensus. Every method here may cross the network and so is
/// async and fallible in ways a local [`Store`] call is not — most
/// importantly with [`crate::error::Error::NotLeader`] when called
/// against a follower.
#[async_trait]
pub trait Consensus {
    async fn strong_get(&self, key: &[u8]) -> Result<Vec<u8>>;
    async fn weak_get(&self, key: &[u8]) -> Result<Vec<u8>>;
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
    async fn delete(&self, key: &[u8]) -> Result<()>;
    async fn create_bucket(&self, name: &[u8]) -> Result<()>;
    async fn delete_bucket(&self, name: &[u8]) -> Result<()>;
    async fn list(&self) -> Result<Vec<Item>>;
    async fn seek(&self, key: &[u8]) -> Result<Vec<u8>>;
    async fn weak_seek(&self, key: &[u8]) -> Result<Vec<u8>>;
    async fn weak_list(&self) -> Result<Vec<Item>>;
}

/// Cluster membership management. Unlike [`Consensus`], which is scoped
/// to a single bucket, membership is a whole-cluster concern, so it lives
/// on [`crate::node::ReplicationNode`] directly rather than on a bucket
/// handle.
#[async_trait]
pub trait Membership {
    /// Adds `addr` to the cluster as a voting member. Only the leader can
    /// service this.
    async fn join(&self, addr: &str) -> Result<()>;

    /// Removes `addr` from the cluster's voting membership. Only the
    /// leader can service this.
    async fn leave(&self, addr: &str) -> Result<()>;
}
