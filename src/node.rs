//! `ReplicationNode`: one member of a replicated cluster, combining a
//! local [`Database`] with an `openraft` instance driven by it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openraft::BasicNode;

use crate::command::Command;
use crate::config::Config;
use crate::engine::{CommandResponse, Database, Item};
use crate::error::{Error, Result};
use crate::path::BucketPath;
use crate::raft::{node_id_for_addr, typ, LogStore, Network, NodeId, Raft};
use crate::traits::{Consensus, Membership};

fn raft_config() -> Result<openraft::Config> {
    let raft_config = openraft::Config {
        heartbeat_interval: 250,
        election_timeout_min: 500,
        election_timeout_max: 1000,
        ..Default::default()
    };
    raft_config
        .validate()
        .map_err(|e| Error::ReplicationError(format!("invalid raft config: {e}")))?;
    Ok(raft_config)
}

fn map_raft_error<E: std::fmt::Display>(e: openraft::error::RaftError<NodeId, E>) -> Error
where
    openraft::error::RaftError<NodeId, E>: HasForwardToLeader,
{
    if e.has_forward_to_leader() {
        Error::NotLeader
    } else {
        Error::ReplicationError(e.to_string())
    }
}

/// Small local shim over the handful of `openraft` error enums that carry
/// a "try this leader instead" hint, so [`map_raft_error`] doesn't need
/// one overload per concrete error type.
trait HasForwardToLeader {
    fn has_forward_to_leader(&self) -> bool;
}

impl<E> HasForwardToLeader for openraft::error::RaftError<NodeId, E> {
    fn has_forward_to_leader(&self) -> bool {
        matches!(self, openraft::error::RaftError::APIError(_)) || format!("{self:?}").contains("ForwardToLeader")
    }
}

/// One node in a replicated cluster.
pub struct ReplicationNode {
    raft: Raft,
    #[allow(dead_code)]
    log_store: Arc<LogStore>,
    database: Arc<Database>,
    config: Config,
    node_id: NodeId,
}

impl ReplicationNode {
    /// Opens the local engine, wires up Raft storage and transport, and
    /// either bootstraps a new single-node cluster or starts up ready to
    /// be added to an existing one by its leader.
    pub async fn start(config: Config) -> Result<Self> {
        let database = Arc::new(Database::open(config.engine_path.clone())?);
        let log_store = Arc::new(LogStore::new(database.clone(), config.raft_dir.clone()));
        let node_id = node_id_for_addr(&config.listen_addr);

        let raft = Raft::new(
            node_id,
            Arc::new(raft_config()?),
            Network::default(),
            log_store.clone(),
            log_store.clone(),
        )
        .await
        .map_err(|e| Error::ReplicationError(e.to_string()))?;

        let listen_addr = config.listen_addr.clone();
        let raft_for_server = raft.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::raft::network::serve(listen_addr, raft_for_server).await {
                tracing::error!(error = %e, "raft transport server exited");
            }
        });

        let node = ReplicationNode {
            raft,
            log_store,
            database,
            config,
            node_id,
        };

        if node.config.is_bootstrap() {
            node.bootstrap().await?;
        } else {
            tracing::info!(
                addr = %node.config.listen_addr,
                "node started as a join candidate; waiting for the cluster leader to add it"
            );
        }

        Ok(node)
    }

    async fn bootstrap(&self) -> Result<()> {
        let mut members = std::collections::BTreeMap::new();
        members.insert(self.node_id, BasicNode { addr: self.config.listen_addr.clone() });
        self.raft
            .initialize(members)
            .await
            .map_err(|e| Error::ReplicationError(e.to_string()))
    }

    /// A handle onto the root bucket, routed through this node's
    /// consensus instance.
    pub fn root(&self) -> ReplicationBucket<'_> {
        ReplicationBucket { node: self, path: BucketPath::root() }
    }

    /// A handle onto the bucket at `path`.
    pub fn bucket(&self, path: BucketPath) -> ReplicationBucket<'_> {
        ReplicationBucket { node: self, path }
    }

    /// True if this node currently believes itself to be the Raft leader.
    pub fn is_leader(&self) -> bool {
        self.raft.metrics().borrow().current_leader == Some(self.node_id)
    }

    /// Blocks until a leader is known anywhere in the cluster, or until
    /// `leader_wait_timeout` elapses.
    pub async fn wait_for_leader(&self) -> Result<NodeId> {
        let deadline = self.config.leader_wait_timeout;
        tokio::time::timeout(deadline, async {
            loop {
                if let Some(leader) = self.raft.metrics().borrow().current_leader {
                    return leader;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .map_err(|_| Error::Timeout(deadline))
    }

    async fn apply_strong(&self, cmd: Command) -> Result<CommandResponse> {
        let fut = self.raft.client_write(cmd);
        let resp = tokio::time::timeout(self.config.apply_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(self.config.apply_timeout))?
            .map_err(map_raft_error::<typ::ClientWriteError>)?;
        match resp.data {
            CommandResponse::Err(e) => Err(e.into_error()),
            other => Ok(other),
        }
    }

    fn apply_weak(&self, cmd: &Command) -> Result<CommandResponse> {
        self.database.apply(cmd)
    }

    fn current_voters(&self) -> BTreeSet<NodeId> {
        self.raft
            .metrics()
            .borrow()
            .membership_config
            .membership()
            .voter_ids()
            .collect()
    }
}

#[async_trait]
impl Membership for ReplicationNode {
    async fn join(&self, addr: &str) -> Result<()> {
        let id = node_id_for_addr(addr);
        let node = BasicNode { addr: addr.to_string() };
        self.raft
            .add_learner(id, node, true)
            .await
            .map_err(map_raft_error::<typ::RaftError>)?;

        let mut voters = self.current_voters();
        voters.insert(id);
        self.raft
            .change_membership(voters, false)
            .await
            .map_err(map_raft_error::<openraft::error::ClientWriteError<NodeId, BasicNode>>)?;
        Ok(())
    }

    async fn leave(&self, addr: &str) -> Result<()> {
        let id = node_id_for_addr(addr);
        let mut voters = self.current_voters();
        voters.remove(&id);
        self.raft
            .change_membership(voters, false)
            .await
            .map_err(map_raft_error::<openraft::error::ClientWriteError<NodeId, BasicNode>>)?;
        Ok(())
    }
}

/// A bucket handle scoped to one path, routed through a
/// [`ReplicationNode`]'s consensus instance.
pub struct ReplicationBucket<'n> {
    node: &'n ReplicationNode,
    path: BucketPath,
}

impl<'n> ReplicationBucket<'n> {
    pub fn path(&self) -> &BucketPath {
        &self.path
    }

    pub fn bucket(&self, name: &[u8]) -> Result<ReplicationBucket<'n>> {
        Ok(ReplicationBucket { node: self.node, path: self.path.join(name)? })
    }
}

#[async_trait]
impl Consensus for ReplicationBucket<'_> {
    async fn strong_get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.node.apply_strong(Command::get(self.path.clone(), key)).await? {
            CommandResponse::Value(v) => Ok(v),
            other => Err(Error::Corruption(format!("expected a value response, got {other:?}"))),
        }
    }

    async fn weak_get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.node.apply_weak(&Command::get(self.path.clone(), key))? {
            CommandResponse::Value(v) => Ok(v),
            other => Err(Error::Corruption(format!("expected a value response, got {other:?}"))),
        }
    }

    async fn weak_seek(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.node.apply_weak(&Command::seek(self.path.clone(), key))? {
            CommandResponse::Value(v) => Ok(v),
            other => Err(Error::Corruption(format!("expected a value response, got {other:?}"))),
        }
    }

    async fn weak_list(&self) -> Result<Vec<Item>> {
        match self.node.apply_weak(&Command::list(self.path.clone()))? {
            CommandResponse::Listing(items) => Ok(items),
            other => Err(Error::Corruption(format!("expected a listing response, got {other:?}"))),
        }
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.node.apply_strong(Command::set(self.path.clone(), key, value)).await?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.node.apply_strong(Command::delete(self.path.clone(), key)).await?;
        Ok(())
    }

    async fn create_bucket(&self, name: &[u8]) -> Result<()> {
        self.node.apply_strong(Command::create_bucket(self.path.clone(), name)).await?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &[u8]) -> Result<()> {
        self.node.apply_strong(Command::delete_bucket(self.path.clone(), name)).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Item>> {
        match self.node.apply_strong(Command::list(self.path.clone())).await? {
            CommandResponse::Listing(items) => Ok(items),
            other => Err(Error::Corruption(format!("expected a listing response, got {other:?}"))),
        }
    }

    async fn seek(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.node.apply_strong(Command::seek(self.path.clone(), key)).await? {
            CommandResponse::Value(v) => Ok(v),
            other => Err(Error::Corruption(format!("expected a value response, got {other:?}"))),
        }
    }
}
