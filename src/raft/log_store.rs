//! The `openraft` storage backend: log entries, vote state, and the
//! state machine (our [`Database`]) behind one `RwLock`-guarded struct.
//!
//! Grounded on the combined, pre-storage-v2 `RaftStorage<TypeConfig>`
//! surface (log append/read/purge, vote persistence, snapshot build and
//! install, and state machine application all on one trait), which is
//! the shape that matches the `openraft = "0.10"` version this crate
//! pins.

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::ops::RangeBounds;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use openraft::storage::{LogState, Snapshot};
use openraft::{
    Entry, EntryPayload, LogId, RaftLogReader, RaftSnapshotBuilder, RaftStorage, SnapshotMeta, StorageError,
    StorageIOError, StoredMembership, Vote,
};
use serde::{Deserialize, Serialize};

use crate::engine::Database;
use crate::raft::type_config::{NodeId, TypeConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSnapshot {
    meta: SnapshotMeta<NodeId, openraft::BasicNode>,
    data: Vec<u8>,
}

struct Inner {
    log: BTreeMap<u64, Entry<TypeConfig>>,
    vote: Option<Vote<NodeId>>,
    last_purged_log_id: Option<LogId<NodeId>>,
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, openraft::BasicNode>,
    snapshot_idx: u64,
    current_snapshot: Option<StoredSnapshot>,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            log: BTreeMap::new(),
            vote: None,
            last_purged_log_id: None,
            last_applied: None,
            last_membership: StoredMembership::default(),
            snapshot_idx: 0,
            current_snapshot: None,
        }
    }
}

/// Owns the Raft log and drives application of committed entries into the
/// local engine.
pub struct LogStore {
    inner: RwLock<Inner>,
    state_machine: Arc<Database>,
    raft_dir: PathBuf,
}

fn io_err(e: impl std::error::Error + 'static) -> StorageIOError<NodeId> {
    StorageIOError::read(&e)
}

impl LogStore {
    pub fn new(state_machine: Arc<Database>, raft_dir: PathBuf) -> Self {
        LogStore {
            inner: RwLock::new(Inner::default()),
            state_machine,
            raft_dir,
        }
    }

    fn vote_path(&self) -> PathBuf {
        self.raft_dir.join("vote.bin")
    }

    fn persist_vote(&self, vote: &Vote<NodeId>) -> Result<(), StorageIOError<NodeId>> {
        fs::create_dir_all(&self.raft_dir).map_err(io_err)?;
        let bytes = bincode::serialize(vote).map_err(io_err)?;
        fs::write(self.vote_path(), bytes).map_err(io_err)?;
        Ok(())
    }

    fn load_vote(&self) -> Option<Vote<NodeId>> {
        let bytes = fs::read(self.vote_path()).ok()?;
        bincode::deserialize(&bytes).ok()
    }

    pub fn state_machine(&self) -> &Arc<Database> {
        &self.state_machine
    }
}

#[async_trait::async_trait]
impl RaftLogReader<TypeConfig> for Arc<LogStore> {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Send + Sync>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>> {
        let inner = self.inner.read().expect("raft log lock poisoned");
        Ok(inner.log.range(range).map(|(_, v)| v.clone()).collect())
    }
}

#[async_trait::async_trait]
impl RaftSnapshotBuilder<TypeConfig> for Arc<LogStore> {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let (data, last_applied, last_membership, snapshot_idx) = {
            let mut inner = self.inner.write().expect("raft log lock poisoned");
            let root = self.state_machine.snapshot();
            let data = Database::encode_snapshot(&root).map_err(|e| StorageIOError::read(&e))?;
            inner.snapshot_idx += 1;
            (data, inner.last_applied.clone(), inner.last_membership.clone(), inner.snapshot_idx)
        };

        let snapshot_id = match last_applied {
            Some(last) => format!("{}-{}-{}", last.leader_id, last.index, snapshot_idx),
            None => format!("--{snapshot_idx}"),
        };

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership,
            snapshot_id,
        };

        let stored = StoredSnapshot { meta: meta.clone(), data: data.clone() };
        self.inner.write().expect("raft log lock poisoned").current_snapshot = Some(stored);

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

#[async_trait::async_trait]
impl RaftStorage<TypeConfig> for Arc<LogStore> {
    type LogReader = Self;
    type SnapshotBuilder = Self;

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        self.persist_vote(vote).map_err(StorageError::from)?;
        self.inner.write().expect("raft log lock poisoned").vote = Some(vote.clone());
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        let cached = self.inner.read().expect("raft log lock poisoned").vote.clone();
        Ok(cached.or_else(|| self.load_vote()))
    }

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let inner = self.inner.read().expect("raft log lock poisoned");
        let last = inner.log.values().last().map(|e| e.log_id.clone());
        Ok(LogState {
            last_purged_log_id: inner.last_purged_log_id.clone(),
            last_log_id: last.or_else(|| inner.last_purged_log_id.clone()),
        })
    }

    async fn delete_conflict_logs_since(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        let mut inner = self.inner.write().expect("raft log lock poisoned");
        inner.log.split_off(&log_id.index);
        Ok(())
    }

    async fn purge_logs_upto(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        let mut inner = self.inner.write().expect("raft log lock poisoned");
        inner.last_purged_log_id = Some(log_id);
        inner.log = inner.log.split_off(&(log_id.index + 1));
        Ok(())
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
    {
        let mut inner = self.inner.write().expect("raft log lock poisoned");
        for entry in entries {
            inner.log.insert(entry.log_id.index, entry);
        }
        Ok(())
    }

    async fn last_applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, openraft::BasicNode>), StorageError<NodeId>> {
        let inner = self.inner.read().expect("raft log lock poisoned");
        Ok((inner.last_applied.clone(), inner.last_membership.clone()))
    }

    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry<TypeConfig>],
    ) -> Result<Vec<<TypeConfig as openraft::RaftTypeConfig>::R>, StorageError<NodeId>> {
        let mut responses = Vec::with_capacity(entries.len());
        for entry in entries {
            let response = match &entry.payload {
                EntryPayload::Blank => crate::engine::CommandResponse::Ok,
                EntryPayload::Normal(cmd) => self.state_machine.apply(cmd).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "command application failed, returning the error to the caller");
                    crate::engine::CommandResponse::Err(crate::error::CommandError::from(&e))
                }),
                EntryPayload::Membership(membership) => {
                    let mut inner = self.inner.write().expect("raft log lock poisoned");
                    inner.last_membership = StoredMembership::new(Some(entry.log_id.clone()), membership.clone());
                    crate::engine::CommandResponse::Ok
                }
            };
            self.inner.write().expect("raft log lock poisoned").last_applied = Some(entry.log_id.clone());
            responses.push(response);
        }
        Ok(responses)
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<<TypeConfig as openraft::RaftTypeConfig>::SnapshotData>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, openraft::BasicNode>,
        snapshot: Box<<TypeConfig as openraft::RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), StorageError<NodeId>> {
        let data = snapshot.into_inner();
        let root = Database::decode_snapshot(&data).map_err(|e| StorageIOError::read(&e))?;
        self.state_machine.restore(root).map_err(|e| StorageIOError::write(&e))?;

        let mut inner = self.inner.write().expect("raft log lock poisoned");
        inner.last_applied = meta.last_log_id.clone();
        inner.last_membership = meta.last_membership.clone();
        inner.current_snapshot = Some(StoredSnapshot { meta: meta.clone(), data });
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        let inner = self.inner.read().expect("raft log lock poisoned");
        Ok(inner.current_snapshot.as_ref().map(|s| Snapshot {
            meta: s.meta.clone(),
            snapshot: Box::new(Cursor::new(s.data.clone())),
        }))
    }
}
