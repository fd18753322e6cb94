//! The local engine: a `Database` owning one persistent nested-bucket
//! tree, with whole-state durability to a single file.
//!
//! Commands are applied here from two different callers that must never
//! disagree: the Raft FSM, once a command has committed through the log,
//! and the weak-read path, which talks to the engine directly under a
//! local lock and may return state a strong reader elsewhere in the
//! cluster hasn't seen yet.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::command::{Command, Op};
use crate::error::{CommandError, Error, Result};
use crate::path::BucketPath;

use super::tree::{BucketNode, Item};

const MAGIC: &[u8; 4] = b"HVST";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1 + 8;

/// The result of applying a [`Command`] against the local engine.
///
/// `Err` exists only so a failed apply can cross the Raft state-machine
/// response type (`openraft`'s `R`), which has to be `Serialize` and
/// can't carry the real `Error` (its `StorageError` source isn't). The
/// local engine itself never returns `Ok(CommandResponse::Err(_))`; it
/// returns a plain `Err` like any other fallible call. Only the FSM
/// (`crate::raft::log_store`) wraps a failed apply this way before
/// handing it back through `openraft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandResponse {
    Ok,
    Value(Vec<u8>),
    Listing(Vec<Item>),
    Err(CommandError),
}

/// A plain, `Arc`-free mirror of [`BucketNode`] used only at the
/// serialization boundary, so the in-memory tree itself never has to
/// carry a `serde` bound on `Arc`.
#[derive(Serialize, Deserialize)]
struct StoredNode {
    values: BTreeMap<Vec<u8>, Vec<u8>>,
    children: BTreeMap<Vec<u8>, StoredNode>,
}

fn flatten(node: &BucketNode) -> StoredNode {
    StoredNode {
        values: node.values().clone(),
        children: node.children().iter().map(|(k, v)| (k.clone(), flatten(v))).collect(),
    }
}

fn unflatten(stored: StoredNode) -> Arc<BucketNode> {
    let children = stored.children.into_iter().map(|(k, v)| (k, unflatten(v))).collect();
    Arc::new(BucketNode::from_parts(stored.values, children))
}

pub struct Database {
    root: RwLock<Arc<BucketNode>>,
    path: PathBuf,
}

impl Database {
    /// Opens the engine file at `path`, starting from an empty tree if
    /// none exists yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let root = if path.exists() {
            load(&path)?
        } else {
            BucketNode::empty()
        };
        Ok(Database {
            root: RwLock::new(root),
            path,
        })
    }

    /// A read-only snapshot of the whole tree: cheap, since it's just an
    /// `Arc` clone of the current root.
    pub fn snapshot(&self) -> Arc<BucketNode> {
        self.root.read().expect("engine lock poisoned").clone()
    }

    /// Replaces the whole tree outright, as when installing a Raft
    /// snapshot on a lagging follower.
    pub fn restore(&self, root: Arc<BucketNode>) -> Result<()> {
        *self.root.write().expect("engine lock poisoned") = root;
        self.persist()
    }

    /// Applies a command against the current tree and persists the
    /// result before returning.
    pub fn apply(&self, cmd: &Command) -> Result<CommandResponse> {
        match cmd.op {
            Op::CreateBucket => {
                self.mutate(|root| BucketNode::with_bucket_created(root, &cmd.bucket_path, &cmd.key))?;
                Ok(CommandResponse::Ok)
            }
            Op::DeleteBucket => {
                self.mutate(|root| BucketNode::with_bucket_deleted(root, &cmd.bucket_path, &cmd.key))?;
                Ok(CommandResponse::Ok)
            }
            Op::Set => {
                self.mutate(|root| BucketNode::with_set(root, &cmd.bucket_path, &cmd.key, &cmd.value))?;
                Ok(CommandResponse::Ok)
            }
            Op::Delete => {
                self.mutate(|root| BucketNode::with_deleted(root, &cmd.bucket_path, &cmd.key))?;
                Ok(CommandResponse::Ok)
            }
            Op::Get => {
                let root = self.snapshot();
                let node = BucketNode::navigate(&root, &cmd.bucket_path)?;
                let value = node
                    .get(&cmd.key)
                    .ok_or_else(|| Error::not_found(String::from_utf8_lossy(&cmd.key).into_owned()))?;
                Ok(CommandResponse::Value(value.to_vec()))
            }
            Op::Seek => {
                let root = self.snapshot();
                let node = BucketNode::navigate(&root, &cmd.bucket_path)?;
                let item = node.seek(&cmd.key).ok_or_else(|| {
                    Error::not_found(format!("no key >= {:?}", String::from_utf8_lossy(&cmd.key)))
                })?;
                Ok(CommandResponse::Value(item.value))
            }
            Op::List => {
                let root = self.snapshot();
                let node = BucketNode::navigate(&root, &cmd.bucket_path)?;
                Ok(CommandResponse::Listing(node.list()))
            }
        }
    }

    fn mutate(&self, f: impl FnOnce(&Arc<BucketNode>) -> Result<Arc<BucketNode>>) -> Result<()> {
        let mut guard = self.root.write().expect("engine lock poisoned");
        let new_root = f(&guard)?;
        *guard = new_root;
        drop(guard);
        self.persist()
    }

    /// Encodes a tree snapshot (e.g. from [`Database::snapshot`]) to bytes
    /// suitable for shipping across the network as a Raft snapshot. Uses
    /// the same flattened representation as the on-disk file, but without
    /// its header, since the transport layer tracks snapshot metadata
    /// separately.
    pub fn encode_snapshot(root: &Arc<BucketNode>) -> Result<Vec<u8>> {
        bincode::serialize(&flatten(root)).map_err(Error::storage)
    }

    /// The inverse of [`Database::encode_snapshot`].
    pub fn decode_snapshot(bytes: &[u8]) -> Result<Arc<BucketNode>> {
        let stored: StoredNode = bincode::deserialize(bytes).map_err(Error::storage)?;
        Ok(unflatten(stored))
    }

    /// Writes the whole tree to a temp file beside the real one, then
    /// renames it into place. A crash mid-write leaves the previous,
    /// still-valid file untouched; a reader never observes a half-written
    /// state.
    pub fn persist(&self) -> Result<()> {
        let root = self.snapshot();
        let stored = flatten(&root);
        let body = bincode::serialize(&stored).map_err(Error::storage)?;
        let checksum = fnv1a(&body);

        let mut file_bytes = Vec::with_capacity(HEADER_LEN + body.len());
        file_bytes.extend_from_slice(MAGIC);
        file_bytes.push(FORMAT_VERSION);
        file_bytes.extend_from_slice(&checksum.to_le_bytes());
        file_bytes.extend_from_slice(&body);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &file_bytes)?;
        fs::rename(&tmp_path, &self.path)?;
        tracing::debug!(bytes = file_bytes.len(), path = %self.path.display(), "persisted engine state");
        Ok(())
    }
}

fn load(path: &Path) -> Result<Arc<BucketNode>> {
    let file_bytes = fs::read(path)?;
    if file_bytes.len() < HEADER_LEN {
        return Err(Error::Corruption("engine file shorter than its header".to_string()));
    }
    if &file_bytes[0..4] != MAGIC {
        return Err(Error::Corruption("engine file has the wrong magic bytes".to_string()));
    }
    let version = file_bytes[4];
    if version != FORMAT_VERSION {
        return Err(Error::Corruption(format!("unsupported engine file version {version}")));
    }
    let checksum = u64::from_le_bytes(file_bytes[5..HEADER_LEN].try_into().unwrap());
    let body = &file_bytes[HEADER_LEN..];
    if fnv1a(body) != checksum {
        return Err(Error::Corruption("engine file checksum mismatch".to_string()));
    }

    let stored: StoredNode = bincode::deserialize(body).map_err(Error::storage)?;
    Ok(unflatten(stored))
}

fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_through_apply() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("engine.db")).unwrap();
        db.apply(&Command::set(BucketPath::root(), b"k", b"v")).unwrap();
        let resp = db.apply(&Command::get(BucketPath::root(), b"k")).unwrap();
        assert_eq!(resp, CommandResponse::Value(b"v".to_vec()));
    }

    #[test]
    fn persists_and_reopens() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("engine.db");
        {
            let db = Database::open(&file_path).unwrap();
            db.apply(&Command::set(BucketPath::root(), b"k", b"v")).unwrap();
        }
        let db = Database::open(&file_path).unwrap();
        let resp = db.apply(&Command::get(BucketPath::root(), b"k")).unwrap();
        assert_eq!(resp, CommandResponse::Value(b"v".to_vec()));
    }

    #[test]
    fn rejects_corrupted_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("engine.db");
        fs::write(&file_path, b"not a real engine file at all").unwrap();
        assert!(matches!(Database::open(&file_path), Err(Error::Corruption(_))));
    }

    #[test]
    fn nested_bucket_roundtrips_through_persistence() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("engine.db");
        let path = BucketPath::root().join(b"a").unwrap();
        {
            let db = Database::open(&file_path).unwrap();
            db.apply(&Command::create_bucket(BucketPath::root(), b"a")).unwrap();
            db.apply(&Command::set(path.clone(), b"k", b"v")).unwrap();
        }
        let db = Database::open(&file_path).unwrap();
        let resp = db.apply(&Command::get(path, b"k")).unwrap();
        assert_eq!(resp, CommandResponse::Value(b"v".to_vec()));
    }

    #[test]
    fn snapshot_then_restore_onto_fresh_database() {
        let dir = tempdir().unwrap();
        let source = Database::open(dir.path().join("source.db")).unwrap();
        source.apply(&Command::set(BucketPath::root(), b"k", b"v")).unwrap();
        let snap = source.snapshot();

        let target = Database::open(dir.path().join("target.db")).unwrap();
        target.restore(snap).unwrap();
        let resp = target.apply(&Command::get(BucketPath::root(), b"k")).unwrap();
        assert_eq!(resp, CommandResponse::Value(b"v".to_vec()));
    }
}
