//! The persistent nested-bucket structure underlying the local engine.
//!
//! A real page-oriented B+tree mutates pages in place and tracks a
//! freelist of reclaimed ones. This engine takes a different, still
//! transactional, route: each bucket is a node holding its own leaf
//! values and a map of child buckets reached by `Arc`. A write clones the
//! spine of nodes from the root down to the mutated bucket and swaps the
//! new root in atomically; every other reader still holding the old
//! `Arc<BucketNode>` keeps seeing a consistent, unmutated snapshot. No
//! bucket ever holds a reference back up to its parent, which is what the
//! cursor and bucket-cache code this was grown from got wrong with cyclic
//! `Rc<RefCell<_>>` links.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::path::BucketPath;

/// One entry returned by [`BucketNode::list`]: either a leaf value or a
/// child bucket, mirroring the two kinds of thing a directory listing can
/// contain.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub bucket: bool,
}

/// A single bucket's contents: its own key/value pairs plus its
/// immediate child buckets.
#[derive(Debug, Clone, Default)]
pub struct BucketNode {
    values: BTreeMap<Vec<u8>, Vec<u8>>,
    children: BTreeMap<Vec<u8>, Arc<BucketNode>>,
}

impl BucketNode {
    pub fn empty() -> Arc<Self> {
        Arc::new(BucketNode::default())
    }

    /// Walks down from `root` following `path`, returning the bucket node
    /// found there, if any.
    pub fn navigate<'a>(root: &'a BucketNode, path: &BucketPath) -> Result<&'a BucketNode, Error> {
        let mut cur = root;
        for seg in path.segments() {
            cur = cur
                .children
                .get(seg)
                .ok_or_else(|| Error::not_found(format!("bucket segment {:?}", String::from_utf8_lossy(seg))))?;
        }
        Ok(cur)
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.values.get(key).map(|v| v.as_slice())
    }

    pub fn has_child(&self, name: &[u8]) -> bool {
        self.children.contains_key(name)
    }

    pub fn values(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.values
    }

    pub fn children(&self) -> &BTreeMap<Vec<u8>, Arc<BucketNode>> {
        &self.children
    }

    pub fn from_parts(values: BTreeMap<Vec<u8>, Vec<u8>>, children: BTreeMap<Vec<u8>, Arc<BucketNode>>) -> Self {
        BucketNode { values, children }
    }

    /// Lists leaf entries first, then child buckets, both in key order,
    /// matching the BoltDB convention this engine's listing API is
    /// grounded on.
    pub fn list(&self) -> Vec<Item> {
        let mut out = Vec::with_capacity(self.values.len() + self.children.len());
        for (k, v) in &self.values {
            out.push(Item {
                key: k.clone(),
                value: v.clone(),
                bucket: false,
            });
        }
        for name in self.children.keys() {
            out.push(Item {
                key: name.clone(),
                value: Vec::new(),
                bucket: true,
            });
        }
        out
    }

    /// Returns the first item, leaf or bucket, whose key is `>= from` in
    /// key order, if any.
    pub fn seek(&self, from: &[u8]) -> Option<Item> {
        self.list().into_iter().find(|item| item.key.as_slice() >= from)
    }

    /// Returns a new tree with `key` set to `value` within the bucket at
    /// `path`. Bucket-path resolution is create-if-absent: any segment of
    /// `path` that doesn't exist yet is materialized as an empty bucket
    /// along the way, rather than failing the write with `NotFound`.
    pub fn with_set(root: &Arc<BucketNode>, path: &BucketPath, key: &[u8], value: &[u8]) -> Result<Arc<BucketNode>, Error> {
        rebuild(root, path.segments(), true, &mut |node| {
            node.values.insert(key.to_vec(), value.to_vec());
            Ok(())
        })
    }

    /// Returns a new tree with `key` removed from the bucket at `path`.
    /// Both a missing `path` and a missing `key` within it fail with
    /// `NotFound`; unlike opening a bucket, deleting one is not
    /// create-if-absent.
    pub fn with_deleted(root: &Arc<BucketNode>, path: &BucketPath, key: &[u8]) -> Result<Arc<BucketNode>, Error> {
        rebuild(root, path.segments(), false, &mut |node| {
            if node.values.remove(key).is_none() {
                return Err(Error::not_found(String::from_utf8_lossy(key).into_owned()));
            }
            Ok(())
        })
    }

    /// Returns a new tree with a child bucket named `name` present under
    /// `path`. Opening a bucket is create-if-absent: if `name` already
    /// exists, this is a no-op success that leaves its contents untouched,
    /// rather than an error.
    pub fn with_bucket_created(root: &Arc<BucketNode>, path: &BucketPath, name: &[u8]) -> Result<Arc<BucketNode>, Error> {
        rebuild(root, path.segments(), true, &mut |node| {
            node.children.entry(name.to_vec()).or_insert_with(BucketNode::empty);
            Ok(())
        })
    }

    /// Returns a new tree with the child bucket `name` under `path`
    /// removed, along with everything nested inside it.
    pub fn with_bucket_deleted(root: &Arc<BucketNode>, path: &BucketPath, name: &[u8]) -> Result<Arc<BucketNode>, Error> {
        rebuild(root, path.segments(), false, &mut |node| {
            if node.children.remove(name).is_none() {
                return Err(Error::not_found(String::from_utf8_lossy(name).into_owned()));
            }
            Ok(())
        })
    }
}

/// Clones the spine of nodes from `root` down to `segments`, applies
/// `mutate` to the node found there, and returns the new root. Siblings
/// off the spine keep sharing their old `Arc` allocation.
///
/// When `auto_vivify` is set, a missing intermediate segment is
/// materialized as a fresh empty bucket instead of failing the whole
/// operation with `NotFound` — bucket-path resolution for a write is
/// create-if-absent all the way down, the same as opening any single
/// bucket is.
fn rebuild(
    root: &Arc<BucketNode>,
    segments: &[Vec<u8>],
    auto_vivify: bool,
    mutate: &mut dyn FnMut(&mut BucketNode) -> Result<(), Error>,
) -> Result<Arc<BucketNode>, Error> {
    if segments.is_empty() {
        let mut new_node = (**root).clone();
        mutate(&mut new_node)?;
        return Ok(Arc::new(new_node));
    }

    let head = &segments[0];
    let child = match root.children.get(head) {
        Some(child) => child.clone(),
        None if auto_vivify => BucketNode::empty(),
        None => return Err(Error::not_found(format!("bucket segment {:?}", String::from_utf8_lossy(head)))),
    };
    let new_child = rebuild(&child, &segments[1..], auto_vivify, mutate)?;

    let mut new_root = (**root).clone();
    new_root.children.insert(head.clone(), new_child);
    Ok(new_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let root = BucketNode::empty();
        let root = BucketNode::with_set(&root, &BucketPath::root(), b"k", b"v").unwrap();
        let node = BucketNode::navigate(&root, &BucketPath::root()).unwrap();
        assert_eq!(node.get(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn old_snapshot_is_unaffected_by_later_writes() {
        let root = BucketNode::empty();
        let root = BucketNode::with_set(&root, &BucketPath::root(), b"k", b"v1").unwrap();
        let snapshot = root.clone();
        let root = BucketNode::with_set(&root, &BucketPath::root(), b"k", b"v2").unwrap();

        assert_eq!(BucketNode::navigate(&snapshot, &BucketPath::root()).unwrap().get(b"k"), Some(&b"v1"[..]));
        assert_eq!(BucketNode::navigate(&root, &BucketPath::root()).unwrap().get(b"k"), Some(&b"v2"[..]));
    }

    #[test]
    fn nested_bucket_create_and_navigate() {
        let root = BucketNode::empty();
        let root = BucketNode::with_bucket_created(&root, &BucketPath::root(), b"a").unwrap();
        let path = BucketPath::root().join(b"a").unwrap();
        let root = BucketNode::with_set(&root, &path, b"k", b"v").unwrap();

        let node = BucketNode::navigate(&root, &path).unwrap();
        assert_eq!(node.get(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn create_bucket_twice_is_a_no_op() {
        let root = BucketNode::empty();
        let root = BucketNode::with_bucket_created(&root, &BucketPath::root(), b"a").unwrap();
        let path = BucketPath::root().join(b"a").unwrap();
        let root = BucketNode::with_set(&root, &path, b"k", b"v").unwrap();

        let root = BucketNode::with_bucket_created(&root, &BucketPath::root(), b"a").unwrap();
        let node = BucketNode::navigate(&root, &path).unwrap();
        assert_eq!(node.get(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn set_auto_vivifies_missing_bucket_path() {
        let root = BucketNode::empty();
        let path = BucketPath::root().join(b"a").unwrap().join(b"b").unwrap();
        let root = BucketNode::with_set(&root, &path, b"k", b"v").unwrap();
        let node = BucketNode::navigate(&root, &path).unwrap();
        assert_eq!(node.get(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn delete_bucket_on_missing_parent_path_is_not_found() {
        let root = BucketNode::empty();
        let path = BucketPath::root().join(b"a").unwrap();
        assert!(matches!(BucketNode::with_bucket_deleted(&root, &path, b"b"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_into_missing_bucket_path_is_not_found() {
        let root = BucketNode::empty();
        let path = BucketPath::root().join(b"does").unwrap().join(b"not").unwrap().join(b"exist").unwrap();
        assert!(matches!(BucketNode::with_deleted(&root, &path, b"k"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_of_missing_key_is_not_found() {
        let root = BucketNode::empty();
        assert!(matches!(
            BucketNode::with_deleted(&root, &BucketPath::root(), b"missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn delete_bucket_removes_nested_contents() {
        let root = BucketNode::empty();
        let root = BucketNode::with_bucket_created(&root, &BucketPath::root(), b"a").unwrap();
        let path = BucketPath::root().join(b"a").unwrap();
        let root = BucketNode::with_set(&root, &path, b"k", b"v").unwrap();
        let root = BucketNode::with_bucket_deleted(&root, &BucketPath::root(), b"a").unwrap();
        assert!(BucketNode::navigate(&root, &path).is_err());
    }

    #[test]
    fn list_orders_leaves_before_buckets() {
        let root = BucketNode::empty();
        let root = BucketNode::with_set(&root, &BucketPath::root(), b"k", b"v").unwrap();
        let root = BucketNode::with_bucket_created(&root, &BucketPath::root(), b"sub").unwrap();
        let node = BucketNode::navigate(&root, &BucketPath::root()).unwrap();
        let items = node.list();
        assert_eq!(items.len(), 2);
        assert!(!items[0].bucket);
        assert!(items[1].bucket);
    }

    #[test]
    fn seek_finds_first_key_at_or_after() {
        let root = BucketNode::empty();
        let root = BucketNode::with_set(&root, &BucketPath::root(), b"a", b"1").unwrap();
        let root = BucketNode::with_set(&root, &BucketPath::root(), b"c", b"3").unwrap();
        let node = BucketNode::navigate(&root, &BucketPath::root()).unwrap();
        let found = node.seek(b"b").unwrap();
        assert_eq!(found.key, b"c");
    }
}
