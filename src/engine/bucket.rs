//! `Bucket`: a path-scoped handle onto a [`Database`].
//!
//! Earlier bucket-handle designs in this lineage cached child buckets as
//! `Rc<RefCell<Bucket>>` with a `Weak` pointer back to the parent, so
//! walking the tree meant walking a cycle of reference-counted cells.
//! `Bucket` instead just remembers its own path and borrows the database;
//! "descending" into a child bucket means building a new, independent
//! handle with the child's path appended. There is no parent pointer to
//! get wrong.

use crate::command::Command;
use crate::engine::cursor::Cursor;
use crate::engine::database::{CommandResponse, Database};
use crate::error::Result;
use crate::path::BucketPath;

/// A handle onto the bucket at a fixed path within a [`Database`].
pub struct Bucket<'db> {
    db: &'db Database,
    path: BucketPath,
}

impl<'db> Bucket<'db> {
    /// A handle onto the root bucket.
    pub fn root(db: &'db Database) -> Self {
        Bucket { db, path: BucketPath::root() }
    }

    /// A handle onto the bucket at `path`, without checking it exists;
    /// operations against it will surface `NotFound` if it doesn't.
    pub fn at(db: &'db Database, path: BucketPath) -> Self {
        Bucket { db, path }
    }

    pub fn path(&self) -> &BucketPath {
        &self.path
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.db.apply(&Command::get(self.path.clone(), key))? {
            CommandResponse::Value(v) => Ok(v),
            other => unreachable!("Get yielded unexpected response {other:?}"),
        }
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.apply(&Command::set(self.path.clone(), key, value))?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.apply(&Command::delete(self.path.clone(), key))?;
        Ok(())
    }

    /// Creates a child bucket named `name` and returns a handle onto it.
    pub fn create_bucket(&self, name: &[u8]) -> Result<Bucket<'db>> {
        self.db.apply(&Command::create_bucket(self.path.clone(), name))?;
        self.bucket(name)
    }

    pub fn delete_bucket(&self, name: &[u8]) -> Result<()> {
        self.db.apply(&Command::delete_bucket(self.path.clone(), name))?;
        Ok(())
    }

    /// Returns a handle onto an existing child bucket, without touching
    /// the engine: existence is checked the first time an operation runs
    /// against it.
    pub fn bucket(&self, name: &[u8]) -> Result<Bucket<'db>> {
        let child_path = self.path.join(name)?;
        Ok(Bucket::at(self.db, child_path))
    }

    pub fn seek(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.db.apply(&Command::seek(self.path.clone(), key))? {
            CommandResponse::Value(v) => Ok(v),
            other => unreachable!("Seek yielded unexpected response {other:?}"),
        }
    }

    pub fn cursor(&self) -> Result<Cursor> {
        match self.db.apply(&Command::list(self.path.clone()))? {
            CommandResponse::Listing(items) => Ok(Cursor::new(items)),
            other => unreachable!("List yielded unexpected response {other:?}"),
        }
    }
}

impl crate::traits::ValueGetter for Bucket<'_> {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        Bucket::get(self, key)
    }
}

impl crate::traits::ValueSetter for Bucket<'_> {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Bucket::put(self, key, value)
    }
}

impl crate::traits::ValueDeleter for Bucket<'_> {
    fn delete(&self, key: &[u8]) -> Result<()> {
        Bucket::delete(self, key)
    }
}

impl crate::traits::ValueLister for Bucket<'_> {
    fn list(&self) -> Result<Vec<crate::engine::Item>> {
        let mut cursor = Bucket::cursor(self)?;
        let mut items = Vec::with_capacity(cursor.len());
        let mut next = cursor.first().cloned();
        while let Some(item) = next {
            items.push(item);
            next = cursor.next().cloned();
        }
        Ok(items)
    }

    fn seek(&self, key: &[u8]) -> Result<Vec<u8>> {
        Bucket::seek(self, key)
    }
}

impl<'db> crate::traits::Buckets for Bucket<'db> {
    type Child = Bucket<'db>;

    fn bucket(&self, name: &[u8]) -> Result<Self::Child> {
        Bucket::bucket(self, name)
    }

    fn create_bucket(&self, name: &[u8]) -> Result<Self::Child> {
        Bucket::create_bucket(self, name)
    }

    fn delete_bucket(&self, name: &[u8]) -> Result<()> {
        Bucket::delete_bucket(self, name)
    }
}

impl std::fmt::Debug for Bucket<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket").field("path", &self.path.render()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("engine.db")).unwrap();
        let root = Bucket::root(&db);

        root.put(b"k", b"v").unwrap();
        assert_eq!(root.get(b"k").unwrap(), b"v");

        root.delete(b"k").unwrap();
        assert!(root.get(b"k").is_err());
    }

    #[test]
    fn nested_bucket_handle_is_independent_of_parent() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("engine.db")).unwrap();
        let root = Bucket::root(&db);

        let child = root.create_bucket(b"sub").unwrap();
        child.put(b"k", b"v").unwrap();

        let reopened = root.bucket(b"sub").unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), b"v");
    }
}
