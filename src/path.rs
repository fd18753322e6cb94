//! Bucket-path addressing: the slash-delimited namespace scheme that makes
//! FSM application deterministic across peers.

use crate::error::Error;

/// An ordered sequence of bucket names from the root, e.g. `/a/b/c/`.
///
/// `BucketPath` never contains empty segments; the root path has zero
/// segments and renders as `/`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BucketPath {
    segments: Vec<Vec<u8>>,
}

impl BucketPath {
    /// The root path, with no segments.
    pub fn root() -> Self {
        BucketPath { segments: Vec::new() }
    }

    /// Parses a wire-form path such as `/a/b/c/`, `a/b/c`, or `/`.
    ///
    /// Leading and trailing `/` are discarded; empty interior segments
    /// (`a//b`) are rejected as `InvalidPath`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(BucketPath::root());
        }

        let mut segments = Vec::new();
        for part in trimmed.split('/') {
            if part.is_empty() {
                return Err(Error::InvalidPath {
                    path: raw.to_string(),
                    reason: "empty path segment".to_string(),
                });
            }
            segments.push(part.as_bytes().to_vec());
        }
        Ok(BucketPath { segments })
    }

    /// Returns a new path with `name` appended as the final segment.
    ///
    /// Fails if `name` is empty or contains a `/`.
    pub fn join(&self, name: &[u8]) -> Result<Self, Error> {
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_vec());
        Ok(BucketPath { segments })
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Renders the canonical wire form: `/a/b/c/`, or `/` for the root.
    pub fn render(&self) -> String {
        let mut s = String::from("/");
        for seg in &self.segments {
            s.push_str(&String::from_utf8_lossy(seg));
            s.push('/');
        }
        s
    }
}

fn validate_segment(name: &[u8]) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::InvalidPath {
            path: String::new(),
            reason: "bucket name must not be empty".to_string(),
        });
    }
    if name.contains(&b'/') {
        return Err(Error::InvalidPath {
            path: String::from_utf8_lossy(name).into_owned(),
            reason: "bucket name must not contain '/'".to_string(),
        });
    }
    Ok(())
}
