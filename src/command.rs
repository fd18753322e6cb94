//! The replicated command and its wire codec.
//!
//! Every mutation, and every strong read, is represented as a `Command`
//! before it is handed to Raft. The codec is hand-rolled rather than a
//! generic `serde` derive so the on-wire shape (§6 of the design) is fixed
//! independently of whatever serialization crate happens to be linked in:
//! a version byte, a one-byte op tag, then three length-prefixed byte
//! strings. This is what gets replicated and, eventually, replayed from an
//! old log, so its stability matters more than its compactness.

use crate::error::Error;
use crate::path::BucketPath;

/// Wire format version. Bump and branch on this if the layout ever changes;
/// never reuse a retired version number.
const WIRE_VERSION: u8 = 1;

/// Distinct, explicitly-numbered operation tags.
///
/// The numbering is part of the wire format and must never be reassigned.
/// A `Seek` command is its own tag: an earlier control-plane prototype this
/// store's design was drawn from reused the `Set` tag for `Seek` in one
/// code path, silently corrupting a deployed log. Never again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    CreateBucket = 1,
    DeleteBucket = 2,
    Set = 3,
    Delete = 4,
    Get = 5,
    Seek = 6,
    List = 7,
}

impl Op {
    fn from_tag(tag: u8) -> Result<Self, Error> {
        Ok(match tag {
            1 => Op::CreateBucket,
            2 => Op::DeleteBucket,
            3 => Op::Set,
            4 => Op::Delete,
            5 => Op::Get,
            6 => Op::Seek,
            7 => Op::List,
            other => {
                return Err(Error::Corruption(format!("unknown command op tag {other}")));
            }
        })
    }
}

/// A single replicated mutation or strong-read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub op: Op,
    pub bucket_path: BucketPath,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

// `Command` is serialized exactly once, canonically, by `encode`/`decode`.
// These impls route `serde` (needed because `openraft`'s log entries carry
// application data through `serde`) through that same codec instead of
// letting a derive pick an independent, parallel representation.
impl serde::Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.encode())
    }
}

impl<'de> serde::Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        Command::decode(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Command {
    pub fn create_bucket(bucket_path: BucketPath, name: &[u8]) -> Self {
        Command {
            op: Op::CreateBucket,
            bucket_path,
            key: name.to_vec(),
            value: Vec::new(),
        }
    }

    pub fn delete_bucket(bucket_path: BucketPath, name: &[u8]) -> Self {
        Command {
            op: Op::DeleteBucket,
            bucket_path,
            key: name.to_vec(),
            value: Vec::new(),
        }
    }

    pub fn set(bucket_path: BucketPath, key: &[u8], value: &[u8]) -> Self {
        Command {
            op: Op::Set,
            bucket_path,
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    pub fn delete(bucket_path: BucketPath, key: &[u8]) -> Self {
        Command {
            op: Op::Delete,
            bucket_path,
            key: key.to_vec(),
            value: Vec::new(),
        }
    }

    pub fn get(bucket_path: BucketPath, key: &[u8]) -> Self {
        Command {
            op: Op::Get,
            bucket_path,
            key: key.to_vec(),
            value: Vec::new(),
        }
    }

    pub fn seek(bucket_path: BucketPath, key: &[u8]) -> Self {
        Command {
            op: Op::Seek,
            bucket_path,
            key: key.to_vec(),
            value: Vec::new(),
        }
    }

    pub fn list(bucket_path: BucketPath) -> Self {
        Command {
            op: Op::List,
            bucket_path,
            key: Vec::new(),
            value: Vec::new(),
        }
    }

    /// Encodes this command to its canonical wire form.
    pub fn encode(&self) -> Vec<u8> {
        let path = self.bucket_path.render();
        let path_bytes = path.as_bytes();

        let mut out = Vec::with_capacity(1 + 1 + 12 + path_bytes.len() + self.key.len() + self.value.len());
        out.push(WIRE_VERSION);
        out.push(self.op as u8);
        write_bytes(&mut out, path_bytes);
        write_bytes(&mut out, &self.key);
        write_bytes(&mut out, &self.value);
        out
    }

    /// Decodes a command previously produced by [`Command::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut cursor = 0usize;

        let version = take_byte(buf, &mut cursor)?;
        if version != WIRE_VERSION {
            return Err(Error::Corruption(format!(
                "unsupported command wire version {version}"
            )));
        }

        let op = Op::from_tag(take_byte(buf, &mut cursor)?)?;
        let path_bytes = take_bytes(buf, &mut cursor)?;
        let key = take_bytes(buf, &mut cursor)?.to_vec();
        let value = take_bytes(buf, &mut cursor)?.to_vec();

        let path_str = std::str::from_utf8(path_bytes)
            .map_err(|e| Error::Corruption(format!("bucket path is not valid UTF-8: {e}")))?;
        let bucket_path = BucketPath::parse(path_str)?;

        Ok(Command {
            op,
            bucket_path,
            key,
            value,
        })
    }
}

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn take_byte(buf: &[u8], cursor: &mut usize) -> Result<u8, Error> {
    let b = *buf
        .get(*cursor)
        .ok_or_else(|| Error::Corruption("command buffer truncated".to_string()))?;
    *cursor += 1;
    Ok(b)
}

fn take_bytes<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], Error> {
    let len_bytes = buf
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| Error::Corruption("command buffer truncated reading length".to_string()))?;
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    *cursor += 4;

    let data = buf
        .get(*cursor..*cursor + len)
        .ok_or_else(|| Error::Corruption("command buffer truncated reading field".to_string()))?;
    *cursor += len;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_roundtrips() {
        let path = BucketPath::parse("/a/b/").unwrap();
        let cmd = Command::set(path, b"waffy", b"test");
        let encoded = cmd.encode();
        let decoded = Command::decode(&encoded).unwrap();
        assert_eq!(cmd, decoded);
    }

    #[test]
    fn every_op_roundtrips() {
        let path = BucketPath::parse("/root/").unwrap();
        let cmds = vec![
            Command::create_bucket(path.clone(), b"A"),
            Command::delete_bucket(path.clone(), b"A"),
            Command::set(path.clone(), b"k", b"v"),
            Command::delete(path.clone(), b"k"),
            Command::get(path.clone(), b"k"),
            Command::seek(path.clone(), b"k"),
            Command::list(path.clone()),
        ];
        for cmd in cmds {
            assert_eq!(cmd, Command::decode(&cmd.encode()).unwrap());
        }
    }

    #[test]
    fn set_and_seek_use_distinct_tags() {
        let path = BucketPath::root();
        let set_cmd = Command::set(path.clone(), b"k", b"v").encode();
        let seek_cmd = Command::seek(path, b"k").encode();
        assert_ne!(set_cmd[1], seek_cmd[1]);
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut encoded = Command::get(BucketPath::root(), b"k").encode();
        encoded[0] = 0xFF;
        assert!(matches!(Command::decode(&encoded), Err(Error::Corruption(_))));
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let encoded = Command::set(BucketPath::root(), b"k", b"v").encode();
        assert!(Command::decode(&encoded[..3]).is_err());
    }

    #[quickcheck_macros::quickcheck]
    fn arbitrary_set_roundtrips(key: Vec<u8>, value: Vec<u8>, segs: Vec<String>) -> bool {
        let mut path = BucketPath::root();
        for s in segs.into_iter().map(|s| s.replace('/', "_")).filter(|s| !s.is_empty()) {
            path = path.join(s.as_bytes()).unwrap();
        }
        let cmd = Command::set(path, &key, &value);
        Command::decode(&cmd.encode()).unwrap() == cmd
    }
}
