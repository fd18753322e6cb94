//! End-to-end scenarios against a single bootstrapped node: these don't
//! exercise cross-node replication (that needs a real multi-process or
//! multi-task network harness) but do exercise the full write path from
//! the public API down through Raft commit and into the local engine.

use std::time::Duration;

use hivestore::{Config, Consensus, ReplicationNode};
use tempfile::tempdir;

fn test_config(dir: &std::path::Path, port: u16) -> Config {
    Config {
        engine_path: dir.join("engine.db"),
        raft_dir: dir.join("raft"),
        listen_addr: format!("127.0.0.1:{port}"),
        peers: Vec::new(),
        apply_timeout: Duration::from_secs(5),
        leader_wait_timeout: Duration::from_secs(5),
        snapshot_retention: 3,
    }
}

#[tokio::test]
async fn bootstrap_single_node_becomes_leader() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27101)).await.unwrap();
    node.wait_for_leader().await.unwrap();
    assert!(node.is_leader());
}

#[tokio::test]
async fn strong_write_then_strong_read() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27102)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    root.set(b"k", b"v").await.unwrap();
    assert_eq!(root.strong_get(b"k").await.unwrap(), b"v");
}

#[tokio::test]
async fn weak_read_sees_committed_write() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27103)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    root.set(b"k", b"v").await.unwrap();
    assert_eq!(root.weak_get(b"k").await.unwrap(), b"v");
}

#[tokio::test]
async fn nested_bucket_write_and_list() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27104)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    root.create_bucket(b"sub").await.unwrap();
    let sub = root.bucket(b"sub").unwrap();
    sub.set(b"k1", b"v1").await.unwrap();
    sub.set(b"k2", b"v2").await.unwrap();

    let items = sub.list().await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| !i.bucket));
}

#[tokio::test]
async fn get_on_missing_key_is_not_found() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27105)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    let err = root.strong_get(b"missing").await.unwrap_err();
    assert!(matches!(err, hivestore::Error::NotFound(_)));
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27106)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    root.set(b"k", b"v").await.unwrap();
    root.delete(b"k").await.unwrap();
    assert!(root.strong_get(b"k").await.is_err());
}

#[tokio::test]
async fn delete_into_a_missing_bucket_path_is_not_found() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27108)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let missing = node.bucket(
        hivestore::BucketPath::root()
            .join(b"does")
            .unwrap()
            .join(b"not")
            .unwrap()
            .join(b"exist")
            .unwrap(),
    );
    let err = missing.delete(b"k").await.unwrap_err();
    assert!(matches!(err, hivestore::Error::NotFound(_)));
}

#[tokio::test]
async fn delete_of_missing_key_is_not_found() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27112)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let err = node.root().delete(b"missing").await.unwrap_err();
    assert!(matches!(err, hivestore::Error::NotFound(_)));
}

#[tokio::test]
async fn creating_an_existing_bucket_is_a_no_op() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27109)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    root.create_bucket(b"sub").await.unwrap();
    let sub = root.bucket(b"sub").unwrap();
    sub.set(b"k", b"v").await.unwrap();

    root.create_bucket(b"sub").await.unwrap();
    assert_eq!(sub.strong_get(b"k").await.unwrap(), b"v");
}

#[tokio::test]
async fn seek_returns_the_value_at_the_first_key_at_or_after() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27110)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    root.set(b"a", b"1").await.unwrap();
    root.set(b"c", b"3").await.unwrap();

    assert_eq!(root.seek(b"b").await.unwrap(), b"3");
    assert_eq!(root.weak_seek(b"b").await.unwrap(), b"3");
}

#[tokio::test]
async fn weak_list_sees_committed_writes() {
    let dir = tempdir().unwrap();
    let node = ReplicationNode::start(test_config(dir.path(), 27111)).await.unwrap();
    node.wait_for_leader().await.unwrap();

    let root = node.root();
    root.set(b"k1", b"v1").await.unwrap();
    root.set(b"k2", b"v2").await.unwrap();

    let items = root.weak_list().await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn engine_state_survives_node_restart() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path(), 27107);

    {
        let node = ReplicationNode::start(cfg.clone()).await.unwrap();
        node.wait_for_leader().await.unwrap();
        node.root().set(b"k", b"v").await.unwrap();
    }

    let node = ReplicationNode::start(cfg).await.unwrap();
    node.wait_for_leader().await.unwrap();
    assert_eq!(node.root().strong_get(b"k").await.unwrap(), b"v");
}
