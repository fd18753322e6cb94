//! The `openraft` type configuration binding this crate's application
//! data and response types, and a fixed `u64` node id space, into one
//! concrete `Raft` instantiation.

use crate::command::Command;
use crate::engine::database::CommandResponse;

/// A node's identity within the Raft cluster, derived deterministically
/// from its listen address rather than assigned out of band — see
/// [`crate::raft::node_id_for_addr`].
pub type NodeId = u64;

openraft::declare_raft_types!(
    pub TypeConfig:
        D = Command,
        R = CommandResponse,
        NodeId = NodeId,
        Node = openraft::BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = std::io::Cursor<Vec<u8>>
);

pub type Raft = openraft::Raft<TypeConfig>;

pub mod typ {
    use super::TypeConfig;

    pub type RaftError<E = openraft::error::Infallible> = openraft::error::RaftError<super::NodeId, E>;
    pub type RPCError<E = openraft::error::Infallible> =
        openraft::error::RPCError<super::NodeId, openraft::BasicNode, RaftError<E>>;
    pub type ClientWriteError = openraft::error::ClientWriteError<super::NodeId, openraft::BasicNode>;
    pub type CheckIsLeaderError = openraft::error::CheckIsLeaderError<super::NodeId, openraft::BasicNode>;
    pub type ForwardToLeader = openraft::error::ForwardToLeader<super::NodeId, openraft::BasicNode>;
    pub type InitializeError = openraft::error::InitializeError<super::NodeId, openraft::BasicNode>;
    pub type ClientWriteResponse = openraft::raft::ClientWriteResponse<TypeConfig>;
}
