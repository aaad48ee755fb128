//! JSON-RPC binding of the consensus client contract.
//!
//! Defines the `nitroconsensus` namespace served by consensus nodes, the wire types used in
//! it and the mapping between [`ConsensusError`](consensus_client_common::ConsensusError) and
//! JSON-RPC error objects.

mod errors;
mod types;

use consensus_client_common::SyncProgressSnapshot;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

pub use errors::{codes, from_error_object, to_rpc_error, RpcErrorData, RpcResource};
pub use types::{
    HexBytes, RpcL1IncomingMessage, RpcL1IncomingMessageHeader, RpcMessageWithMetadata,
    WireError,
};

/// Namespace every method of [`ConsensusRpc`] is served under.
pub const RPC_NAMESPACE: &str = "nitroconsensus";

/// Methods a consensus node serves to its execution node.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "nitroconsensus"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "nitroconsensus"))]
pub trait ConsensusRpc {
    /// Get the contents of a batch.
    #[method(name = "fetchBatch")]
    async fn fetch_batch(&self, batch_num: u64) -> RpcResult<HexBytes>;

    /// Get the number of the batch containing a message.
    #[method(name = "findL1BatchForMessage")]
    async fn find_l1_batch_for_message(&self, message: u64) -> RpcResult<u64>;

    /// Get the base layer block a batch was posted in.
    #[method(name = "getBatchL1Block")]
    async fn get_batch_l1_block(&self, batch_num: u64) -> RpcResult<u64>;

    /// Get free-form sync diagnostics.
    #[method(name = "syncProgressMap")]
    async fn sync_progress_map(&self) -> RpcResult<SyncProgressSnapshot>;

    #[method(name = "syncTargetMessageCount")]
    async fn sync_target_message_count(&self) -> RpcResult<u64>;

    #[method(name = "getSafeMsgCount")]
    async fn get_safe_msg_count(&self) -> RpcResult<u64>;

    #[method(name = "getFinalizedMsgCount")]
    async fn get_finalized_msg_count(&self) -> RpcResult<u64>;

    /// Append a message to the log. Only the lease holder may write.
    #[method(name = "writeMessageFromSequencer")]
    async fn write_message_from_sequencer(
        &self,
        pos: u64,
        msg: RpcMessageWithMetadata,
    ) -> RpcResult<()>;

    /// Succeeds if the caller holds the sequencer lease.
    #[method(name = "expectChosenSequencer")]
    async fn expect_chosen_sequencer(&self) -> RpcResult<()>;
}
