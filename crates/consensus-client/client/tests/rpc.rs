//! The client against a consensus node served over JSON-RPC.

use std::{
    net::{SocketAddr, TcpListener},
    sync::Arc,
};

use consensus_client::{
    BatchFetcher, BatchNumber, ConsensusClient, ConsensusClientBuilder, ConsensusClientConfig,
    ConsensusError, ConsensusInfo, ConsensusSequencer, ErrorKind, L1BlockNumber, MessageIndex,
    RpcConfig, RpcConsensusRemote, SyncProgressSnapshot,
};
use consensus_client_common::{
    test_utils::{test_message, InMemoryConsensus},
    BatchSource, MessageWithMetadata, ProgressCounter, Resource, SequencerSink, SyncSource,
};
use consensus_client_rpc_api::{
    to_rpc_error, ConsensusRpcServer, HexBytes, RpcMessageWithMetadata,
};
use jsonrpsee::{
    core::{async_trait, RpcResult},
    server::{Server, ServerHandle},
    types::{error::INVALID_PARAMS_CODE, ErrorObjectOwned},
};
use serde_json::json;

/// Serves an in-memory node under the consensus namespace.
struct NodeRpc(Arc<InMemoryConsensus>);

fn rpc_err(err: ConsensusError) -> ErrorObjectOwned {
    to_rpc_error(&err)
}

#[async_trait]
impl ConsensusRpcServer for NodeRpc {
    async fn fetch_batch(&self, batch_num: u64) -> RpcResult<HexBytes> {
        let batch = BatchSource::fetch_batch(&*self.0, BatchNumber::new(batch_num))
            .await
            .map_err(rpc_err)?;
        Ok(batch.into())
    }

    async fn find_l1_batch_for_message(&self, message: u64) -> RpcResult<u64> {
        BatchSource::find_l1_batch_for_message(&*self.0, MessageIndex::new(message))
            .await
            .map(|b| b.get())
            .map_err(rpc_err)
    }

    async fn get_batch_l1_block(&self, batch_num: u64) -> RpcResult<u64> {
        BatchSource::get_batch_l1_block(&*self.0, BatchNumber::new(batch_num))
            .await
            .map(|b| b.get())
            .map_err(rpc_err)
    }

    async fn sync_progress_map(&self) -> RpcResult<SyncProgressSnapshot> {
        SyncSource::sync_progress_map(&*self.0).await.map_err(rpc_err)
    }

    async fn sync_target_message_count(&self) -> RpcResult<u64> {
        self.count(ProgressCounter::SyncTarget).await
    }

    async fn get_safe_msg_count(&self) -> RpcResult<u64> {
        self.count(ProgressCounter::Safe).await
    }

    async fn get_finalized_msg_count(&self) -> RpcResult<u64> {
        self.count(ProgressCounter::Finalized).await
    }

    async fn write_message_from_sequencer(
        &self,
        pos: u64,
        msg: RpcMessageWithMetadata,
    ) -> RpcResult<()> {
        let msg = MessageWithMetadata::try_from(msg).map_err(|err| {
            ErrorObjectOwned::owned(INVALID_PARAMS_CODE, err.to_string(), None::<()>)
        })?;
        SequencerSink::write_message_from_sequencer(&*self.0, MessageIndex::new(pos), msg)
            .await
            .map_err(rpc_err)
    }

    async fn expect_chosen_sequencer(&self) -> RpcResult<()> {
        SequencerSink::expect_chosen_sequencer(&*self.0)
            .await
            .map_err(rpc_err)
    }
}

impl NodeRpc {
    async fn count(&self, counter: ProgressCounter) -> RpcResult<u64> {
        self.0
            .message_count(counter)
            .await
            .map(|c| c.get())
            .map_err(rpc_err)
    }
}

async fn serve(node: &Arc<InMemoryConsensus>) -> (SocketAddr, ServerHandle) {
    let server = Server::builder().build("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.start(NodeRpc(Arc::clone(node)).into_rpc());
    (addr, handle)
}

fn rpc_config(addr: SocketAddr) -> RpcConfig {
    RpcConfig {
        url: format!("http://{addr}"),
        ..Default::default()
    }
}

async fn connected_client(node: &Arc<InMemoryConsensus>) -> (ConsensusClient, ServerHandle) {
    let (addr, handle) = serve(node).await;
    let mut config = ConsensusClientConfig::default();
    config.rpc = rpc_config(addr);
    config.sync.count_ttl_ms = 0;
    let client = ConsensusClientBuilder::new(config).connect().unwrap();
    (client, handle)
}

#[test]
fn test_methods_live_in_consensus_namespace() {
    let module = NodeRpc(Arc::new(InMemoryConsensus::new())).into_rpc();
    let names: Vec<_> = module.method_names().collect();

    for method in [
        "nitroconsensus_fetchBatch",
        "nitroconsensus_findL1BatchForMessage",
        "nitroconsensus_getBatchL1Block",
        "nitroconsensus_syncProgressMap",
        "nitroconsensus_syncTargetMessageCount",
        "nitroconsensus_getSafeMsgCount",
        "nitroconsensus_getFinalizedMsgCount",
        "nitroconsensus_writeMessageFromSequencer",
        "nitroconsensus_expectChosenSequencer",
    ] {
        assert!(names.contains(&method), "missing {method}");
    }
}

#[tokio::test]
async fn test_reads_over_rpc() {
    let node = Arc::new(InMemoryConsensus::new());
    node.push_batch(vec![0xab, 0xcd], 17, 4);
    node.set_count(ProgressCounter::SyncTarget, 4);
    node.set_count(ProgressCounter::Safe, 3);
    node.set_count(ProgressCounter::Finalized, 2);
    node.set_progress_entry("batchSeen", json!(1));
    let (client, _server) = connected_client(&node).await;

    assert_eq!(
        client.fetch_batch(BatchNumber::new(0)).await.unwrap().as_bytes(),
        &[0xab, 0xcd]
    );
    assert_eq!(
        client.get_batch_l1_block(BatchNumber::new(0)).await,
        Ok(L1BlockNumber::new(17))
    );
    assert_eq!(
        client.find_l1_batch_for_message(MessageIndex::new(3)).await,
        Ok(BatchNumber::new(0))
    );
    assert_eq!(client.get_finalized_msg_count().await, Ok(MessageIndex::new(2)));
    assert_eq!(client.get_safe_msg_count().await, Ok(MessageIndex::new(3)));
    assert_eq!(
        client.sync_target_message_count().await,
        Ok(MessageIndex::new(4))
    );
    assert_eq!(
        client.sync_progress_map().await.unwrap().get("batchSeen"),
        Some(&json!(1))
    );
}

#[tokio::test]
async fn test_node_errors_cross_the_wire() {
    let node = Arc::new(InMemoryConsensus::new());
    let (client, _server) = connected_client(&node).await;

    assert_eq!(
        client.fetch_batch(BatchNumber::new(9)).await,
        Err(ConsensusError::NotYetAvailable(Resource::Batch(
            BatchNumber::new(9)
        )))
    );
    assert_eq!(
        client.expect_chosen_sequencer().await,
        Err(ConsensusError::NotChosenSequencer)
    );
}

#[tokio::test]
async fn test_sequencing_over_rpc() {
    let node = Arc::new(InMemoryConsensus::new());
    node.grant_lease();
    node.seed_log(2);
    let (addr, _server) = serve(&node).await;
    let remote = RpcConsensusRemote::try_new(&rpc_config(addr)).unwrap();

    remote
        .write_message_from_sequencer(MessageIndex::new(2), test_message(2))
        .await
        .unwrap();
    assert_eq!(
        node.logged_message(MessageIndex::new(2)),
        Some(test_message(2))
    );

    // Identical resubmission is accepted again, a different message is not.
    remote
        .write_message_from_sequencer(MessageIndex::new(2), test_message(2))
        .await
        .unwrap();
    assert_eq!(
        remote
            .write_message_from_sequencer(MessageIndex::new(1), test_message(9))
            .await,
        Err(ConsensusError::ConflictingWrite {
            pos: MessageIndex::new(1)
        })
    );
    assert_eq!(
        remote
            .write_message_from_sequencer(MessageIndex::new(6), test_message(6))
            .await,
        Err(ConsensusError::OutOfOrderWrite {
            expected: Some(MessageIndex::new(3)),
            got: MessageIndex::new(6),
        })
    );
}

#[tokio::test]
async fn test_unreachable_node_is_transient() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let remote = RpcConsensusRemote::try_new(&rpc_config(addr)).unwrap();

    let err = remote
        .message_count(ProgressCounter::Safe)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
}
