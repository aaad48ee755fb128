use async_trait::async_trait;
use consensus_client_common::{
    Batch, BatchNumber, BatchSource, ConsensusError, L1BlockNumber, MessageIndex,
    MessageWithMetadata, ProgressCounter, SequencerSink, SyncProgressSnapshot, SyncSource,
};
use consensus_client_rpc_api::{from_error_object, ConsensusRpcClient};
use jsonrpsee::{
    core::ClientError,
    http_client::{HttpClient, HttpClientBuilder},
};
use tracing::{debug, instrument};

use crate::RpcConfig;

/// Remote consensus node reached over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcConsensusRemote {
    client: HttpClient,
}

impl RpcConsensusRemote {
    /// Creates the HTTP client. No request is made until the first call.
    pub fn try_new(config: &RpcConfig) -> Result<Self, ConsensusError> {
        let client = HttpClientBuilder::default()
            .request_timeout(config.request_timeout())
            .build(&config.url)
            .map_err(from_client_error)?;
        debug!(url = %config.url, "created consensus rpc client");
        Ok(Self { client })
    }
}

/// Maps a client failure into the error taxonomy.
///
/// Error responses carry the consensus node's own error, everything else means the request
/// did not get a definitive answer.
fn from_client_error(err: ClientError) -> ConsensusError {
    match err {
        ClientError::Call(obj) => from_error_object(&obj),
        ClientError::RequestTimeout => ConsensusError::Timeout,
        other => ConsensusError::transport(other.to_string()),
    }
}

#[async_trait]
impl BatchSource for RpcConsensusRemote {
    #[instrument(skip(self), fields(component = "consensus_rpc"))]
    async fn fetch_batch(&self, batch_num: BatchNumber) -> Result<Batch, ConsensusError> {
        let bytes = self
            .client
            .fetch_batch(batch_num.get())
            .await
            .map_err(from_client_error)?;
        Ok(bytes.into())
    }

    async fn find_l1_batch_for_message(
        &self,
        message: MessageIndex,
    ) -> Result<BatchNumber, ConsensusError> {
        self.client
            .find_l1_batch_for_message(message.get())
            .await
            .map(BatchNumber::new)
            .map_err(from_client_error)
    }

    async fn get_batch_l1_block(
        &self,
        batch_num: BatchNumber,
    ) -> Result<L1BlockNumber, ConsensusError> {
        self.client
            .get_batch_l1_block(batch_num.get())
            .await
            .map(L1BlockNumber::new)
            .map_err(from_client_error)
    }
}

#[async_trait]
impl SyncSource for RpcConsensusRemote {
    async fn sync_progress_map(&self) -> Result<SyncProgressSnapshot, ConsensusError> {
        self.client
            .sync_progress_map()
            .await
            .map_err(from_client_error)
    }

    async fn message_count(
        &self,
        counter: ProgressCounter,
    ) -> Result<MessageIndex, ConsensusError> {
        let count = match counter {
            ProgressCounter::Finalized => self.client.get_finalized_msg_count().await,
            ProgressCounter::Safe => self.client.get_safe_msg_count().await,
            ProgressCounter::SyncTarget => self.client.sync_target_message_count().await,
        };
        count.map(MessageIndex::new).map_err(from_client_error)
    }
}

#[async_trait]
impl SequencerSink for RpcConsensusRemote {
    #[instrument(skip(self, msg), fields(component = "consensus_rpc"))]
    async fn write_message_from_sequencer(
        &self,
        pos: MessageIndex,
        msg: MessageWithMetadata,
    ) -> Result<(), ConsensusError> {
        self.client
            .write_message_from_sequencer(pos.get(), msg.into())
            .await
            .map_err(from_client_error)
    }

    async fn expect_chosen_sequencer(&self) -> Result<(), ConsensusError> {
        self.client
            .expect_chosen_sequencer()
            .await
            .map_err(from_client_error)
    }
}
