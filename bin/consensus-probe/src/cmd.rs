//! Subcommand execution. Every command returns a JSON serializable report.

use std::time::Duration;

use consensus_client::{
    BatchNumber, ConsensusError, FullConsensusClient, MessageIndex, SyncProgressSnapshot,
};
use serde::Serialize;
use tracing::debug;

use crate::args::Command;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusReport {
    finalized_msg_count: MessageIndex,
    safe_msg_count: MessageIndex,
    sync_target_message_count: MessageIndex,
    sync_progress: SyncProgressSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchReport {
    batch: BatchNumber,
    size_bytes: usize,
    l1_block: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageReport {
    message: MessageIndex,
    batch: BatchNumber,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LeaseReport {
    chosen_sequencer: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum Report {
    Status(StatusReport),
    Batch(BatchReport),
    Message(MessageReport),
    Lease(LeaseReport),
}

pub(crate) async fn run_command(
    client: &dyn FullConsensusClient,
    cmd: Command,
    wait: Duration,
) -> Result<Report, ConsensusError> {
    debug!(?cmd, ?wait, "running probe command");
    let report = match cmd {
        Command::Status(_) => Report::Status(status(client, wait).await?),
        Command::Batch(args) => {
            Report::Batch(batch(client, BatchNumber::new(args.batch_num), wait).await?)
        }
        Command::Message(args) => {
            let message = MessageIndex::new(args.index);
            let batch = client
                .find_l1_batch_for_message(message)
                .wait_timeout(wait)
                .await?;
            Report::Message(MessageReport { message, batch })
        }
        Command::Lease(_) => Report::Lease(lease(client, wait).await?),
    };
    Ok(report)
}

async fn status(
    client: &dyn FullConsensusClient,
    wait: Duration,
) -> Result<StatusReport, ConsensusError> {
    let finalized_msg_count = client.get_finalized_msg_count().wait_timeout(wait).await?;
    let safe_msg_count = client.get_safe_msg_count().wait_timeout(wait).await?;
    let sync_target_message_count = client
        .sync_target_message_count()
        .wait_timeout(wait)
        .await?;
    let sync_progress = client.sync_progress_map().wait_timeout(wait).await?;

    Ok(StatusReport {
        finalized_msg_count,
        safe_msg_count,
        sync_target_message_count,
        sync_progress,
    })
}

async fn batch(
    client: &dyn FullConsensusClient,
    batch: BatchNumber,
    wait: Duration,
) -> Result<BatchReport, ConsensusError> {
    let data = client.fetch_batch(batch).wait_timeout(wait).await?;
    let l1_block = client.get_batch_l1_block(batch).wait_timeout(wait).await?;
    Ok(BatchReport {
        batch,
        size_bytes: data.len(),
        l1_block: l1_block.get(),
    })
}

async fn lease(
    client: &dyn FullConsensusClient,
    wait: Duration,
) -> Result<LeaseReport, ConsensusError> {
    match client.expect_chosen_sequencer().wait_timeout(wait).await {
        Ok(()) => Ok(LeaseReport {
            chosen_sequencer: true,
        }),
        Err(ConsensusError::NotChosenSequencer) => Ok(LeaseReport {
            chosen_sequencer: false,
        }),
        Err(err) => Err(err),
    }
}
