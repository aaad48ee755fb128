//! Consensus client used by an execution node.
//!
//! [`ConsensusClient`] bundles the batch fetcher, the sync tracker and the sequencer
//! coordinator behind the three consumer traits. [`ConsensusClientBuilder`] wires them over
//! one remote, usually an [`RpcConsensusRemote`].

mod builder;
mod client;
mod config;
mod rpc;

pub use builder::ConsensusClientBuilder;
pub use client::ConsensusClient;
pub use config::{ConfigError, ConsensusClientConfig, RpcConfig};
pub use consensus_client_common::{
    Batch, BatchFetcher, BatchNumber, ConsensusError, ConsensusInfo, ConsensusPromise,
    ConsensusSequencer, ErrorKind, FullConsensusClient, L1BlockNumber, MessageCounts,
    MessageIndex, MessageWithMetadata, SyncProgressSnapshot,
};
pub use consensus_client_sequencer::SequencerStatus;
pub use rpc::RpcConsensusRemote;
