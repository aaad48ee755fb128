use std::{env, path::PathBuf};

use argh::FromArgs;

/// Logging options taken from the environment.
#[derive(Debug, Clone)]
pub(crate) struct EnvArgs {
    /// OpenTelemetry OTLP endpoint URL
    pub(crate) otlp_url: Option<String>,
    /// Service label to include in service name
    pub(crate) service_label: Option<String>,
    /// Directory for rolling log files
    pub(crate) log_dir: Option<PathBuf>,
}

impl EnvArgs {
    pub(crate) fn from_env() -> Self {
        Self {
            otlp_url: env::var("CONSENSUS_OTLP_URL").ok(),
            service_label: env::var("CONSENSUS_SVC_LABEL").ok(),
            log_dir: env::var("CONSENSUS_LOG_DIR").ok().map(PathBuf::from),
        }
    }
}

#[derive(Debug, FromArgs)]
#[argh(description = "queries a consensus node through the consensus client")]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to the client TOML config")]
    pub(crate) config: Option<PathBuf>,

    #[argh(
        option,
        short = 'u',
        description = "consensus node JSON-RPC url, overrides the config"
    )]
    pub(crate) rpc_url: Option<String>,

    #[argh(
        option,
        short = 'w',
        default = "10_000",
        description = "how long to wait for each answer in ms"
    )]
    pub(crate) wait_ms: u64,

    #[argh(subcommand)]
    pub(crate) cmd: Command,
}

#[derive(Debug, PartialEq, Eq, FromArgs)]
#[argh(subcommand)]
pub(crate) enum Command {
    Status(StatusArgs),
    Batch(BatchArgs),
    Message(MessageArgs),
    Lease(LeaseArgs),
}

#[derive(Debug, PartialEq, Eq, FromArgs)]
#[argh(
    subcommand,
    name = "status",
    description = "prints the sync progress map and message counts"
)]
pub(crate) struct StatusArgs {}

#[derive(Debug, PartialEq, Eq, FromArgs)]
#[argh(
    subcommand,
    name = "batch",
    description = "fetches a batch and the L1 block it was posted in"
)]
pub(crate) struct BatchArgs {
    #[argh(positional, description = "batch number")]
    pub(crate) batch_num: u64,
}

#[derive(Debug, PartialEq, Eq, FromArgs)]
#[argh(
    subcommand,
    name = "message",
    description = "finds the batch containing a message"
)]
pub(crate) struct MessageArgs {
    #[argh(positional, description = "message index")]
    pub(crate) index: u64,
}

#[derive(Debug, PartialEq, Eq, FromArgs)]
#[argh(
    subcommand,
    name = "lease",
    description = "checks whether this node holds the sequencer lease"
)]
pub(crate) struct LeaseArgs {}
