use std::{io, result::Result as StdResult};

use consensus_client::{ConfigError, ConsensusError};
use consensus_common::logging::LoggingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("init runtime: {0}")]
    Runtime(#[from] io::Error),

    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("consensus: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("output: {0}")]
    Output(#[from] serde_json::Error),
}

pub(crate) type Result<T> = StdResult<T, AppError>;
