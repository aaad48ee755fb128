//! Consensus probe
//!
//! Operator tool that connects to a consensus node the same way an execution node does and
//! prints what it answers as JSON.

mod args;
mod cmd;
mod errors;

use std::time::Duration;

use args::{Args, EnvArgs};
use cmd::run_command;
use consensus_client::{ConsensusClientBuilder, ConsensusClientConfig};
use consensus_common::logging::{self, LoggingInitConfig};
use errors::Result;
use tokio::runtime::{self, Handle};
use tracing::info;

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");

        return Err(e);
    }

    Ok(())
}

fn main_inner(args: Args) -> Result<()> {
    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("consensus-probe-rt")
        .build()?;
    let handle = runtime.handle();

    // Init the logging before we do anything else.
    init_logging(handle)?;

    let config = get_config(&args)?;
    info!(url = %config.rpc.url, "connecting to consensus node");

    let client = ConsensusClientBuilder::new(config)
        .with_runtime(handle.clone())
        .connect()?;
    let wait = Duration::from_millis(args.wait_ms);
    let outcome = runtime.block_on(run_command(&client, args.cmd, wait));
    client.shutdown();
    logging::finalize();

    let report = outcome?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn get_config(args: &Args) -> Result<ConsensusClientConfig> {
    let mut config = match &args.config {
        Some(path) => ConsensusClientConfig::load(path)?,
        None => ConsensusClientConfig::default(),
    };
    if let Some(url) = &args.rpc_url {
        config.rpc.url = url.clone();
    }
    Ok(config)
}

/// Sets up logging on the runtime, which the OTLP exporter needs to be running on.
fn init_logging(rt: &Handle) -> Result<()> {
    let env_args = EnvArgs::from_env();
    let _g = rt.enter();
    logging::init_logging_from_config(LoggingInitConfig {
        service_base_name: "consensus-probe",
        service_label: env_args.service_label.as_deref(),
        otlp_url: env_args.otlp_url.as_deref(),
        log_dir: env_args.log_dir,
        // Stdout carries the report.
        log_to_stderr: true,
        ..Default::default()
    })?;
    Ok(())
}
