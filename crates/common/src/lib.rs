//! Ambient utilities shared by the consensus client crates and binaries.

pub mod logging;
pub mod retry;
