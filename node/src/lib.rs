//! ratewindow node
//!
//! Wires the rate cache to Postgres and the ECB source and drives it from the
//! command line.

pub mod commands;
pub mod config;

pub use commands::{Cli, Command};
pub use config::NodeConfig;
