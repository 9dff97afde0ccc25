pub mod check_config;
pub mod client;
pub mod server;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}
