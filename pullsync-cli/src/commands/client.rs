//! `pullsync client` — keep a session with the server and request pulls on change.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use pullsync_client::run_client;
use pullsync_core::config::DEFAULT_CLIENT_CONFIG;
use pullsync_core::{logging, shutdown, ClientConfig};

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Settings file to read.
    #[arg(long, short, default_value = DEFAULT_CLIENT_CONFIG)]
    pub config: PathBuf,
}

impl ClientArgs {
    pub fn run(self) -> Result<()> {
        let config = ClientConfig::load(&self.config).with_context(|| {
            format!("failed to load client config {}", self.config.display())
        })?;
        logging::install(&config.log_file);

        let runtime = super::runtime()?;
        runtime.block_on(async move {
            let (trigger, signal) = shutdown::channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received; stopping client");
                    trigger.trigger();
                }
            });
            run_client(config, signal).await;
        });
        Ok(())
    }
}
