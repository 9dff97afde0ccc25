//! `pullsync server` — accept clients and run pulls until stopped.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::oneshot;

use pullsync_core::config::DEFAULT_SERVER_CONFIG;
use pullsync_core::{logging, ServerConfig};
use pullsync_server::serve_until;

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Settings file to read.
    #[arg(long, short, default_value = DEFAULT_SERVER_CONFIG)]
    pub config: PathBuf,

    /// Ignore the console; stop on ctrl-c only.
    #[arg(long)]
    pub no_console: bool,
}

impl ServerArgs {
    pub fn run(self) -> Result<()> {
        let config = ServerConfig::load(&self.config).with_context(|| {
            format!("failed to load server config {}", self.config.display())
        })?;
        logging::install(&config.log_file);

        let quit = (!self.no_console).then(console_quit);
        let runtime = super::runtime()?;
        runtime
            .block_on(serve_until(&config, stop_requested(quit)))
            .context("backup server exited with error")?;
        Ok(())
    }
}

async fn stop_requested(quit: Option<oneshot::Receiver<()>>) {
    let Some(mut quit) = quit else {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("interrupt received");
        return;
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
        Ok(()) = &mut quit => tracing::info!("stop requested from the console"),
    }
}

/// Resolves when the operator types `q` and enter. If stdin closes first the
/// sender is dropped and only ctrl-c can stop the server.
fn console_quit() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        println!("Press 'q' and then enter to stop the server.");
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim() == "q" => {
                    let _ = tx.send(());
                    return;
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    });
    rx
}
