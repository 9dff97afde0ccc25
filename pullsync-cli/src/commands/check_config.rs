//! `pullsync check-config` — validate a settings file without starting anything.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::Value;

use pullsync_core::config::{DEFAULT_CLIENT_CONFIG, DEFAULT_SERVER_CONFIG};
use pullsync_core::{ClientConfig, ServerConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Role {
    Server,
    Client,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Which process the settings file is for.
    #[arg(long, value_enum)]
    pub role: Role,

    /// Settings file to read; defaults to the role's usual file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ServerReport {
    config: String,
    listen: String,
    known_client_identities: Vec<String>,
    rsync_pull_script_path: String,
    send_mail_script_path: Option<String>,
    log_file_path: String,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct ClientReport {
    config: String,
    server: String,
    identity: String,
    directory_to_watch: String,
    timeout_length_ms: u64,
    watch_settle_ms: u64,
    log_file_path: String,
    warnings: Vec<String>,
}

impl CheckConfigArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.clone().unwrap_or_else(|| {
            PathBuf::from(match self.role {
                Role::Server => DEFAULT_SERVER_CONFIG,
                Role::Client => DEFAULT_CLIENT_CONFIG,
            })
        });

        let report = match self.role {
            Role::Server => {
                let config = ServerConfig::load(&path).with_context(|| {
                    format!("invalid server config {}", path.display())
                })?;
                serde_json::to_value(server_report(&path, &config))
            }
            Role::Client => {
                let config = ClientConfig::load(&path).with_context(|| {
                    format!("invalid client config {}", path.display())
                })?;
                serde_json::to_value(client_report(&path, &config))
            }
        }
        .context("failed to render config report")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render config JSON")?
            );
        } else {
            print_text(&report);
        }
        Ok(())
    }
}

fn server_report(path: &Path, config: &ServerConfig) -> ServerReport {
    let mut warnings = Vec::new();
    if !config.pull_script.is_file() {
        warnings.push(format!(
            "pull script {} does not exist",
            config.pull_script.display()
        ));
    }
    if let Some(mail) = config.notify_script.as_ref().filter(|p| !p.is_file()) {
        warnings.push(format!("mail script {} does not exist", mail.display()));
    }
    if config.notify_script.is_none() {
        warnings.push("no sendMailScriptPath; failures will not be mailed".to_string());
    }

    ServerReport {
        config: path.display().to_string(),
        listen: config.bind_addr().to_string(),
        known_client_identities: config.known_identities.iter().map(str::to_string).collect(),
        rsync_pull_script_path: config.pull_script.display().to_string(),
        send_mail_script_path: config
            .notify_script
            .as_ref()
            .map(|p| p.display().to_string()),
        log_file_path: config.log_file.display().to_string(),
        warnings,
    }
}

fn client_report(path: &Path, config: &ClientConfig) -> ClientReport {
    let mut warnings = Vec::new();
    if !config.watch_dir.is_dir() {
        warnings.push(format!(
            "directory to watch {} does not exist",
            config.watch_dir.display()
        ));
    }

    ClientReport {
        config: path.display().to_string(),
        server: format!("{}:{}", config.server_host, config.port),
        identity: config.identity.to_string(),
        directory_to_watch: config.watch_dir.display().to_string(),
        timeout_length_ms: millis(config.retry_delay),
        watch_settle_ms: millis(config.settle_window),
        log_file_path: config.log_file.display().to_string(),
        warnings,
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn print_text(report: &Value) {
    let Value::Object(fields) = report else {
        return;
    };
    for (key, value) in fields {
        match value {
            Value::Array(items) if key == "warnings" => {
                for item in items {
                    println!("warning: {}", item.as_str().unwrap_or_default());
                }
            }
            Value::Array(items) => {
                let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                println!("{key}: {}", joined.join(", "));
            }
            Value::String(s) => println!("{key}: {s}"),
            Value::Null => println!("{key}: (not set)"),
            other => println!("{key}: {other}"),
        }
    }
}
