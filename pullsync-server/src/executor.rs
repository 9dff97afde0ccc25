//! Runs the pull script for a client and maps its exit code.

use std::path::PathBuf;
use std::sync::Arc;

use pullsync_core::outcome::NO_EXIT_CODE;
use pullsync_core::{Identity, PullOutcome, ServerConfig};

use crate::runner::{CommandRunner, ShellCommandRunner};

pub struct PullExecutor {
    pull_script: PathBuf,
    notify_script: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl PullExecutor {
    pub fn new(
        pull_script: PathBuf,
        notify_script: Option<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            pull_script,
            notify_script,
            runner,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.pull_script.clone(),
            config.notify_script.clone(),
            Arc::new(ShellCommandRunner),
        )
    }

    /// Run `<pull script> <identity>` and classify the result.
    ///
    /// Never fails: a script that cannot be started is reported as
    /// [`PullOutcome::UnknownError`]. Exit code 1 additionally sends a
    /// best-effort notification.
    pub async fn run_pull(&self, identity: &Identity) -> PullOutcome {
        let argv = vec![
            self.pull_script.to_string_lossy().into_owned(),
            identity.as_str().to_string(),
        ];

        let (outcome, output) = match self.runner.execute(&argv).await {
            Ok(out) => (
                PullOutcome::from_exit_code(out.exit_code.unwrap_or(NO_EXIT_CODE)),
                out.output,
            ),
            Err(err) => {
                tracing::error!(error = %err, "pull script could not be run");
                (PullOutcome::UnknownError(NO_EXIT_CODE), String::new())
            }
        };

        if outcome.is_success() {
            tracing::info!(identity = %identity, "pull succeeded");
        } else {
            tracing::warn!(identity = %identity, outcome = ?outcome, "pull failed");
        }

        if outcome.requires_notification() {
            self.notify(identity, &output).await;
        }
        outcome
    }

    async fn notify(&self, identity: &Identity, output: &str) {
        let Some(script) = &self.notify_script else {
            tracing::warn!("no sendMailScriptPath configured; failure notification skipped");
            return;
        };

        let argv = vec![
            script.to_string_lossy().into_owned(),
            format!("pullsync: pull failed for {identity}"),
            output.to_string(),
        ];
        match self.runner.execute(&argv).await {
            Ok(out) if out.exit_code == Some(0) => {
                tracing::info!(identity = %identity, "failure notification sent");
            }
            Ok(out) => {
                tracing::warn!(
                    exit_code = ?out.exit_code,
                    output = %out.output.trim_end(),
                    "failure notification command failed",
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "failure notification could not be sent");
            }
        }
    }
}
