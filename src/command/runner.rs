use super::{CommandOutput, CommandRunner};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Runs a fixed binary with per-call arguments as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    bin: String,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    #[instrument(skip(self), fields(bin = %self.bin))]
    async fn run(&self, args: &[String]) -> Option<CommandOutput> {
        let mut command = Command::new(&self.bin);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if !output.status.success() {
                    debug!(
                        status = ?output.status.code(),
                        stderr = %stderr.trim(),
                        "Command exited with non-zero status"
                    );
                }
                Some(CommandOutput { stdout, stderr })
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to run command");
                None
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f64(), "Command timed out");
                None
            }
        }
    }
}
