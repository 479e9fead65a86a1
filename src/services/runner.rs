//! Runs a configured helper command with a timeout

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    service: &'static str,
    /// Program followed by its fixed arguments; empty when unconfigured
    command: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(service: &'static str, command: Vec<String>, timeout: Duration) -> Self {
        Self {
            service,
            command,
            timeout,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn is_configured(&self) -> bool {
        self.command.first().map_or(false, |p| !p.trim().is_empty())
    }

    /// Run the command with `extra` arguments appended. A non-zero exit is a
    /// failure carrying stderr; running past the timeout kills the child.
    pub async fn run(&self, extra: &[String]) -> ServiceResult<CommandOutput> {
        let (program, fixed) = match self.command.split_first() {
            Some((program, fixed)) if !program.trim().is_empty() => (program, fixed),
            _ => return Err(ServiceError::NotConfigured(self.service)),
        };

        log::debug!("{}: running {} ({} args)", self.service, program, fixed.len() + extra.len());

        let child = Command::new(program)
            .args(fixed)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServiceError::Failed {
                service: self.service,
                reason: format!("failed to spawn {}: {}", program, e),
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!("{}: timed out after {:?}", self.service, self.timeout);
                return Err(ServiceError::Timeout {
                    service: self.service,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let reason = if stderr.trim().is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(ServiceError::Failed {
                service: self.service,
                reason,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
