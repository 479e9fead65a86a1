//! Stem-separation service: file reference in, stem names out

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::runner::CommandRunner;
use super::{ServiceError, ServiceResult};

const SERVICE: &str = "stem separation service";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StemRequest {
    pub file_ref: String,
}

pub trait StemSeparationService {
    fn separate(
        &self,
        request: StemRequest,
    ) -> impl Future<Output = ServiceResult<Vec<String>>> + Send;
}

/// Runs `<command> FILE_REF`. Stdout is either a JSON array of names or one
/// name per line.
#[derive(Debug, Clone)]
pub struct CommandStemSeparator {
    runner: CommandRunner,
}

impl CommandStemSeparator {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(SERVICE, command, timeout),
        }
    }
}

fn parse_stems(stdout: &str) -> ServiceResult<Vec<String>> {
    let trimmed = stdout.trim();
    let stems: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| ServiceError::InvalidResponse {
            service: SERVICE,
            reason: e.to_string(),
        })?
    } else {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    };

    if stems.is_empty() {
        return Err(ServiceError::InvalidResponse {
            service: SERVICE,
            reason: "no stems returned".to_string(),
        });
    }
    Ok(stems)
}

impl StemSeparationService for CommandStemSeparator {
    async fn separate(&self, request: StemRequest) -> ServiceResult<Vec<String>> {
        if request.file_ref.trim().is_empty() {
            return Err(ServiceError::Failed {
                service: SERVICE,
                reason: "file reference is empty".to_string(),
            });
        }
        let output = self.runner.run(&[request.file_ref]).await?;
        let stems = parse_stems(&output.stdout)?;
        log::info!("Separated {} stems", stems.len());
        Ok(stems)
    }
}
