//! Generative-audio service: prompt and duration in, rendered file reference out

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use super::runner::CommandRunner;
use super::storage::artifact_filename;
use super::{ServiceError, ServiceResult};

const SERVICE: &str = "generation service";

/// Longest clip a request may ask for
pub const MAX_DURATION_SECONDS: u32 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub duration_seconds: u32,
}

/// Opaque handle to a rendered artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub location: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub log_text: String,
    pub artifact_ref: ArtifactRef,
}

pub trait GenerativeAudioService {
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = ServiceResult<GenerationResponse>> + Send;
}

impl GenerationRequest {
    pub fn validate(&self) -> ServiceResult<()> {
        let invalid = |reason: String| ServiceError::Failed {
            service: SERVICE,
            reason,
        };
        if self.prompt.trim().is_empty() {
            return Err(invalid("prompt is empty".to_string()));
        }
        if !(1..=MAX_DURATION_SECONDS).contains(&self.duration_seconds) {
            return Err(invalid(format!(
                "duration {}s is outside 1..={}",
                self.duration_seconds, MAX_DURATION_SECONDS
            )));
        }
        Ok(())
    }
}

/// Runs `<command> --prompt P --duration N --output PATH`; stdout becomes the log
/// text and PATH must exist afterwards.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    runner: CommandRunner,
    output_dir: PathBuf,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, timeout: Duration, output_dir: PathBuf) -> Self {
        Self {
            runner: CommandRunner::new(SERVICE, command, timeout),
            output_dir,
        }
    }
}

impl GenerativeAudioService for CommandGenerator {
    async fn generate(&self, request: GenerationRequest) -> ServiceResult<GenerationResponse> {
        request.validate()?;
        if !self.runner.is_configured() {
            return Err(ServiceError::NotConfigured(SERVICE));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let location = self
            .output_dir
            .join(artifact_filename(&request.prompt, "wav", chrono::Local::now()));

        log::info!(
            "Generating {}s clip into {}",
            request.duration_seconds,
            location.display()
        );

        let output = self
            .runner
            .run(&[
                "--prompt".to_string(),
                request.prompt.clone(),
                "--duration".to_string(),
                request.duration_seconds.to_string(),
                "--output".to_string(),
                location.to_string_lossy().to_string(),
            ])
            .await?;

        if !tokio::fs::try_exists(&location).await.unwrap_or(false) {
            return Err(ServiceError::InvalidResponse {
                service: SERVICE,
                reason: format!("no artifact written at {}", location.display()),
            });
        }

        Ok(GenerationResponse {
            log_text: output.stdout.trim_end().to_string(),
            artifact_ref: ArtifactRef {
                id: uuid::Uuid::new_v4().to_string(),
                location,
            },
        })
    }
}
