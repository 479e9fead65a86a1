//! Command surface for the external services

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::ServiceSettings;
use crate::services::{
    artifact_filename, ConnectionState, GenerationRequest, GenerationResponse,
    GenerativeAudioService, Payload, ServiceHub, StemRequest, StemSeparationService, StorageSink,
};

static SERVICES: Lazy<RwLock<Option<Arc<ServiceHub>>>> = Lazy::new(|| RwLock::new(None));

/// Install the service implementations built from `settings`
pub fn configure_services(settings: &ServiceSettings) {
    *SERVICES.write() = Some(Arc::new(ServiceHub::from_settings(settings)));
}

fn hub() -> Arc<ServiceHub> {
    let mut services = SERVICES.write();
    Arc::clone(
        services.get_or_insert_with(|| Arc::new(ServiceHub::from_settings(&ServiceSettings::default()))),
    )
}

pub async fn generate_audio(prompt: String, duration_seconds: u32) -> Result<GenerationResponse, String> {
    hub()
        .generator
        .generate(GenerationRequest {
            prompt,
            duration_seconds,
        })
        .await
        .map_err(|e| e.to_string())
}

pub async fn separate_stems(file_ref: String) -> Result<Vec<String>, String> {
    hub()
        .stems
        .separate(StemRequest { file_ref })
        .await
        .map_err(|e| e.to_string())
}

pub async fn pair_speaker(device_name: String) -> Result<ConnectionState, String> {
    hub()
        .speaker
        .connect(&device_name)
        .await
        .map_err(|e| e.to_string())
}

pub fn speaker_state() -> ConnectionState {
    hub().speaker.state()
}

/// Save under the artifact naming contract; returns the file name used.
/// The write itself is not awaited.
pub fn save_artifact(label: &str, extension: &str, content: Option<Vec<u8>>) -> Result<String, String> {
    let filename = artifact_filename(label, extension, chrono::Local::now());
    let payload = content.map(Payload::Bytes).unwrap_or(Payload::Placeholder);
    hub().storage.save(&filename, payload);
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_services_fail_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        configure_services(&ServiceSettings {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        assert!(generate_audio("pad".into(), 5)
            .await
            .unwrap_err()
            .contains("not configured"));
        assert!(separate_stems("a.wav".into()).await.is_err());
        assert!(pair_speaker("Den".into()).await.is_err());
        assert_eq!(speaker_state(), ConnectionState::Disconnected);

        let name = save_artifact("Night Drive", "txt", None).unwrap();
        assert!(name.starts_with("night-drive-") && name.ends_with(".txt"));
    }
}
