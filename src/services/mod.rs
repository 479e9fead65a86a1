//! External collaborators: audio generation, stem separation, speaker pairing
//! and artifact storage.
//!
//! Each collaborator is a trait so the command layer can be driven by the
//! shipped helper-command implementations or by anything else. None of them
//! touch the mixer or transport.

pub mod generate;
pub mod runner;
pub mod speaker;
pub mod stems;
pub mod storage;

use thiserror::Error;

use crate::config::ServiceSettings;

pub use generate::{CommandGenerator, GenerationRequest, GenerationResponse, GenerativeAudioService};
pub use speaker::{CommandPairing, ConnectionState, SpeakerLink, SpeakerPairingService};
pub use stems::{CommandStemSeparator, StemRequest, StemSeparationService};
pub use storage::{artifact_filename, FileStorage, Payload, StorageSink};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} failed: {reason}")]
    Failed { service: &'static str, reason: String },

    #[error("{service} timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse { service: &'static str, reason: String },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// The shipped implementations, built from settings
pub struct ServiceHub {
    pub generator: CommandGenerator,
    pub stems: CommandStemSeparator,
    pub speaker: SpeakerLink<CommandPairing>,
    pub storage: FileStorage,
}

impl ServiceHub {
    pub fn from_settings(settings: &ServiceSettings) -> Self {
        let timeout = std::time::Duration::from_secs(settings.timeout_secs.max(1));
        Self {
            generator: CommandGenerator::new(
                settings.generate_command.clone(),
                timeout,
                settings.output_dir.clone(),
            ),
            stems: CommandStemSeparator::new(settings.stems_command.clone(), timeout),
            speaker: SpeakerLink::new(CommandPairing::new(settings.pair_command.clone(), timeout)),
            storage: FileStorage::new(settings.output_dir.clone()),
        }
    }
}
