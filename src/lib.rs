pub mod audio;
pub mod commands;
pub mod config;
pub mod error;
pub mod services;

pub use config::EngineSettings;
pub use error::{EngineError, Result};
