//! Artifact storage sink and the artifact naming contract

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// What gets written for a saved artifact
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    /// Stand-in content for artifacts that have no rendered data yet
    Placeholder,
}

impl Payload {
    fn into_bytes(self, filename: &str) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Placeholder => format!("mixdeck placeholder for {}\n", filename).into_bytes(),
        }
    }
}

/// Fire-and-forget save. Receipt is never confirmed to the caller.
pub trait StorageSink {
    fn save(&self, filename: &str, content: Payload);
}

/// `<slug>-<YYYYMMDD-HHMMSS>.<ext>`; the slug is the label lowercased with
/// every run of non-alphanumerics collapsed to one hyphen.
pub fn artifact_filename(label: &str, extension: &str, at: DateTime<Local>) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "untitled" } else { slug };

    let extension = extension.trim_start_matches('.');
    format!("{}-{}.{}", slug, at.format("%Y%m%d-%H%M%S"), extension)
}

/// Writes artifacts into one directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Destination for `filename`, or `None` if it is not a bare file name
    pub fn path_for(&self, filename: &str) -> Option<PathBuf> {
        let name = Path::new(filename).file_name()?;
        if name != filename {
            return None;
        }
        Some(self.dir.join(name))
    }

    fn write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)
    }
}

impl StorageSink for FileStorage {
    fn save(&self, filename: &str, content: Payload) {
        let Some(path) = self.path_for(filename) else {
            log::warn!("Storage: refusing to save {:?}, not a plain file name", filename);
            return;
        };
        let bytes = content.into_bytes(filename);

        let task = move || match Self::write(&path, &bytes) {
            Ok(()) => log::info!("Storage: saved {} ({} bytes)", path.display(), bytes.len()),
            Err(e) => log::warn!("Storage: failed to save {}: {}", path.display(), e),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(task);
            }
            Err(_) => {
                std::thread::spawn(task);
            }
        }
    }
}
