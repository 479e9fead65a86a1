use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// Get the log file path (in the user's local data directory)
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mixdeck")
        .join("logs")
        .join("mixdeck.log")
}

/// Copies every record to stderr and, when open, to the log file
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.as_mut() {
            // Best effort; stderr still gets the record
            let _ = file.write_all(buf);
        }
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        io::stderr().flush()
    }
}

fn open_log_file() -> Option<File> {
    let log_path = get_log_path();

    // Create logs directory if it doesn't exist
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()
}

/// Initialize logging. `RUST_LOG` overrides `default_filter`; with `to_file`
/// records are also appended to [`get_log_path`].
pub fn init_logging(default_filter: &str, to_file: bool) {
    let file = if to_file { open_log_file() } else { None };
    let file_enabled = file.is_some();

    let result = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .format(|buf, record| {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(
            buf,
            "[{}] [{}] [{}] {}",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        )
    })
    .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
    .try_init();

    if result.is_ok() {
        log::info!("mixdeck started");
        if to_file && !file_enabled {
            log::warn!("Could not open log file {}", get_log_path().display());
        }
    }
}

/// Get the log file path as a string
pub fn get_log_file_path() -> Result<String, String> {
    Ok(get_log_path().to_string_lossy().to_string())
}

/// Get the log file contents
pub fn read_log_file() -> Result<String, String> {
    let log_path = get_log_path();

    if !log_path.exists() {
        return Ok("No log file yet.".to_string());
    }

    fs::read_to_string(&log_path).map_err(|e| format!("Failed to read log file: {}", e))
}

/// Clear the log file
pub fn clear_log_file() -> Result<(), String> {
    let log_path = get_log_path();

    if log_path.exists() {
        fs::write(&log_path, "").map_err(|e| format!("Failed to clear log file: {}", e))?;
    }

    log::info!("Log file cleared");
    Ok(())
}

/// Get log file size in bytes
pub fn get_log_file_size() -> Result<u64, String> {
    let log_path = get_log_path();

    if !log_path.exists() {
        return Ok(0);
    }

    fs::metadata(&log_path)
        .map(|m| m.len())
        .map_err(|e| format!("Failed to get log file size: {}", e))
}
