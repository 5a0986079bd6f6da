//! Buffered, append-only log file writer.
//!
//! Writes one line per call to `./log/DD-MM-YYYY.log`, creating the
//! directory and file with explicit (correct, octal) permission bits. This
//! is a best-effort sink: the reactor never blocks on it and a write
//! failure is reported via `tracing`, not propagated to callers.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

const LOG_DIR_MODE: u32 = 0o755;
const LOG_FILE_MODE: u32 = 0o644;

/// Append-only writer for the protocol-level activity log, rotated daily by
/// file name.
pub struct LogSink {
    dir: PathBuf,
    current_date: String,
    file: Option<fs::File>,
}

impl LogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current_date: String::new(),
            file: None,
        }
    }

    /// Appends a single formatted line. Failures are logged via `tracing`
    /// and otherwise swallowed; the log sink never affects protocol state.
    pub fn emit(&mut self, message: &str) {
        if let Err(e) = self.try_emit(message) {
            tracing::warn!(error = %e, "log sink write failed");
        }
    }

    fn try_emit(&mut self, message: &str) -> io::Result<()> {
        let now = Local::now();
        let date = now.format("%d-%m-%Y").to_string();
        if date != self.current_date || self.file.is_none() {
            self.file = Some(self.open_for(&date)?);
            self.current_date = date;
        }
        let line = format!("[{}] {}\n", now.format("%d/%m/%Y %H:%M:%S"), message);
        self.file.as_mut().unwrap().write_all(line.as_bytes())
    }

    fn open_for(&self, date: &str) -> io::Result<fs::File> {
        ensure_dir(&self.dir)?;
        let path = self.dir.join(format!("{date}.log"));
        OpenOptions::new()
            .create(true)
            .append(true)
            .mode(LOG_FILE_MODE)
            .open(path)
    }
}

fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(LOG_DIR_MODE))
}
