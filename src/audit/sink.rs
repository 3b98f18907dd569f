//! Destinations for audit lines

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 50;

/// Append-only destination for serialized audit entries
pub trait AuditSink: Send + Sync {
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps lines in memory; clones share the same buffer
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Lines parsed back into JSON, skipping anything malformed
    pub fn entries(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl AuditSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

struct OpenFile {
    file: File,
    size: u64,
}

/// Size-bounded file sink
///
/// When the active file would exceed `max_bytes` it is renamed to `<name>.1`,
/// older generations shift up by one, and anything past `max_files` is removed.
pub struct RotatingFileSink {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    current: Mutex<Option<OpenFile>>,
}

impl RotatingFileSink {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_limits(path, DEFAULT_MAX_BYTES, DEFAULT_MAX_FILES)
    }

    pub fn with_limits(path: impl Into<PathBuf>, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let sink = Self {
            path,
            max_bytes: max_bytes.max(1),
            max_files,
            current: Mutex::new(None),
        };
        let opened = sink.open()?;
        if let Ok(mut current) = sink.current.lock() {
            *current = Some(opened);
        }
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<OpenFile> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let size = file.metadata()?.len();
        Ok(OpenFile { file, size })
    }

    fn generation(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&self) -> io::Result<()> {
        if self.max_files == 0 {
            return fs::remove_file(&self.path).or_else(ignore_missing);
        }

        fs::remove_file(self.generation(self.max_files)).or_else(ignore_missing)?;
        for n in (1..self.max_files).rev() {
            let from = self.generation(n);
            if from.exists() {
                fs::rename(&from, self.generation(n + 1))?;
            }
        }
        fs::rename(&self.path, self.generation(1))
    }
}

fn ignore_missing(err: io::Error) -> io::Result<()> {
    match err.kind() {
        io::ErrorKind::NotFound => Ok(()),
        _ => Err(err),
    }
}

impl AuditSink for RotatingFileSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| io::Error::other("audit file sink poisoned"))?;

        let incoming = line.len() as u64 + 1;
        let needs_rotation = current
            .as_ref()
            .is_some_and(|open| open.size > 0 && open.size + incoming > self.max_bytes);

        if needs_rotation {
            if let Some(mut open) = current.take() {
                open.file.flush()?;
            }
            self.rotate()?;
        }

        if current.is_none() {
            *current = Some(self.open()?);
        }

        let Some(open) = current.as_mut() else {
            return Err(io::Error::other("audit file unavailable"));
        };
        open.file.write_all(line.as_bytes())?;
        open.file.write_all(b"\n")?;
        open.size += incoming;
        Ok(())
    }
}
