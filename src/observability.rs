//! Logging setup and in-process counters

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install the global subscriber: stdout plus, when configured, a size-rotated
/// log file. `RUST_LOG` wins over the configured level; `verbose` bumps the
/// configured level to debug.
pub fn init_logging(config: &LoggingConfig, verbose: u8) -> Result<(), AnyError> {
    let level = if verbose > 0 { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = RotatingFile::open(path, config.max_file_bytes, config.backup_count)?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Append-only log file rotated by size: when a write would push it past
/// `max_bytes`, `<path>.N-1` moves to `<path>.N` down to `<path>` moving to
/// `<path>.1`, and the oldest backup is dropped.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backup_count: usize,
    state: Mutex<ActiveFile>,
}

#[derive(Debug)]
struct ActiveFile {
    file: File,
    size: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backup_count: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            max_bytes,
            backup_count,
            state: Mutex::new(ActiveFile { file, size }),
        })
    }

    fn backup(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&self, active: &mut ActiveFile) -> io::Result<()> {
        active.file.flush()?;

        if self.backup_count == 0 {
            active.file = File::create(&self.path)?;
        } else {
            for index in (1..self.backup_count).rev() {
                let from = self.backup(index);
                if from.exists() {
                    std::fs::rename(&from, self.backup(index + 1))?;
                }
            }
            std::fs::rename(&self.path, self.backup(1))?;
            active.file = append(&self.path)?;
        }

        active.size = 0;
        Ok(())
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for &RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut active = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.max_bytes > 0 && active.size > 0 && active.size + buf.len() as u64 > self.max_bytes {
            self.rotate(&mut active)?;
        }

        let written = active.file.write(buf)?;
        active.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .file
            .flush()
    }
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    ingests_accepted: AtomicU64,
    ingests_failed: AtomicU64,
    workers_started: AtomicU64,
    worker_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest_accepted(&self) {
        self.ingests_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "ingests_accepted", "Metric incremented");
    }

    pub fn ingest_failed(&self) {
        self.ingests_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "ingests_failed", "Metric incremented");
    }

    pub fn worker_started(&self) {
        self.workers_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "workers_started", "Metric incremented");
    }

    pub fn worker_error(&self) {
        self.worker_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "worker_errors", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingests_accepted: self.ingests_accepted.load(Ordering::Relaxed),
            ingests_failed: self.ingests_failed.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            worker_errors: self.worker_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ingests_accepted: u64,
    pub ingests_failed: u64,
    pub workers_started: u64,
    pub worker_errors: u64,
}
