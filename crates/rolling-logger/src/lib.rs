//! Rolling Logger
//!
//! File logger that keeps a bounded ring of log files:
//! `<app>.log` is the live file, `<app>.1.log` the previous one, and so on
//! up to `max_files`. When the live file grows past `max_bytes` the ring
//! shifts and the oldest file is dropped.
//!
//! `log` records from library crates are bridged into `tracing`, so both
//! macros end up in the same files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to prepare log directory {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("a global logger is already installed: {0}")]
    AlreadyInstalled(String),
    #[error("logger not initialized")]
    NotInitialized,
}

/// Logger settings
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub app_name: String,
    /// Size at which the live file is rotated
    pub max_bytes: u64,
    /// Files kept, including the live one
    pub max_files: usize,
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Mirror output to stderr
    pub stderr: bool,
}

impl LoggerConfig {
    pub fn new(log_dir: impl Into<PathBuf>, app_name: &str) -> Self {
        Self {
            log_dir: log_dir.into(),
            app_name: app_name.to_string(),
            max_bytes: 5 * 1024 * 1024,
            max_files: 5,
            default_filter: "info".to_string(),
            stderr: false,
        }
    }
}

struct RollingState {
    dir: PathBuf,
    app_name: String,
    max_bytes: u64,
    max_files: usize,
    file: Option<File>,
    written: u64,
}

impl RollingState {
    fn path(&self, index: usize) -> PathBuf {
        if index == 0 {
            self.dir.join(format!("{}.log", self.app_name))
        } else {
            self.dir.join(format!("{}.{}.log", self.app_name, index))
        }
    }

    fn open(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let path = self.path(0);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.written = file.metadata()?.len();
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        let last = self.max_files.saturating_sub(1);
        if last == 0 {
            // Single file: truncate in place
            File::create(self.path(0))?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.path(last);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (0..last).rev() {
            let from = self.path(index);
            if from.exists() {
                fs::rename(&from, self.path(index + 1))?;
            }
        }
        self.written = 0;
        Ok(())
    }
}

/// Writer that rotates files by size. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RollingFileWriter {
    state: Arc<Mutex<RollingState>>,
}

impl RollingFileWriter {
    pub fn new(dir: &Path, app_name: &str, max_bytes: u64, max_files: usize) -> Result<Self, LoggerError> {
        fs::create_dir_all(dir).map_err(|e| LoggerError::Io(dir.to_path_buf(), e))?;
        Ok(Self {
            state: Arc::new(Mutex::new(RollingState {
                dir: dir.to_path_buf(),
                app_name: app_name.to_string(),
                max_bytes: max_bytes.max(1),
                max_files: max_files.max(1),
                file: None,
                written: 0,
            })),
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RollingState) -> io::Result<R>) -> io::Result<R> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer poisoned"))?;
        f(&mut state)
    }
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_state(|state| {
            state.open()?;
            if state.written > 0 && state.written + buf.len() as u64 > state.max_bytes {
                state.rotate()?;
            }
            let n = state.open()?.write(buf)?;
            state.written += n as u64;
            Ok(n)
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_state(|state| match state.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        })
    }
}

impl<'a> MakeWriter<'a> for RollingFileWriter {
    type Writer = RollingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

static APP_NAME: OnceLock<String> = OnceLock::new();

/// Install the logger with default rotation settings
pub fn init_logger(log_dir: PathBuf, app_name: &str) -> Result<(), LoggerError> {
    init_logger_with(LoggerConfig::new(log_dir, app_name))
}

/// Install the logger as the global `tracing` subscriber and `log` sink
pub fn init_logger_with(config: LoggerConfig) -> Result<(), LoggerError> {
    let writer = RollingFileWriter::new(
        &config.log_dir,
        &config.app_name,
        config.max_bytes,
        config.max_files,
    )?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);

    let stderr_layer = config.stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LoggerError::AlreadyInstalled(e.to_string()))?;

    let _ = APP_NAME.set(config.app_name.clone());
    tracing::info!(
        "{} logging to {} (started {})",
        config.app_name,
        config.log_dir.display(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

fn app_name() -> Result<&'static str, LoggerError> {
    APP_NAME.get().map(String::as_str).ok_or(LoggerError::NotInitialized)
}

/// Log an info message under the app's name
pub fn info(msg: &str) -> Result<(), LoggerError> {
    let app = app_name()?;
    log::info!(target: "app", "[{}] {}", app, msg);
    Ok(())
}

/// Log an error message under the app's name
pub fn error(msg: &str) -> Result<(), LoggerError> {
    let app = app_name()?;
    log::error!(target: "app", "[{}] {}", app, msg);
    Ok(())
}
