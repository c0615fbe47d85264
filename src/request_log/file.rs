//! Persistent request log files.
//!
//! Entries are appended as JSON lines to `requests-<timestamp>-<seq>.jsonl`
//! files inside an owner-only directory. A dedicated writer thread owns the
//! active file so callers never wait on disk I/O; lines that arrive while
//! its bounded queue is full are dropped and counted. Every failure here is a
//! [`LogFileError`] that the caller turns into a warning; none of them ever
//! reaches the code issuing API requests.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::LoggerConfig;

pub const LOG_FILE_PREFIX: &str = "requests-";
pub const LOG_FILE_EXTENSION: &str = "jsonl";

/// Lines waiting for the writer thread before new ones are dropped
pub const FILE_QUEUE_CAPACITY: usize = 1024;

/// A dropped-line warning is repeated once per this many drops
const DROP_WARN_INTERVAL: u64 = 1000;

// == Errors ==
#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("cannot prepare log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write log file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot start log writer thread: {0}")]
    Spawn(#[source] io::Error),
}

// == Retention ==
/// Which log files survive a cleanup pass.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Files last modified longer ago than this are deleted
    pub max_age: Duration,
    /// Only this many of the newest files are kept
    pub max_files: usize,
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, max_files: usize) -> Self {
        Self {
            max_age,
            max_files: max_files.max(1),
        }
    }

    pub fn from_config(config: &LoggerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.max_log_age_days * 24 * 60 * 60),
            config.max_log_files,
        )
    }
}

/// Creates the log directory if needed and restricts it to its owner.
pub fn prepare_log_directory(dir: &Path) -> Result<(), LogFileError> {
    let directory_error = |source| LogFileError::Directory {
        path: dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(directory_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(directory_error)?;
    }

    Ok(())
}

/// Deletes log files that are too old or beyond the newest `max_files`.
///
/// `active` is never deleted. Individual removal failures are logged and
/// skipped; only an unreadable directory is reported as an error. Returns the
/// number of files removed.
pub fn cleanup_old_files(
    dir: &Path,
    policy: &RetentionPolicy,
    active: Option<&Path>,
) -> Result<usize, LogFileError> {
    let entries = fs::read_dir(dir).map_err(|source| LogFileError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_log_file(path) && Some(path.as_path()) != active)
        .filter_map(|path| {
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            Some((modified, path))
        })
        .collect();

    // Newest first; names embed a timestamp and sequence, so they break ties
    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let keep = policy.max_files.saturating_sub(usize::from(active.is_some()));
    let now = SystemTime::now();
    let mut removed = 0;

    for (index, (modified, path)) in files.iter().enumerate() {
        let too_old = now
            .duration_since(*modified)
            .is_ok_and(|age| age > policy.max_age);

        if too_old || index >= keep {
            match fs::remove_file(path) {
                Ok(()) => {
                    removed += 1;
                    debug!(path = %path.display(), too_old, "Removed request log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove request log file"),
            }
        }
    }

    Ok(removed)
}

fn is_log_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.starts_with(LOG_FILE_PREFIX)
        && path.extension().and_then(|ext| ext.to_str()) == Some(LOG_FILE_EXTENSION)
}

// == Log File Writer ==
struct ActiveFile {
    path: PathBuf,
    file: File,
    written: u64,
}

/// Appends lines to the active file, rotating it once it grows past
/// `max_file_size` and applying retention after every rotation.
pub struct LogFileWriter {
    dir: PathBuf,
    policy: RetentionPolicy,
    max_file_size: u64,
    sequence: u32,
    current: Option<ActiveFile>,
}

impl LogFileWriter {
    pub fn new(dir: impl Into<PathBuf>, policy: RetentionPolicy, max_file_size: u64) -> Self {
        Self {
            dir: dir.into(),
            policy,
            max_file_size: max_file_size.max(1),
            sequence: 0,
            current: None,
        }
    }

    /// Appends one line; a trailing newline is added.
    pub fn append(&mut self, line: &str) -> Result<(), LogFileError> {
        let needs_rotation = self
            .current
            .as_ref()
            .map_or(true, |active| active.written >= self.max_file_size);
        if needs_rotation {
            self.rotate()?;
        }

        if let Some(active) = self.current.as_mut() {
            let write_error = |source| LogFileError::Write {
                path: active.path.clone(),
                source,
            };
            active.file.write_all(line.as_bytes()).map_err(write_error)?;
            active.file.write_all(b"\n").map_err(write_error)?;
            active.written += line.len() as u64 + 1;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LogFileError> {
        match self.current.as_mut() {
            Some(active) => active.file.flush().map_err(|source| LogFileError::Write {
                path: active.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Path of the file currently being written, if one is open.
    pub fn active_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|active| active.path.as_path())
    }

    fn rotate(&mut self) -> Result<(), LogFileError> {
        let (path, file) = self.open_next()?;
        info!(path = %path.display(), "Opened request log file");

        match cleanup_old_files(&self.dir, &self.policy, Some(&path)) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Request log retention removed old files"),
            Err(e) => warn!(error = %e, "Request log retention failed"),
        }

        self.current = Some(ActiveFile {
            path,
            file,
            written: 0,
        });
        Ok(())
    }

    fn open_next(&mut self) -> Result<(PathBuf, File), LogFileError> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S-%3f");

        loop {
            self.sequence += 1;
            let path = self.dir.join(format!(
                "{}{}-{:04}.{}",
                LOG_FILE_PREFIX, stamp, self.sequence, LOG_FILE_EXTENSION
            ));

            let mut options = OpenOptions::new();
            options.append(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }

            match options.open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(LogFileError::Open { path, source }),
            }
        }
    }
}

// == File Sink ==
enum WriterCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Handle feeding the background writer thread.
///
/// Dropping the sink closes the channel and lets the thread finish.
pub(crate) struct FileSink {
    tx: mpsc::Sender<WriterCommand>,
    dropped: AtomicU64,
}

impl FileSink {
    /// Prepares the directory, applies startup retention and spawns the writer.
    pub fn start(config: &LoggerConfig) -> Result<Self, LogFileError> {
        let dir = config.log_directory.clone();
        prepare_log_directory(&dir)?;

        let policy = RetentionPolicy::from_config(config);
        match cleanup_old_files(&dir, &policy, None) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed expired request log files on startup"),
            Err(e) => warn!(error = %e, "Startup request log retention failed"),
        }

        let writer = LogFileWriter::new(dir, policy, config.max_file_size);
        let (tx, rx) = mpsc::channel(FILE_QUEUE_CAPACITY);

        thread::Builder::new()
            .name("request-log-writer".to_string())
            .spawn(move || run_writer(writer, rx))
            .map_err(LogFileError::Spawn)?;

        Ok(Self::from_sender(tx))
    }

    fn from_sender(tx: mpsc::Sender<WriterCommand>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Queues a line without waiting; a full queue drops it.
    pub fn write_line(&self, line: String) {
        match self.tx.try_send(WriterCommand::Line(line)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % DROP_WARN_INTERVAL == 1 {
                    warn!(dropped, "Request log writer is behind, dropping file lines");
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Request log writer has stopped, line dropped");
            }
        }
    }

    /// Number of lines dropped because the queue was full.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolves once every line queued before this call has been handled.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

fn run_writer(mut writer: LogFileWriter, mut rx: mpsc::Receiver<WriterCommand>) {
    let mut healthy = true;

    while let Some(command) = rx.blocking_recv() {
        match command {
            WriterCommand::Line(line) => {
                if !healthy {
                    continue;
                }
                if let Err(e) = writer.append(&line) {
                    healthy = false;
                    warn!(error = %e, "Request log file write failed, keeping entries in memory only");
                }
            }
            WriterCommand::Flush(ack) => {
                if let Err(e) = writer.flush() {
                    debug!(error = %e, "Request log flush failed");
                }
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn touch(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "{}\n").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        path
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_log_file(path))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_cleanup_removes_files_older_than_max_age() {
        let dir = TempDir::new().unwrap();
        let old = touch(dir.path(), "requests-old.jsonl", DAY * 8);
        let recent = touch(dir.path(), "requests-recent.jsonl", DAY * 2);

        let removed = cleanup_old_files(dir.path(), &RetentionPolicy::new(DAY * 7, 10), None).unwrap();

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[test]
    fn test_cleanup_keeps_only_newest_files() {
        let dir = TempDir::new().unwrap();
        for i in 0..5u32 {
            touch(dir.path(), &format!("requests-{}.jsonl", i), Duration::from_secs(60 * (10 - u64::from(i))));
        }

        let removed = cleanup_old_files(dir.path(), &RetentionPolicy::new(DAY * 7, 3), None).unwrap();

        assert_eq!(removed, 2);
        let names: Vec<String> = log_files(dir.path())
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["requests-2.jsonl", "requests-3.jsonl", "requests-4.jsonl"]);
    }

    #[test]
    fn test_cleanup_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let unrelated = touch(dir.path(), "notes.txt", DAY * 30);

        cleanup_old_files(dir.path(), &RetentionPolicy::new(DAY, 1), None).unwrap();

        assert!(unrelated.exists());
    }

    #[test]
    fn test_cleanup_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let result = cleanup_old_files(&missing, &RetentionPolicy::new(DAY, 1), None);
        assert!(matches!(result, Err(LogFileError::Directory { .. })));
    }

    #[test]
    fn test_writer_rotates_and_applies_retention() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogFileWriter::new(dir.path(), RetentionPolicy::new(DAY, 2), 100);
        let line = "x".repeat(59);

        // Two 60-byte lines fill a file past 100 bytes, so five lines need three files
        for _ in 0..5 {
            writer.append(&line).unwrap();
        }
        writer.flush().unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 2, "retention keeps the newest two files");
        assert_eq!(writer.active_path(), Some(files[1].as_path()));
        assert_eq!(fs::read_to_string(&files[1]).unwrap(), format!("{}\n", line));
        assert_eq!(fs::read_to_string(&files[0]).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_file_names_carry_timestamp_and_sequence() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogFileWriter::new(dir.path(), RetentionPolicy::new(DAY, 10), 1);

        writer.append("{}").unwrap();
        writer.append("{}").unwrap();

        let names: Vec<String> = log_files(dir.path())
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        for (name, sequence) in names.iter().zip(["0001", "0002"]) {
            // requests-YYYYMMDD-HHMMSS-mmm-NNNN.jsonl
            let stem = name
                .strip_prefix(LOG_FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(".jsonl"))
                .unwrap();
            let parts: Vec<&str> = stem.split('-').collect();
            assert_eq!(parts.iter().map(|part| part.len()).collect::<Vec<_>>(), vec![8, 6, 3, 4]);
            assert!(parts.iter().all(|part| part.chars().all(|c| c.is_ascii_digit())));
            assert_eq!(parts[3], sequence);
        }
    }

    #[test]
    fn test_full_queue_drops_lines_without_blocking() {
        let (tx, mut rx) = mpsc::channel(2);
        let sink = FileSink::from_sender(tx);

        for i in 0..5 {
            sink.write_line(format!("line {}", i));
        }

        assert_eq!(sink.dropped_lines(), 3);
        let queued: Vec<String> = std::iter::from_fn(|| match rx.try_recv() {
            Ok(WriterCommand::Line(line)) => Some(line),
            _ => None,
        })
        .collect();
        assert_eq!(queued, vec!["line 0", "line 1"]);
    }

    #[test]
    fn test_stopped_writer_is_not_counted_as_drop() {
        let (tx, rx) = mpsc::channel(2);
        drop(rx);
        let sink = FileSink::from_sender(tx);

        sink.write_line("late".to_string());

        assert_eq!(sink.dropped_lines(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_and_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let dir = root.path().join("logs");
        prepare_log_directory(&dir).unwrap();

        let mut writer = LogFileWriter::new(&dir, RetentionPolicy::new(DAY, 10), 1024);
        writer.append("{}").unwrap();

        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        let file_mode = fs::metadata(writer.active_path().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }
}
