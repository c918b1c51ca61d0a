//! Test doubles shared by the engine and watcher tests.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::app::error::CombineError;
use crate::app::notifier::{Notifier, Severity};
use crate::app::storage::FileIo;

/// Polls `done` for up to five seconds.
pub fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

/// Gives background retries (50ms in tests) time to fire.
pub fn settle() {
    thread::sleep(Duration::from_millis(200));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin(PathBuf),
    End(PathBuf),
}

#[derive(Default)]
struct State {
    files: HashMap<PathBuf, String>,
    read_failures: HashMap<PathBuf, (ErrorKind, usize)>,
    write_failures: Vec<PathBuf>,
    reads: HashMap<PathBuf, usize>,
    writes: Vec<(PathBuf, String)>,
    log: Vec<Call>,
}

/// In-memory filesystem with failure injection and a write-order log.
#[derive(Default)]
pub struct MemoryIo {
    state: Mutex<State>,
    write_delay: Duration,
}

impl MemoryIo {
    pub fn with_write_delay(write_delay: Duration) -> Self {
        Self {
            write_delay,
            ..Default::default()
        }
    }

    pub fn put(&self, path: impl Into<PathBuf>, contents: &str) {
        self.state
            .lock()
            .files
            .insert(path.into(), contents.to_string());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state.lock().files.get(path.as_ref()).cloned()
    }

    /// Makes the next `times` reads of `path` fail with `kind`.
    pub fn fail_reads(&self, path: impl Into<PathBuf>, kind: ErrorKind, times: usize) {
        self.state
            .lock()
            .read_failures
            .insert(path.into(), (kind, times));
    }

    pub fn fail_writes(&self, path: impl Into<PathBuf>) {
        self.state.lock().write_failures.push(path.into());
    }

    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.state
            .lock()
            .reads
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.state.lock().writes.clone()
    }

    pub fn write_log(&self) -> Vec<Call> {
        self.state.lock().log.clone()
    }
}

impl FileIo for MemoryIo {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        let mut state = self.state.lock();
        *state.reads.entry(path.to_path_buf()).or_default() += 1;

        if let Some((kind, remaining)) = state.read_failures.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(io::Error::from(*kind));
            }
        }
        Ok(state.files.get(path).cloned())
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        {
            let mut state = self.state.lock();
            if state.write_failures.iter().any(|p| p == path) {
                return Err(io::Error::from(ErrorKind::PermissionDenied));
            }
            state.log.push(Call::Begin(path.to_path_buf()));
        }

        // Leave a window for a concurrent writer to sneak in.
        thread::sleep(self.write_delay);

        let mut state = self.state.lock();
        state.files.insert(path.to_path_buf(), contents.to_string());
        state.writes.push((path.to_path_buf(), contents.to_string()));
        state.log.push(Call::End(path.to_path_buf()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub severity: Severity,
    pub message: String,
    pub is_read: bool,
    pub is_write: bool,
    pub is_watch: bool,
}

#[derive(Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<Report>>,
}

impl RecordingNotifier {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, error: &CombineError) {
        self.reports.lock().push(Report {
            severity,
            message: error.to_string(),
            is_read: matches!(error, CombineError::Read { .. }),
            is_write: matches!(error, CombineError::Write { .. }),
            is_watch: matches!(error, CombineError::Watch { .. }),
        });
    }
}
