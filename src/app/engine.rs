//! The combination engine.
//!
//! Recomputes a combo's output from its inputs and writes it, one writer at a
//! time. Reads that fail because an input is momentarily locked abort the
//! whole run and re-trigger the combo after a fixed delay; every other I/O
//! failure goes to the [`Notifier`].

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::app::composer;
use crate::app::error::CombineError;
use crate::app::models::{FileCombo, InputFile, LockScope, Settings};
use crate::app::notifier::{Notifier, Severity};
use crate::app::scheduler::RetryScheduler;
use crate::app::storage::{is_transient, DiskIo, FileIo};

/// What a single combine run ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOutcome {
    Written,
    WriteFailed,
    RetryScheduled,
    ShutDown,
}

enum WriteLocks {
    Global(Mutex<()>),
    PerOutput {
        locks: HashMap<PathBuf, Mutex<()>>,
        fallback: Mutex<()>,
    },
}

impl WriteLocks {
    fn new(scope: LockScope, combos: &[Arc<FileCombo>]) -> Self {
        match scope {
            LockScope::Global => WriteLocks::Global(Mutex::new(())),
            LockScope::PerOutput => WriteLocks::PerOutput {
                locks: combos
                    .iter()
                    .map(|c| (lock_key(&c.output_file), Mutex::new(())))
                    .collect(),
                fallback: Mutex::new(()),
            },
        }
    }

    fn lock_for(&self, output: &Path) -> MutexGuard<'_, ()> {
        match self {
            WriteLocks::Global(lock) => lock.lock(),
            WriteLocks::PerOutput { locks, fallback } => {
                locks.get(&lock_key(output)).unwrap_or(fallback).lock()
            }
        }
    }
}

/// Spelling-independent identity of an output path: canonical parent
/// directory plus file name. Falls back to the path as given when the
/// parent does not exist.
fn lock_key(path: &Path) -> PathBuf {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    match parent.canonicalize() {
        Ok(dir) => dir.join(name),
        Err(_) => path.to_path_buf(),
    }
}

struct Inner<F> {
    combos: Vec<Arc<FileCombo>>,
    io: F,
    locks: WriteLocks,
    notifier: Arc<dyn Notifier>,
    scheduler: RetryScheduler,
    retry_delay: Duration,
    shut_down: AtomicBool,
}

/// Cloneable handle to the engine; safe to trigger from any thread.
pub struct Engine<F: FileIo = DiskIo> {
    inner: Arc<Inner<F>>,
}

impl<F: FileIo> Clone for Engine<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Engine<DiskIo> {
    pub fn with_disk(settings: Settings, notifier: Arc<dyn Notifier>) -> io::Result<Self> {
        Self::new(settings, DiskIo, notifier)
    }
}

impl<F: FileIo> Engine<F> {
    pub fn new(settings: Settings, io: F, notifier: Arc<dyn Notifier>) -> io::Result<Self> {
        let (engine, combos) = settings.into_parts();
        let locks = WriteLocks::new(engine.lock_scope, &combos);

        Ok(Self {
            inner: Arc::new(Inner {
                combos,
                io,
                locks,
                notifier,
                scheduler: RetryScheduler::start()?,
                retry_delay: engine.retry_delay(),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn combos(&self) -> &[Arc<FileCombo>] {
        &self.inner.combos
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.inner.notifier.as_ref()
    }

    /// Recomputes and rewrites `combo`'s output. Blocks until done.
    pub fn trigger(&self, combo: &Arc<FileCombo>) {
        self.combine(combo);
    }

    /// Triggers every configured combo once, in configuration order.
    pub fn trigger_all(&self) {
        for combo in &self.inner.combos {
            self.trigger(combo);
        }
    }

    /// Same as [`Engine::trigger`], reporting how the run ended.
    pub fn combine(&self, combo: &Arc<FileCombo>) -> CombineOutcome {
        self.inner.combine(combo)
    }

    /// Combines `combo` on the calling thread, waiting out busy inputs
    /// instead of handing the retry to the timer.
    ///
    /// Used when nothing will be around to run a scheduled retry (`--once`).
    pub fn combine_blocking(&self, combo: &Arc<FileCombo>) -> CombineOutcome {
        loop {
            match self.inner.combine_once(combo) {
                Attempt::Done(outcome) => return outcome,
                Attempt::Busy => {
                    log::debug!(
                        "[combine] {} busy, trying again in {:?}",
                        combo.output_file.display(),
                        self.inner.retry_delay
                    );
                    thread::sleep(self.inner.retry_delay);
                }
            }
        }
    }

    /// [`Engine::combine_blocking`] for every combo, in configuration order.
    pub fn combine_all_blocking(&self) -> Vec<CombineOutcome> {
        self.inner
            .combos
            .iter()
            .map(|combo| self.combine_blocking(combo))
            .collect()
    }

    /// Stops the retry timer. Triggers arriving afterwards do nothing.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.scheduler.shutdown();
    }
}

enum Attempt {
    Done(CombineOutcome),
    /// An input was momentarily unreadable; nothing was written.
    Busy,
}

impl<F: FileIo> Inner<F> {
    fn combine(self: &Arc<Self>, combo: &Arc<FileCombo>) -> CombineOutcome {
        match self.combine_once(combo) {
            Attempt::Done(outcome) => outcome,
            Attempt::Busy => {
                log::debug!(
                    "[combine] {} deferred, input busy; retrying in {:?}",
                    combo.output_file.display(),
                    self.retry_delay
                );
                self.schedule_retry(combo);
                CombineOutcome::RetryScheduled
            }
        }
    }

    fn combine_once(&self, combo: &FileCombo) -> Attempt {
        if self.shut_down.load(Ordering::SeqCst) {
            return Attempt::Done(CombineOutcome::ShutDown);
        }

        let _guard = self.locks.lock_for(&combo.output_file);
        log::debug!("[combine] {}", combo.output_file.display());

        let text = match composer::compose(combo, |input| self.read_input(input)) {
            Ok(text) => text,
            Err(err) => {
                log::debug!("[combine] {}: {err}", combo.output_file.display());
                return Attempt::Busy;
            }
        };

        let outcome = match self.io.write(&combo.output_file, &text) {
            Ok(()) => {
                log::info!(
                    "[combine] wrote {} ({} bytes)",
                    combo.output_file.display(),
                    text.len()
                );
                CombineOutcome::Written
            }
            Err(source) => {
                self.notifier.notify(
                    Severity::Error,
                    &CombineError::Write {
                        path: combo.output_file.clone(),
                        source,
                    },
                );
                CombineOutcome::WriteFailed
            }
        };
        Attempt::Done(outcome)
    }

    /// Reads one input. Only transient failures are returned as errors;
    /// anything else is reported and the input is treated as empty.
    fn read_input(&self, input: &InputFile) -> io::Result<Option<String>> {
        match self.io.read(&input.path) {
            Ok(content) => Ok(content),
            Err(err) if is_transient(&err) => Err(err),
            Err(source) => {
                self.notifier.notify(
                    Severity::Error,
                    &CombineError::Read {
                        path: input.path.clone(),
                        source,
                    },
                );
                Ok(None)
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, combo: &Arc<FileCombo>) {
        let engine = Arc::downgrade(self);
        let output = combo.output_file.clone();
        let combo = Arc::clone(combo);

        let scheduled = self.scheduler.schedule(self.retry_delay, move || {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            log::debug!("[retry] {}", combo.output_file.display());
            engine.combine(&combo);
        });

        if !scheduled {
            log::debug!(
                "[retry] engine stopped, not retrying {}",
                output.display()
            );
        }
    }
}
