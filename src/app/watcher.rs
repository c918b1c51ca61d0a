//! Binds filesystem notifications for every input path to engine triggers.
//!
//! Each input's parent directory is watched non-recursively (once per
//! directory); events are matched back to inputs by full path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::app::engine::Engine;
use crate::app::error::CombineError;
use crate::app::models::FileCombo;
use crate::app::notifier::Severity;
use crate::app::storage::FileIo;

type Bindings = HashMap<PathBuf, Vec<Arc<FileCombo>>>;

/// Live watches for all combo inputs. Dropping it tears them down.
pub struct ComboWatcher {
    _watcher: RecommendedWatcher,
    bound_inputs: usize,
}

impl ComboWatcher {
    /// Watches every input of every combo in `engine`.
    ///
    /// Inputs whose directory cannot be watched are reported through the
    /// engine's notifier and skipped. Fails only when the platform watcher
    /// itself cannot be created.
    pub fn bind<F: FileIo>(engine: &Engine<F>) -> Result<Self, CombineError> {
        let mut requested: Bindings = HashMap::new();
        for combo in engine.combos() {
            for input in &combo.input_files {
                let users = requested.entry(input.path.clone()).or_default();
                if !users.iter().any(|c| Arc::ptr_eq(c, combo)) {
                    users.push(Arc::clone(combo));
                }
            }
        }

        // Resolve every input against its canonical directory so event paths
        // compare equal regardless of how the input was spelled.
        let mut bindings: Bindings = HashMap::new();
        let mut dirs: Vec<PathBuf> = Vec::new();
        for (path, combos) in requested {
            match watch_target(&path) {
                Ok((dir, resolved)) => {
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                    let users = bindings.entry(resolved).or_default();
                    for combo in combos {
                        if !users.iter().any(|c| Arc::ptr_eq(c, &combo)) {
                            users.push(combo);
                        }
                    }
                }
                Err(reason) => engine.notifier().notify(
                    Severity::Warning,
                    &CombineError::Watch { path, reason },
                ),
            }
        }

        let bindings = Arc::new(bindings);
        let handler_engine = engine.clone();
        let handler_bindings = Arc::clone(&bindings);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => dispatch(&handler_engine, &handler_bindings, event),
                Err(e) => log::error!("[watcher] file watch error: {e}"),
            }
        })
        .map_err(|e| {
            let error = CombineError::Watch {
                path: PathBuf::from("."),
                reason: format!("failed to initialize watcher: {e}"),
            };
            engine.notifier().notify(Severity::Error, &error);
            error
        })?;

        let mut watched_dirs = 0;
        let mut bound_inputs = 0;
        for dir in dirs {
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    bound_inputs += bindings
                        .keys()
                        .filter(|p| p.parent() == Some(dir.as_path()))
                        .count();
                    log::debug!("[watcher] watching {}", dir.display());
                    watched_dirs += 1;
                }
                Err(e) => {
                    for input in bindings.keys().filter(|p| p.parent() == Some(dir.as_path())) {
                        engine.notifier().notify(
                            Severity::Warning,
                            &CombineError::Watch {
                                path: input.clone(),
                                reason: e.to_string(),
                            },
                        );
                    }
                }
            }
        }

        log::info!(
            "[watcher] monitoring {bound_inputs} input(s) in {watched_dirs} dir(s)"
        );

        Ok(Self {
            _watcher: watcher,
            bound_inputs,
        })
    }

    /// Number of distinct input paths with a live watch.
    pub fn bound_inputs(&self) -> usize {
        self.bound_inputs
    }
}

/// The directory to watch for `path` and the path events will report.
fn watch_target(path: &Path) -> Result<(PathBuf, PathBuf), String> {
    let file_name = path
        .file_name()
        .ok_or_else(|| "path has no file name".to_string())?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let dir = parent
        .canonicalize()
        .map_err(|e| format!("directory {}: {e}", parent.display()))?;
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }

    let resolved = dir.join(file_name);
    Ok((dir, resolved))
}

fn dispatch<F: FileIo>(engine: &Engine<F>, bindings: &Bindings, event: Event) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }

    let mut due: Vec<&Arc<FileCombo>> = Vec::new();
    for path in &event.paths {
        let Some(combos) = lookup(bindings, path) else {
            continue;
        };
        log::debug!("[watcher] {:?} {}", event.kind, path.display());
        for combo in combos {
            if !due.iter().any(|c| Arc::ptr_eq(c, combo)) {
                due.push(combo);
            }
        }
    }

    for combo in due {
        engine.trigger(combo);
    }
}

fn lookup<'a>(bindings: &'a Bindings, path: &Path) -> Option<&'a Vec<Arc<FileCombo>>> {
    if let Some(combos) = bindings.get(path) {
        return Some(combos);
    }

    // Some backends report paths through symlinks or un-normalized.
    let dir = path.parent()?.canonicalize().ok()?;
    bindings.get(&dir.join(path.file_name()?))
}
