use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Processing rule for one input file of a combo.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct InputFile {
    pub path: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub replace_search: String,
    pub replace_with: String,
    pub empty_text: String,
    pub skip_if_empty: bool,
}

/// One output file and the ordered inputs it is generated from.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FileCombo {
    pub output_file: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub separator: String,
    pub empty_text: String,
    #[serde(rename = "input")]
    pub input_files: Vec<InputFile>,
}

impl Default for FileCombo {
    fn default() -> Self {
        Self {
            output_file: PathBuf::new(),
            prefix: String::new(),
            suffix: String::new(),
            separator: ", ".to_string(),
            empty_text: String::new(),
            input_files: Vec::new(),
        }
    }
}

/// Which writes exclude each other.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LockScope {
    /// Every combine across all combos runs under one lock.
    #[default]
    Global,
    /// One lock per distinct output path.
    PerOutput,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    pub retry_delay_ms: u64,
    pub lock_scope: LockScope,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry_delay_ms: 3000,
            lock_scope: LockScope::Global,
        }
    }
}

impl EngineSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Represents the fully loaded configuration handed to the engine.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default, rename = "combo")]
    pub combos: Vec<FileCombo>,
}

impl Settings {
    /// Anchors every relative input and output path at `base`.
    pub fn resolve_relative_to(mut self, base: &Path) -> Self {
        let anchor = |path: &mut PathBuf| {
            if path.is_relative() && !path.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        };
        for combo in &mut self.combos {
            anchor(&mut combo.output_file);
            for input in &mut combo.input_files {
                anchor(&mut input.path);
            }
        }
        self
    }

    /// Splits the settings into engine options and shared, read-only combos.
    pub fn into_parts(self) -> (EngineSettings, Vec<Arc<FileCombo>>) {
        let combos = self.combos.into_iter().map(Arc::new).collect();
        (self.engine, combos)
    }
}
