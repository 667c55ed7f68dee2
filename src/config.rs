//! Settings file model and loader.
//!
//! Settings live in the platform config directory:
//!   macOS:   ~/Library/Application Support/clipshot/config.json
//!   Linux:   ~/.config/clipshot/config.json
//!   Windows: %APPDATA%/clipshot/config.json
//!
//! Missing keys take their defaults. The file is only read here; a recorded
//! chord is printed as a fragment for the user to paste in.
//!
//! While running, edits to `shortcut` and `debounce_interval_ms` are picked
//! up by [`watch`]. The other settings are read once at startup.

use crate::hotkey::{
    ChordConfig, ChordError, HotkeyDetector, KeyChord, KeyIdentity, Modifier, Modifiers,
};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// How often [`watch`] checks the settings file for changes.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(2);

/// Full path of the settings file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipshot")
        .join("config.json")
}

fn default_save_folder() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::document_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ClipboardImages")
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_open_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_save_folder")]
    pub save_folder: PathBuf,
    #[serde(default)]
    pub shortcut: ShortcutConfig,
    #[serde(default = "default_debounce_ms")]
    pub debounce_interval_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_open_attempts")]
    pub open_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            save_folder: default_save_folder(),
            shortcut: ShortcutConfig::default(),
            debounce_interval_ms: default_debounce_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            open_attempts: default_open_attempts(),
        }
    }
}

impl Settings {
    /// The detector configuration these settings describe.
    pub fn chord_config(&self) -> Result<ChordConfig, ChordError> {
        Ok(ChordConfig::new(
            self.shortcut.to_chord()?,
            Duration::from_millis(self.debounce_interval_ms),
        ))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// The hotkey as stored on disk: `{"modifiers": ["ctrl"], "key": "v"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutConfig {
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub key: String,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self::from_chord(&KeyChord::default())
    }
}

impl ShortcutConfig {
    pub fn from_chord(chord: &KeyChord) -> Self {
        Self {
            modifiers: chord.modifier_names(),
            key: chord.key().config_string(),
        }
    }

    /// Validates the stored names into a chord. A malformed shortcut never
    /// reaches the detector.
    pub fn to_chord(&self) -> Result<KeyChord, ChordError> {
        let mut modifiers = Modifiers::NONE;
        for name in &self.modifiers {
            let m = Modifier::parse(name).ok_or_else(|| ChordError::UnknownModifier(name.clone()))?;
            modifiers = modifiers.with(m);
        }
        let key = KeyIdentity::parse(&self.key).ok_or(ChordError::MissingKey)?;
        KeyChord::new(modifiers, key)
    }

    /// `{"shortcut": {...}}`, ready to paste into the settings file.
    pub fn to_json_fragment(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&serde_json::json!({ "shortcut": self }))?)
    }
}

/// Reads settings from `path`. Missing keys take defaults; a missing or
/// malformed file is an error.
pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let settings = serde_json::from_str(&text)?;
    Ok(settings)
}

/// Reads the settings file, falling back to defaults when it is missing or
/// unreadable.
pub fn load() -> Settings {
    let path = config_path();
    match load_from(&path) {
        Ok(settings) => {
            log::info!("[CONFIG] Loaded settings from {}", path.display());
            settings
        }
        Err(ConfigError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            log::info!("[CONFIG] No settings at {}, using defaults", path.display());
            Settings::default()
        }
        Err(e) => {
            log::warn!("[CONFIG] Ignoring {} ({}), using defaults", path.display(), e);
            Settings::default()
        }
    }
}

/// Re-reads `path` and hands its chord and debounce to `detector`.
///
/// Nothing is applied unless the whole file is valid, so a bad edit leaves
/// the active chord in place. Returns true if the configuration changed.
pub fn reload_from(path: &Path, detector: &HotkeyDetector) -> Result<bool, ConfigError> {
    let next = load_from(path)?.chord_config()?;
    if *detector.config() == next {
        return Ok(false);
    }
    detector.apply(next);
    Ok(true)
}

/// Tracks the settings file's modification time between polls.
#[derive(Debug)]
pub struct SettingsWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl SettingsWatcher {
    /// Starts from the file as it is now; only later edits trigger a reload.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = modified_time(&path);
        Self { path, last_modified }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads into `detector` if the file changed since the last poll.
    /// Returns true if a reload was attempted.
    pub fn poll(&mut self, detector: &HotkeyDetector) -> bool {
        let modified = modified_time(&self.path);
        if modified == self.last_modified {
            return false;
        }
        self.last_modified = modified;
        if modified.is_none() {
            log::info!("[CONFIG] {} removed, keeping current shortcut", self.path.display());
            return false;
        }

        match reload_from(&self.path, detector) {
            Ok(true) => log::info!("[CONFIG] Reloaded shortcut from {}", self.path.display()),
            Ok(false) => log::debug!("[CONFIG] {} changed, shortcut unchanged", self.path.display()),
            Err(e) => log::warn!(
                "[CONFIG] Ignoring edit to {} ({}), keeping current shortcut",
                self.path.display(),
                e
            ),
        }
        true
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Polls the settings file every `interval` for the life of the runtime.
pub async fn watch(path: PathBuf, detector: Arc<HotkeyDetector>, interval: Duration) {
    let mut watcher = SettingsWatcher::new(path);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    log::debug!("[CONFIG] Watching {}", watcher.path().display());
    loop {
        ticker.tick().await;
        watcher.poll(&detector);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid shortcut: {0}")]
    Shortcut(#[from] ChordError),
}
