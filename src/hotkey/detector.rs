//! Hotkey detection state machine.
//!
//! One detector owns everything the key-event path touches: held modifiers,
//! the active chord configuration, the debounce timestamp and an optional
//! recording session. There are no process-wide globals, so independent
//! detectors can run side by side.

use super::clock::{Clock, MonotonicClock};
use super::key::{KeyChord, KeyCode, ModifierKey};
use super::recorder::Recorder;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::oneshot;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Sentinel for "never fired".
const NEVER: u64 = u64::MAX;

/// Active chord plus its debounce window. Replaced as a whole, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordConfig {
    pub chord: KeyChord,
    pub debounce: Duration,
}

impl ChordConfig {
    pub fn new(chord: KeyChord, debounce: Duration) -> Self {
        Self { chord, debounce }
    }
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self::new(KeyChord::default(), DEFAULT_DEBOUNCE)
    }
}

/// A fired hotkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub chord: KeyChord,
    pub at_ms: u64,
}

struct RecordingSession {
    recorder: Recorder,
    done: oneshot::Sender<KeyChord>,
}

pub struct HotkeyDetector {
    config: RwLock<Arc<ChordConfig>>,
    held: AtomicU8,
    last_trigger_ms: AtomicU64,
    active: AtomicBool,
    recording: Mutex<Option<RecordingSession>>,
    clock: Arc<dyn Clock>,
}

impl HotkeyDetector {
    pub fn new(config: ChordConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: ChordConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            held: AtomicU8::new(0),
            last_trigger_ms: AtomicU64::new(NEVER),
            active: AtomicBool::new(false),
            recording: Mutex::new(None),
            clock,
        }
    }

    /// Starts accepting events with an empty keyboard state.
    pub fn start(&self) {
        self.held.store(0, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        log::info!("[HOTKEY] Detector started, chord {}", self.config().chord);
    }

    /// Stops accepting events and forgets held modifiers.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.held.store(0, Ordering::SeqCst);
        log::info!("[HOTKEY] Detector stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Arc<ChordConfig> {
        match self.config.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swaps in a new chord, keeping the current debounce window.
    ///
    /// The debounce is read under the same write lock that installs the
    /// result, so a concurrent `apply` is never undone.
    pub fn reconfigure(&self, chord: KeyChord) {
        let mut slot = self.config_slot();
        let next = ChordConfig::new(chord, slot.debounce);
        log_config(&next);
        *slot = Arc::new(next);
    }

    /// Replaces the whole configuration in one step. Readers see either the
    /// old value or the new one.
    pub fn apply(&self, config: ChordConfig) {
        log_config(&config);
        *self.config_slot() = Arc::new(config);
    }

    fn config_slot(&self) -> RwLockWriteGuard<'_, Arc<ChordConfig>> {
        self.config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feeds one key event. Returns the trigger if this press fired the chord.
    pub fn handle_key_event(&self, code: &KeyCode, is_press: bool) -> Option<Trigger> {
        if !self.is_active() {
            return None;
        }

        if let KeyCode::Modifier(m) = code {
            self.track_modifier(*m, is_press);
        }

        if self.feed_recording(code, is_press) {
            return None;
        }

        if !is_press {
            return None;
        }

        let identity = match code {
            KeyCode::Key(identity) => identity,
            KeyCode::Modifier(_) => return None,
            KeyCode::Unidentified => {
                log::debug!("[HOTKEY] Ignoring key with no identity");
                return None;
            }
        };

        let config = self.config();
        let held = ModifierKey::fold_held(self.held.load(Ordering::SeqCst));
        if held != config.chord.modifiers() || !config.chord.key().matches(identity) {
            return None;
        }

        let now = self.clock.now_ms();
        if !self.try_fire(now, config.debounce.as_millis() as u64) {
            log::debug!("[HOTKEY] {} suppressed by debounce", config.chord);
            return None;
        }

        log::info!("[HOTKEY] {} fired", config.chord);
        Some(Trigger {
            chord: config.chord.clone(),
            at_ms: now,
        })
    }

    /// Debounce check and timestamp update as a single compare-and-swap, so
    /// two concurrent presses cannot both pass inside one window.
    fn try_fire(&self, now: u64, debounce_ms: u64) -> bool {
        let mut last = self.last_trigger_ms.load(Ordering::Acquire);
        loop {
            if last != NEVER && now.saturating_sub(last) < debounce_ms {
                return false;
            }
            match self.last_trigger_ms.compare_exchange_weak(
                last,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }

    fn track_modifier(&self, key: ModifierKey, is_press: bool) {
        if is_press {
            self.held.fetch_or(key.held_bit(), Ordering::SeqCst);
        } else {
            self.held.fetch_and(!key.held_bit(), Ordering::SeqCst);
        }
    }

    // ── Recording ───────────────────────────────────────────────────

    /// Starts recording a new chord, replacing any recording in progress.
    ///
    /// The receiver resolves with the candidate chord when the recording
    /// completes; commit it with [`reconfigure`](Self::reconfigure). While
    /// recording, no trigger fires.
    pub fn start_recording(&self) -> oneshot::Receiver<KeyChord> {
        let (done, rx) = oneshot::channel();
        *self.recording_slot() = Some(RecordingSession {
            recorder: Recorder::new(),
            done,
        });
        log::info!("[HOTKEY] Recording new chord, press the keys");
        rx
    }

    pub fn cancel_recording(&self) {
        if self.recording_slot().take().is_some() {
            log::info!("[HOTKEY] Recording cancelled");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording_slot().is_some()
    }

    /// Partially recorded chord, e.g. `Ctrl+Shift`.
    pub fn recording_preview(&self) -> Option<String> {
        self.recording_slot()
            .as_ref()
            .map(|session| session.recorder.preview())
    }

    /// Returns true when the event was consumed by an active recording.
    fn feed_recording(&self, code: &KeyCode, is_press: bool) -> bool {
        let mut slot = self.recording_slot();
        let Some(session) = slot.as_mut() else {
            return false;
        };

        if is_press {
            session.recorder.on_press(code);
            return true;
        }

        if let Some(chord) = session.recorder.on_release(code) {
            if let Some(finished) = slot.take() {
                log::info!("[HOTKEY] Recorded {}", chord);
                if finished.done.send(chord).is_err() {
                    log::debug!("[HOTKEY] Recording receiver dropped");
                }
            }
        }
        true
    }

    fn recording_slot(&self) -> MutexGuard<'_, Option<RecordingSession>> {
        self.recording
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn log_config(config: &ChordConfig) {
    log::info!(
        "[HOTKEY] Chord set to {} (debounce {}ms)",
        config.chord,
        config.debounce.as_millis()
    );
}

impl Default for HotkeyDetector {
    fn default() -> Self {
        Self::new(ChordConfig::default())
    }
}
