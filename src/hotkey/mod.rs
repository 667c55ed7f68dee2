//! Hotkey domain: public API.
//!
//! This module owns chord matching, debounce, and chord recording.
//! It consumes `(KeyCode, is_press)` pairs and does not care where they
//! come from; the OS hook lives in `listener` behind the
//! `global-listener` feature.

mod clock;
mod detector;
mod key;
#[cfg(feature = "global-listener")]
mod listener;
mod recorder;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use detector::{ChordConfig, HotkeyDetector, Trigger, DEFAULT_DEBOUNCE};
pub use key::{ChordError, KeyChord, KeyCode, KeyIdentity, Modifier, ModifierKey, Modifiers};
#[cfg(feature = "global-listener")]
pub use listener::{listen, ListenError};
pub use recorder::Recorder;
