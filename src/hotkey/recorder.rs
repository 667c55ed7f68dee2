//! Live chord recording as a pure state machine.
//!
//! Modifiers accumulate while held; the first non-modifier key pressed while
//! at least one modifier is down becomes the trigger key. The recording
//! completes on the next key release once both parts are present.

use super::key::{KeyChord, KeyCode, KeyIdentity, Modifiers};

#[derive(Debug, Default)]
pub struct Recorder {
    modifiers: Modifiers,
    held: u8,
    key: Option<KeyIdentity>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_press(&mut self, code: &KeyCode) {
        match code {
            KeyCode::Modifier(m) => {
                self.held |= m.held_bit();
                self.modifiers = self.modifiers.with(m.modifier());
            }
            KeyCode::Key(identity) => {
                if self.key.is_none() && self.held != 0 {
                    self.key = Some(identity.canonical());
                }
            }
            KeyCode::Unidentified => {}
        }
    }

    /// Returns the finished chord once a key is released with both a
    /// modifier set and a trigger key recorded.
    pub fn on_release(&mut self, code: &KeyCode) -> Option<KeyChord> {
        if let KeyCode::Modifier(m) = code {
            self.held &= !m.held_bit();
        }
        let key = self.key.clone()?;
        KeyChord::new(self.modifiers, key).ok()
    }

    /// Partial chord as display text, e.g. `Ctrl+Shift` or `Ctrl+V`.
    pub fn preview(&self) -> String {
        let mut parts: Vec<String> = self
            .modifiers
            .iter()
            .map(|m| m.label().to_string())
            .collect();
        if let Some(key) = &self.key {
            parts.push(key.to_string());
        }
        parts.join("+")
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }
}
