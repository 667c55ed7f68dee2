//! Global keyboard hook using the `rdev` crate.
//!
//! This is the infrastructure layer; it talks to the OS. It translates
//! rdev events into `KeyCode`s and hands them to a callback on the hook
//! thread, strictly in arrival order.

use super::key::{KeyCode, KeyIdentity, ModifierKey};
use rdev::{Event, EventType, Key};

/// Installs the global hook and blocks, delivering every key press and
/// release to `on_key`. Only returns if the hook cannot be installed.
pub fn listen<F>(mut on_key: F) -> Result<(), ListenError>
where
    F: FnMut(KeyCode, bool) + 'static,
{
    log::info!("[HOTKEY] Installing global keyboard hook");

    rdev::listen(move |event: Event| {
        let (key, is_press) = match event.event_type {
            EventType::KeyPress(key) => (key, true),
            EventType::KeyRelease(key) => (key, false),
            _ => return,
        };
        on_key(translate(key, event.name.as_deref()), is_press);
    })
    .map_err(|e| ListenError::Hook(format!("{:?}", e)))
}

/// Maps an rdev key (plus the text it produced, if any) to a `KeyCode`.
///
/// Letters and digits come from the physical key, not from `name`: with
/// Ctrl held, `name` is often a control character.
fn translate(key: Key, name: Option<&str>) -> KeyCode {
    if let Some(m) = modifier(key) {
        return KeyCode::Modifier(m);
    }
    if let Some(c) = letter_or_digit(key) {
        return KeyCode::Key(KeyIdentity::Character(c));
    }
    if let Some(named) = named(key) {
        return KeyCode::Key(KeyIdentity::Named(named.to_string()));
    }
    if let Key::Unknown(code) = key {
        return KeyCode::Key(KeyIdentity::VirtualCode(code));
    }

    let printable = name.and_then(|text| {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => Some(c),
            _ => None,
        }
    });
    match printable {
        Some(c) => KeyCode::Key(KeyIdentity::Character(c)),
        None => KeyCode::Unidentified,
    }
}

fn modifier(key: Key) -> Option<ModifierKey> {
    match key {
        Key::ControlLeft => Some(ModifierKey::ControlLeft),
        Key::ControlRight => Some(ModifierKey::ControlRight),
        Key::Alt => Some(ModifierKey::AltLeft),
        Key::AltGr => Some(ModifierKey::AltGr),
        Key::ShiftLeft => Some(ModifierKey::ShiftLeft),
        Key::ShiftRight => Some(ModifierKey::ShiftRight),
        _ => None,
    }
}

fn letter_or_digit(key: Key) -> Option<char> {
    let c = match key {
        Key::KeyA => 'a',
        Key::KeyB => 'b',
        Key::KeyC => 'c',
        Key::KeyD => 'd',
        Key::KeyE => 'e',
        Key::KeyF => 'f',
        Key::KeyG => 'g',
        Key::KeyH => 'h',
        Key::KeyI => 'i',
        Key::KeyJ => 'j',
        Key::KeyK => 'k',
        Key::KeyL => 'l',
        Key::KeyM => 'm',
        Key::KeyN => 'n',
        Key::KeyO => 'o',
        Key::KeyP => 'p',
        Key::KeyQ => 'q',
        Key::KeyR => 'r',
        Key::KeyS => 's',
        Key::KeyT => 't',
        Key::KeyU => 'u',
        Key::KeyV => 'v',
        Key::KeyW => 'w',
        Key::KeyX => 'x',
        Key::KeyY => 'y',
        Key::KeyZ => 'z',
        Key::Num0 => '0',
        Key::Num1 => '1',
        Key::Num2 => '2',
        Key::Num3 => '3',
        Key::Num4 => '4',
        Key::Num5 => '5',
        Key::Num6 => '6',
        Key::Num7 => '7',
        Key::Num8 => '8',
        Key::Num9 => '9',
        _ => return None,
    };
    Some(c)
}

fn named(key: Key) -> Option<&'static str> {
    let name = match key {
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        Key::Space => "space",
        Key::Return => "enter",
        Key::Tab => "tab",
        Key::Escape => "escape",
        Key::Backspace => "backspace",
        Key::Delete => "delete",
        Key::Insert => "insert",
        Key::Home => "home",
        Key::End => "end",
        Key::PageUp => "pageup",
        Key::PageDown => "pagedown",
        Key::UpArrow => "up",
        Key::DownArrow => "down",
        Key::LeftArrow => "left",
        Key::RightArrow => "right",
        Key::PrintScreen => "printscreen",
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("Failed to install global keyboard hook: {0}")]
    Hook(String),
}
