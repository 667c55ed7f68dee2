//! Key identities, modifier sets, and chords.
//!
//! `KeyIdentity::matches` is the one place that decides whether an event's
//! key is the chord's trigger key. Everything else compares chords and
//! modifier sets structurally.

use std::fmt;
use std::str::FromStr;

/// One logical modifier, regardless of which physical side was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
}

impl Modifier {
    const ALL: [Modifier; 3] = [Modifier::Ctrl, Modifier::Alt, Modifier::Shift];

    fn bit(self) -> u8 {
        match self {
            Modifier::Ctrl => 0b001,
            Modifier::Alt => 0b010,
            Modifier::Shift => 0b100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Alt => "Alt",
            Modifier::Shift => "Shift",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "altgr" | "alt_gr" | "option" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            _ => None,
        }
    }
}

/// A set of logical modifiers, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CTRL: Modifiers = Modifiers(0b001);
    pub const ALT: Modifiers = Modifiers(0b010);
    pub const SHIFT: Modifiers = Modifiers(0b100);

    pub fn from_bits(bits: u8) -> Self {
        Modifiers(bits & 0b111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, m: Modifier) -> bool {
        self.0 & m.bit() != 0
    }

    pub fn with(self, m: Modifier) -> Self {
        Modifiers(self.0 | m.bit())
    }

    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        Modifier::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl FromIterator<Modifier> for Modifiers {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        iter.into_iter().fold(Modifiers::NONE, Modifiers::with)
    }
}

/// A physical modifier key. Left and right sides are tracked separately so
/// releasing one side does not clear the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKey {
    ControlLeft,
    ControlRight,
    AltLeft,
    AltRight,
    AltGr,
    ShiftLeft,
    ShiftRight,
}

impl ModifierKey {
    pub fn modifier(self) -> Modifier {
        match self {
            ModifierKey::ControlLeft | ModifierKey::ControlRight => Modifier::Ctrl,
            ModifierKey::AltLeft | ModifierKey::AltRight | ModifierKey::AltGr => Modifier::Alt,
            ModifierKey::ShiftLeft | ModifierKey::ShiftRight => Modifier::Shift,
        }
    }

    /// Bit used by the detector's held-key mask.
    pub(crate) fn held_bit(self) -> u8 {
        match self {
            ModifierKey::ControlLeft => 1 << 0,
            ModifierKey::ControlRight => 1 << 1,
            ModifierKey::AltLeft => 1 << 2,
            ModifierKey::AltRight => 1 << 3,
            ModifierKey::AltGr => 1 << 4,
            ModifierKey::ShiftLeft => 1 << 5,
            ModifierKey::ShiftRight => 1 << 6,
        }
    }

    pub(crate) const ALL: [ModifierKey; 7] = [
        ModifierKey::ControlLeft,
        ModifierKey::ControlRight,
        ModifierKey::AltLeft,
        ModifierKey::AltRight,
        ModifierKey::AltGr,
        ModifierKey::ShiftLeft,
        ModifierKey::ShiftRight,
    ];

    /// Logical modifier set for a held-key mask.
    pub(crate) fn fold_held(mask: u8) -> Modifiers {
        Self::ALL
            .into_iter()
            .filter(|k| mask & k.held_bit() != 0)
            .map(ModifierKey::modifier)
            .collect()
    }
}

/// Identity of a non-modifier key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyIdentity {
    /// The character the key produces (`'v'`).
    Character(char),
    /// A platform virtual-key code (Windows VK numbering for the
    /// letter/digit/function ranges).
    VirtualCode(u32),
    /// A named non-character key (`"f5"`, `"space"`).
    Named(String),
}

impl KeyIdentity {
    /// Normalised form used for comparison: characters and names lower-cased,
    /// virtual codes for A–Z, 0–9 and F1–F12 folded into the character/name
    /// they stand for.
    pub fn canonical(&self) -> KeyIdentity {
        match self {
            KeyIdentity::Character(c) => KeyIdentity::Character(lower(*c)),
            KeyIdentity::Named(name) => {
                let name = name.trim().to_lowercase();
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyIdentity::Character(c),
                    _ => KeyIdentity::Named(name),
                }
            }
            KeyIdentity::VirtualCode(vk) => match *vk {
                0x41..=0x5A | 0x30..=0x39 => {
                    let c = char::from_u32(*vk).map(lower).unwrap_or('\0');
                    KeyIdentity::Character(c)
                }
                0x70..=0x7B => KeyIdentity::Named(format!("f{}", vk - 0x6F)),
                other => KeyIdentity::VirtualCode(other),
            },
        }
    }

    /// Unified identity check: case-insensitive character match, or
    /// virtual-code / named-key match after normalisation.
    pub fn matches(&self, other: &KeyIdentity) -> bool {
        self.canonical() == other.canonical()
    }

    /// Parses a configured key string. One character is a `Character`;
    /// `vk:<n>` or `0x<hex>` is a `VirtualCode`; anything else is `Named`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(KeyIdentity::Character(lower(c)));
        }
        let lowered = s.to_lowercase();
        if let Some(code) = lowered.strip_prefix("vk:") {
            return code.parse().ok().map(KeyIdentity::VirtualCode);
        }
        if let Some(hex) = lowered.strip_prefix("0x") {
            return u32::from_str_radix(hex, 16).ok().map(KeyIdentity::VirtualCode);
        }
        Some(KeyIdentity::Named(lowered))
    }

    /// String form for the config file (inverse of `parse`).
    pub fn config_string(&self) -> String {
        match self {
            KeyIdentity::Character(c) => lower(*c).to_string(),
            KeyIdentity::VirtualCode(vk) => format!("vk:{}", vk),
            KeyIdentity::Named(name) => name.to_lowercase(),
        }
    }
}

impl fmt::Display for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical() {
            KeyIdentity::Character(c) => write!(f, "{}", c.to_uppercase()),
            KeyIdentity::VirtualCode(vk) => write!(f, "VK{:#04X}", vk),
            KeyIdentity::Named(name) => write!(f, "{}", name.to_uppercase()),
        }
    }
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// The key carried by a single keyboard event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCode {
    Modifier(ModifierKey),
    Key(KeyIdentity),
    /// No character, no virtual code, no name. Never matches anything.
    Unidentified,
}

/// Required modifiers plus exactly one trigger key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    modifiers: Modifiers,
    key: KeyIdentity,
}

impl KeyChord {
    /// Builds a chord. At least one modifier is required so a bare key can
    /// never become a global trigger.
    pub fn new(modifiers: Modifiers, key: KeyIdentity) -> Result<Self, ChordError> {
        if modifiers.is_empty() {
            return Err(ChordError::NoModifiers);
        }
        Ok(Self { modifiers, key })
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn key(&self) -> &KeyIdentity {
        &self.key
    }

    /// Lower-case modifier names for the config file.
    pub fn modifier_names(&self) -> Vec<String> {
        self.modifiers
            .iter()
            .map(|m| m.label().to_lowercase())
            .collect()
    }
}

impl Default for KeyChord {
    /// Ctrl+V.
    fn default() -> Self {
        Self {
            modifiers: Modifiers::CTRL,
            key: KeyIdentity::Character('v'),
        }
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in self.modifiers.iter() {
            write!(f, "{}+", m.label())?;
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for KeyChord {
    type Err = ChordError;

    /// Parses `"Ctrl+Shift+V"`-style strings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modifiers = Modifiers::NONE;
        let mut key: Option<KeyIdentity> = None;

        for token in s.split('+').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(m) = Modifier::parse(token) {
                modifiers = modifiers.with(m);
                continue;
            }
            if key.is_some() {
                return Err(ChordError::MultipleKeys(s.to_string()));
            }
            key = KeyIdentity::parse(token);
        }

        KeyChord::new(modifiers, key.ok_or(ChordError::MissingKey)?)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChordError {
    #[error("Chord has no trigger key")]
    MissingKey,

    #[error("Chord needs at least one modifier")]
    NoModifiers,

    #[error("Unknown modifier: {0}")]
    UnknownModifier(String),

    #[error("More than one trigger key in chord: {0}")]
    MultipleKeys(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_match_is_case_insensitive() {
        let v = KeyIdentity::Character('v');
        assert!(v.matches(&KeyIdentity::Character('V')));
        assert!(!v.matches(&KeyIdentity::Character('c')));
    }

    #[test]
    fn virtual_codes_fold_into_characters_and_names() {
        assert!(KeyIdentity::Character('v').matches(&KeyIdentity::VirtualCode(0x56)));
        assert!(KeyIdentity::Character('7').matches(&KeyIdentity::VirtualCode(0x37)));
        assert!(KeyIdentity::Named("F5".into()).matches(&KeyIdentity::VirtualCode(0x74)));
        assert!(KeyIdentity::VirtualCode(0xBA).matches(&KeyIdentity::VirtualCode(0xBA)));
        assert!(!KeyIdentity::VirtualCode(0xBA).matches(&KeyIdentity::VirtualCode(0xBB)));
    }

    #[test]
    fn named_keys_compare_lowercase() {
        assert!(KeyIdentity::Named("Space".into()).matches(&KeyIdentity::Named("space".into())));
        assert!(!KeyIdentity::Named("space".into()).matches(&KeyIdentity::Named("tab".into())));
    }

    #[test]
    fn parse_key_strings() {
        assert_eq!(KeyIdentity::parse("V"), Some(KeyIdentity::Character('v')));
        assert_eq!(KeyIdentity::parse("vk:186"), Some(KeyIdentity::VirtualCode(186)));
        assert_eq!(KeyIdentity::parse("0xBA"), Some(KeyIdentity::VirtualCode(0xBA)));
        assert_eq!(KeyIdentity::parse("F12"), Some(KeyIdentity::Named("f12".into())));
        assert_eq!(KeyIdentity::parse("  "), None);
    }

    #[test]
    fn chord_display_orders_modifiers() {
        let chord = KeyChord::new(
            Modifiers::SHIFT | Modifiers::CTRL,
            KeyIdentity::Character('v'),
        )
        .unwrap();
        assert_eq!(chord.to_string(), "Ctrl+Shift+V");
        assert_eq!(chord.modifier_names(), vec!["ctrl", "shift"]);
    }

    #[test]
    fn chord_from_str() {
        let chord: KeyChord = "ctrl+alt+F1".parse().unwrap();
        assert_eq!(chord.modifiers(), Modifiers::CTRL | Modifiers::ALT);
        assert_eq!(chord.key(), &KeyIdentity::Named("f1".into()));
        assert_eq!(chord.to_string(), "Ctrl+Alt+F1");
    }

    #[test]
    fn chord_from_str_errors() {
        assert_eq!("Ctrl+Alt".parse::<KeyChord>(), Err(ChordError::MissingKey));
        assert_eq!("V".parse::<KeyChord>(), Err(ChordError::NoModifiers));
        assert!(matches!(
            "Ctrl+A+B".parse::<KeyChord>(),
            Err(ChordError::MultipleKeys(_))
        ));
    }

    #[test]
    fn held_mask_folds_sides() {
        let mask = ModifierKey::ControlRight.held_bit() | ModifierKey::AltGr.held_bit();
        assert_eq!(ModifierKey::fold_held(mask), Modifiers::CTRL | Modifiers::ALT);
        assert_eq!(ModifierKey::fold_held(0), Modifiers::NONE);
    }
}
