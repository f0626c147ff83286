use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{BOLD, ITALIC, UNDERLINE};
use crate::error::Error;

/// Formatting shortcuts. `mod` is Cmd on macOS and Ctrl elsewhere.
pub const MARK_HOTKEYS: [(&str, &str); 3] = [("mod+b", BOLD), ("mod+i", ITALIC), ("mod+u", UNDERLINE)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

impl Modifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    pub fn meta() -> Self {
        Self {
            meta: true,
            ..Self::default()
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    fn union(self, other: Modifiers) -> Self {
        Self {
            ctrl: self.ctrl || other.ctrl,
            alt: self.alt || other.alt,
            shift: self.shift || other.shift,
            meta: self.meta || other.meta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mac,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Other
        }
    }

    /// What `mod` stands for on this platform.
    pub fn primary_modifier(self) -> Modifiers {
        match self {
            Platform::Mac => Modifiers::meta(),
            Platform::Other => Modifiers::ctrl(),
        }
    }
}

/// A key as reported by the host, with the modifiers held at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: String,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn new(key: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            key: key.into(),
            modifiers,
        }
    }
}

/// A parsed shortcut such as `"mod+b"` or `"ctrl-shift-k"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hotkey {
    key: String,
    primary: bool,
    modifiers: Modifiers,
}

impl Hotkey {
    pub fn parse(source: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidHotkey(source.to_string());

        let mut key: Option<String> = None;
        let mut primary = false;
        let mut modifiers = Modifiers::none();

        for part in source.split(['+', '-']) {
            let part = part.trim().to_ascii_lowercase();
            match part.as_str() {
                "" => return Err(invalid()),
                "mod" | "primary" | "secondary" => primary = true,
                "ctrl" | "control" => modifiers.ctrl = true,
                "alt" | "option" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                "cmd" | "command" | "meta" | "super" => modifiers.meta = true,
                _ if key.is_some() => return Err(invalid()),
                _ => key = Some(part),
            }
        }

        Ok(Self {
            key: key.ok_or_else(invalid)?,
            primary,
            modifiers,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Exact match: extra modifiers held down mean no match.
    pub fn matches(&self, press: &KeyPress, platform: Platform) -> bool {
        let expected = if self.primary {
            self.modifiers.union(platform.primary_modifier())
        } else {
            self.modifiers
        };
        press.modifiers == expected && press.key.eq_ignore_ascii_case(&self.key)
    }
}

impl FromStr for Hotkey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hotkey::parse(s)
    }
}

/// The mark a key press toggles, if it is one of the formatting shortcuts.
pub fn mark_for_key(press: &KeyPress, platform: Platform) -> Option<&'static str> {
    MARK_HOTKEYS.iter().find_map(|(hotkey, mark)| {
        Hotkey::parse(hotkey)
            .ok()
            .filter(|hotkey| hotkey.matches(press, platform))
            .map(|_| *mark)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_both_separators() {
        let plus = Hotkey::parse("Mod+Shift+K").unwrap();
        let dash = Hotkey::parse("mod-shift-k").unwrap();
        assert_eq!(plus, dash);
        assert_eq!(plus.key(), "k");
    }

    #[test]
    fn parse_rejects_malformed_hotkeys() {
        assert!(matches!(Hotkey::parse("mod+"), Err(Error::InvalidHotkey(_))));
        assert!(matches!(Hotkey::parse("ctrl+shift"), Err(Error::InvalidHotkey(_))));
        assert!(matches!(Hotkey::parse("a+b"), Err(Error::InvalidHotkey(_))));
    }

    #[test]
    fn primary_modifier_depends_on_platform() {
        let hotkey = Hotkey::parse("mod+b").unwrap();
        let cmd_b = KeyPress::new("b", Modifiers::meta());
        let ctrl_b = KeyPress::new("b", Modifiers::ctrl());

        assert!(hotkey.matches(&cmd_b, Platform::Mac));
        assert!(!hotkey.matches(&ctrl_b, Platform::Mac));
        assert!(hotkey.matches(&ctrl_b, Platform::Other));
        assert!(!hotkey.matches(&cmd_b, Platform::Other));
    }
}
