//! Customizable keybindings and named shortcuts.
//!
//! [`KeyBindings`] holds the keys the engine itself reacts to. Hosts register
//! their own shortcuts in a [`ShortcutRegistry`]; the scene reports a fired
//! shortcut by name on key release.

use serde::{Deserialize, Serialize};

use crate::input::{Key, KeyEvent};

/// Keys bound to built-in scene behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindings {
    /// Closes the polygon being drawn
    #[serde(default = "default_close_polygon")]
    pub close_polygon: Key,
    /// Held to operate on the current group
    #[serde(default = "default_group_mode")]
    pub group_mode: Key,
    /// Held to pick the innermost rect on click
    #[serde(default = "default_deep_select")]
    pub deep_select: Key,
    /// Held to pan the view by dragging
    #[serde(default = "default_stage_drag")]
    pub stage_drag: Key,
}

fn default_close_polygon() -> Key {
    Key::Space
}

fn default_group_mode() -> Key {
    Key::Char('g')
}

fn default_deep_select() -> Key {
    Key::Control
}

fn default_stage_drag() -> Key {
    Key::Alt
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            close_polygon: default_close_polygon(),
            group_mode: default_group_mode(),
            deep_select: default_deep_select(),
            stage_drag: default_stage_drag(),
        }
    }
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a key is already used by a binding other than `exclude`.
    /// Returns a description of what it's used for, if anything.
    pub fn key_conflict(&self, key: Key, exclude: Option<&str>) -> Option<&'static str> {
        [
            ("close_polygon", self.close_polygon, "Close polygon"),
            ("group_mode", self.group_mode, "Group mode"),
            ("deep_select", self.deep_select, "Deep select"),
            ("stage_drag", self.stage_drag, "Stage drag"),
        ]
        .into_iter()
        .find(|(field, bound, _)| exclude != Some(*field) && bound.matches(&key))
        .map(|(_, _, label)| label)
    }
}

/// Convert a key to a display string.
pub fn key_to_string(key: Key) -> String {
    match key {
        Key::Char(c) => c.to_uppercase().to_string(),
        Key::Space => "Space".to_string(),
        Key::Enter => "Enter".to_string(),
        Key::Escape => "Esc".to_string(),
        Key::Backspace => "Backspace".to_string(),
        Key::Delete => "Delete".to_string(),
        Key::Tab => "Tab".to_string(),
        Key::Control => "Ctrl".to_string(),
        Key::Alt => "Alt".to_string(),
        Key::Shift => "Shift".to_string(),
        Key::Meta => "Meta".to_string(),
    }
}

// ============================================================================
// Named shortcuts
// ============================================================================

/// Modifier combination a shortcut requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chord {
    /// No modifier held
    #[default]
    Plain,
    /// Ctrl only
    Ctrl,
    /// Alt only
    Alt,
    /// Shift only
    Shift,
}

impl Chord {
    fn accepts(&self, event: &KeyEvent, key: &Key) -> bool {
        match self {
            Chord::Plain => event.is_only(key),
            Chord::Ctrl => event.is_with_only_ctrl(key),
            Chord::Alt => event.is_with_only_alt(key),
            Chord::Shift => event.is_with_only_shift(key),
        }
    }
}

/// One registered shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortcut {
    pub short_key: Key,
    #[serde(default)]
    pub chord: Chord,
    pub name: String,
}

/// Named shortcuts matched on key release.
#[derive(Debug, Clone, Default)]
pub struct ShortcutRegistry {
    shortcuts: Vec<Shortcut>,
    disabled: bool,
}

impl ShortcutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shortcut. A later registration for the same key and chord
    /// replaces the earlier one.
    pub fn register(&mut self, key: Key, chord: Chord, name: impl Into<String>) {
        let name = name.into();
        self.shortcuts
            .retain(|s| !(s.chord == chord && s.short_key.matches(&key)));
        log::debug!("Shortcut '{}' bound to {} ({:?})", name, key_to_string(key), chord);
        self.shortcuts.push(Shortcut {
            short_key: key,
            chord,
            name,
        });
    }

    /// Remove every shortcut named `name`. Returns how many were removed.
    pub fn unregister(&mut self, name: &str) -> usize {
        let before = self.shortcuts.len();
        self.shortcuts.retain(|s| s.name != name);
        before - self.shortcuts.len()
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn shortcuts(&self) -> &[Shortcut] {
        &self.shortcuts
    }

    /// Name of the shortcut a key release fires, if any.
    pub fn fired(&self, event: &KeyEvent) -> Option<&str> {
        if self.disabled {
            return None;
        }
        self.shortcuts
            .iter()
            .find(|s| s.chord.accepts(event, &s.short_key))
            .map(|s| s.name.as_str())
    }
}
