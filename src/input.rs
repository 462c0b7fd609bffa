//! Input events fed into a scene by the host.
//!
//! Pointer positions are in screen space; the stage maps them into image
//! space. Hit-testing belongs to the host, which reports what the pointer is
//! over through [`HitTarget`].

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::shape::ShapeId;

/// Mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Keyboard keys (the subset the engine binds to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Char(char),
    Space,
    Enter,
    Escape,
    Backspace,
    Delete,
    Tab,
    Control,
    Alt,
    Shift,
    Meta,
}

impl Key {
    /// Compare keys, ignoring the case of character keys.
    pub fn matches(&self, other: &Key) -> bool {
        match (self, other) {
            (Key::Char(a), Key::Char(b)) => a.to_lowercase().eq(b.to_lowercase()),
            _ => self == other,
        }
    }
}

/// Keyboard modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
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

    pub fn alt() -> Self {
        Self {
            alt: true,
            ..Self::default()
        }
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.shift || self.ctrl || self.alt || self.meta)
    }
}

/// Which part of a shape the pointer is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapePart {
    Body,
    /// A vertex handle. Rect handles are numbered clockwise from the top-left.
    Vertex(usize),
}

/// Result of the host's hit test for a pointer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitTarget {
    pub shape: ShapeId,
    pub part: ShapePart,
}

impl HitTarget {
    pub fn body(shape: impl Into<ShapeId>) -> Self {
        Self {
            shape: shape.into(),
            part: ShapePart::Body,
        }
    }

    pub fn vertex(shape: impl Into<ShapeId>, index: usize) -> Self {
        Self {
            shape: shape.into(),
            part: ShapePart::Vertex(index),
        }
    }
}

/// A pointer sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerEvent {
    /// Screen-space position
    pub position: Point,
    pub button: MouseButton,
    pub modifiers: Modifiers,
    pub target: Option<HitTarget>,
}

impl PointerEvent {
    /// A primary-button sample with no modifiers and no hit target.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Point::new(x, y),
            button: MouseButton::Left,
            modifiers: Modifiers::none(),
            target: None,
        }
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn on(mut self, target: HitTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Primary button with no modifier held.
    pub fn is_only_left(&self) -> bool {
        self.button == MouseButton::Left && self.modifiers.is_empty()
    }

    /// Secondary button with no modifier held.
    pub fn is_only_right(&self) -> bool {
        self.button == MouseButton::Right && self.modifiers.is_empty()
    }

    pub fn is_left(&self) -> bool {
        self.button == MouseButton::Left
    }

    /// Whether the event targets the given shape.
    pub fn targets(&self, shape: &ShapeId) -> bool {
        self.target.as_ref().is_some_and(|t| &t.shape == shape)
    }
}

/// A key press or release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::none())
    }

    /// `key` with no modifier held.
    pub fn is_only(&self, key: &Key) -> bool {
        self.key.matches(key) && self.modifiers.is_empty()
    }

    /// `key` with Ctrl and neither Shift nor Alt.
    pub fn is_with_only_ctrl(&self, key: &Key) -> bool {
        self.key.matches(key) && self.modifiers.ctrl && !self.modifiers.shift && !self.modifiers.alt
    }

    /// `key` with Alt and neither Ctrl nor Shift.
    pub fn is_with_only_alt(&self, key: &Key) -> bool {
        self.key.matches(key) && self.modifiers.alt && !self.modifiers.ctrl && !self.modifiers.shift
    }

    /// `key` with Shift and neither Ctrl nor Alt.
    pub fn is_with_only_shift(&self, key: &Key) -> bool {
        self.key.matches(key) && self.modifiers.shift && !self.modifiers.ctrl && !self.modifiers.alt
    }

    /// The Control key itself, without Alt or Shift.
    pub fn is_strict_ctrl(&self) -> bool {
        self.key == Key::Control && !self.modifiers.alt && !self.modifiers.shift
    }
}

/// The kind of an [`InputEvent`], used to route listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    Click,
    PointerEnter,
    PointerLeave,
    Wheel,
    KeyDown,
    KeyUp,
}

/// Events the host feeds into a scene.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerEvent),
    PointerMove(PointerEvent),
    PointerUp(PointerEvent),
    /// A completed primary click (down and up on the same target).
    Click(PointerEvent),
    PointerEnter(HitTarget),
    PointerLeave(HitTarget),
    Wheel { delta: f32, position: Point },
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InputEvent::PointerDown(_) => EventKind::PointerDown,
            InputEvent::PointerMove(_) => EventKind::PointerMove,
            InputEvent::PointerUp(_) => EventKind::PointerUp,
            InputEvent::Click(_) => EventKind::Click,
            InputEvent::PointerEnter(_) => EventKind::PointerEnter,
            InputEvent::PointerLeave(_) => EventKind::PointerLeave,
            InputEvent::Wheel { .. } => EventKind::Wheel,
            InputEvent::KeyDown(_) => EventKind::KeyDown,
            InputEvent::KeyUp(_) => EventKind::KeyUp,
        }
    }

    pub fn pointer(&self) -> Option<&PointerEvent> {
        match self {
            InputEvent::PointerDown(p)
            | InputEvent::PointerMove(p)
            | InputEvent::PointerUp(p)
            | InputEvent::Click(p) => Some(p),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&KeyEvent> {
        match self {
            InputEvent::KeyDown(k) | InputEvent::KeyUp(k) => Some(k),
            _ => None,
        }
    }

    /// Hit target of pointer, enter and leave events.
    pub fn target(&self) -> Option<&HitTarget> {
        match self {
            InputEvent::PointerEnter(t) | InputEvent::PointerLeave(t) => Some(t),
            _ => self.pointer().and_then(|p| p.target.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_left_rejects_modifiers() {
        let plain = PointerEvent::at(1.0, 2.0);
        assert!(plain.is_only_left());

        let with_shift = PointerEvent::at(1.0, 2.0).with_modifiers(Modifiers::shift());
        assert!(!with_shift.is_only_left());
        assert!(with_shift.is_left());

        let right = PointerEvent::at(1.0, 2.0).with_button(MouseButton::Right);
        assert!(!right.is_only_left());
        assert!(right.is_only_right());
    }

    #[test]
    fn test_key_matching_ignores_case() {
        let event = KeyEvent::plain(Key::Char('G'));
        assert!(event.is_only(&Key::Char('g')));
        assert!(!event.is_with_only_ctrl(&Key::Char('g')));

        let ctrl = KeyEvent::new(Key::Char('s'), Modifiers::ctrl());
        assert!(ctrl.is_with_only_ctrl(&Key::Char('S')));
        assert!(!ctrl.is_only(&Key::Char('s')));
    }

    #[test]
    fn test_strict_ctrl() {
        assert!(KeyEvent::new(Key::Control, Modifiers::ctrl()).is_strict_ctrl());
        let with_alt = KeyEvent::new(
            Key::Control,
            Modifiers {
                ctrl: true,
                alt: true,
                ..Modifiers::default()
            },
        );
        assert!(!with_alt.is_strict_ctrl());
    }

    #[test]
    fn test_event_target() {
        let event = InputEvent::PointerDown(PointerEvent::at(0.0, 0.0).on(HitTarget::vertex("a", 2)));
        assert_eq!(event.kind(), EventKind::PointerDown);
        assert_eq!(event.target().map(|t| t.part), Some(ShapePart::Vertex(2)));
        assert!(InputEvent::KeyUp(KeyEvent::plain(Key::Space)).target().is_none());
    }
}
