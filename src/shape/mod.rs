//! Shapes and their interaction state machines.
//!
//! Rectangles and polygons are independent variants. What they share is a
//! pair of capabilities: [`Editable`] for the resize/drag edit mode and
//! [`StatusObservable`] for the Normal/Hover/Active status driven by pointer
//! events. Committed shapes live behind shared handles so listeners can hold
//! weak references to them.

mod polygon;
mod rect;

pub use polygon::{DEFAULT_POINT_RADIUS, PolygonAttrs, PolygonHandle, PolygonShape};
pub use rect::{Corner, GroupStatus, RectAttrs, RectEditState, RectHandle, RectShape};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::ImageBounds;
use crate::palette::Color;
use crate::stage::Stage;

// ============================================================================
// Identity
// ============================================================================

/// Unique shape identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh time-based id, strictly increasing within the process.
    pub fn generate() -> Self {
        static LAST: AtomicU64 = AtomicU64::new(0);
        let now = now_millis();
        let mut last = LAST.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match LAST.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self(candidate.to_string()),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ShapeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub(crate) fn now_millis() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// Status and metadata
// ============================================================================

/// Visual status of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ShapeStatus {
    #[default]
    Normal,
    Hover,
    Active,
}

/// Fill a renderer should use for a status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillStyle {
    /// `None` means transparent
    pub fill: Option<Color>,
    pub opacity: f32,
}

impl ShapeStatus {
    pub fn fill_style(&self, color: Color) -> FillStyle {
        match self {
            ShapeStatus::Active => FillStyle {
                fill: Some(color),
                opacity: 0.3,
            },
            ShapeStatus::Hover => FillStyle {
                fill: Some(color),
                opacity: 0.1,
            },
            ShapeStatus::Normal => FillStyle {
                fill: None,
                opacity: 1.0,
            },
        }
    }
}

/// Domain tags carried by a shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeMeta {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl ShapeMeta {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            group_id: None,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Resize/drag edit mode.
pub trait Editable {
    /// Enter edit mode. Ignored while already editing.
    fn start_edit(&self, stage: &Stage);
    /// Leave edit mode, releasing every edit listener.
    fn end_edit(&self);
    fn is_editing(&self) -> bool;
}

/// Status transitions driven by pointer enter/leave/click.
pub trait StatusObservable {
    fn bind_status_events(&self, stage: &Stage);
    fn unbind_status_events(&self);
}

// ============================================================================
// Handles
// ============================================================================

/// A shape owned by a stage layer.
#[derive(Debug, Clone)]
pub enum ShapeHandle {
    Rect(RectHandle),
    Polygon(PolygonHandle),
}

/// Full attribute snapshot of a shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeSnapshot {
    Rect(RectAttrs),
    Polygon(PolygonAttrs),
}

impl ShapeHandle {
    pub fn id(&self) -> ShapeId {
        match self {
            ShapeHandle::Rect(h) => h.id(),
            ShapeHandle::Polygon(h) => h.id(),
        }
    }

    pub fn status(&self) -> ShapeStatus {
        match self {
            ShapeHandle::Rect(h) => h.borrow().status(),
            ShapeHandle::Polygon(h) => h.borrow().status(),
        }
    }

    pub fn out_range(&self, bounds: &ImageBounds) -> bool {
        match self {
            ShapeHandle::Rect(h) => h.borrow().out_range(bounds),
            ShapeHandle::Polygon(h) => h.borrow().out_range(bounds),
        }
    }

    pub fn snapshot(&self) -> ShapeSnapshot {
        match self {
            ShapeHandle::Rect(h) => ShapeSnapshot::Rect(h.borrow().attrs().clone()),
            ShapeHandle::Polygon(h) => ShapeSnapshot::Polygon(h.borrow().attrs().clone()),
        }
    }

    /// Restore a snapshot taken from the same variant. Returns false on a
    /// variant mismatch.
    pub fn restore(&self, snapshot: &ShapeSnapshot) -> bool {
        match (self, snapshot) {
            (ShapeHandle::Rect(h), ShapeSnapshot::Rect(attrs)) => {
                h.borrow_mut().restore(attrs.clone());
                true
            }
            (ShapeHandle::Polygon(h), ShapeSnapshot::Polygon(attrs)) => {
                h.borrow_mut().restore(attrs.clone());
                true
            }
            _ => false,
        }
    }

    /// Tear down listeners and remove the shape from the stage.
    pub fn destroy(&self, stage: &Stage) {
        match self {
            ShapeHandle::Rect(h) => h.destroy(stage),
            ShapeHandle::Polygon(h) => h.destroy(stage),
        }
    }

    pub fn as_rect(&self) -> Option<&RectHandle> {
        match self {
            ShapeHandle::Rect(h) => Some(h),
            ShapeHandle::Polygon(_) => None,
        }
    }

    pub fn as_polygon(&self) -> Option<&PolygonHandle> {
        match self {
            ShapeHandle::Polygon(h) => Some(h),
            ShapeHandle::Rect(_) => None,
        }
    }
}

impl From<RectHandle> for ShapeHandle {
    fn from(handle: RectHandle) -> Self {
        ShapeHandle::Rect(handle)
    }
}

impl From<PolygonHandle> for ShapeHandle {
    fn from(handle: PolygonHandle) -> Self {
        ShapeHandle::Polygon(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_increasing() {
        let ids: Vec<u64> = (0..50)
            .map(|_| ShapeId::generate().as_str().parse().unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_fill_style_per_status() {
        let color = Color::rgb(10, 20, 30);
        assert_eq!(ShapeStatus::Normal.fill_style(color).fill, None);
        assert_eq!(ShapeStatus::Hover.fill_style(color).opacity, 0.1);
        assert_eq!(ShapeStatus::Active.fill_style(color).fill, Some(color));
        assert_eq!(ShapeStatus::Active.fill_style(color).opacity, 0.3);
    }
}
