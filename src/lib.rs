//! labelworker - interactive image annotation engine
//!
//! Turns raw pointer, wheel and key input into labelled rectangles and
//! polygons on top of an image. A [`Scene`] owns the layered [`Stage`], runs
//! one draw action at a time, validates shapes against the image bounds and
//! converts committed shapes to and from the business record format.
//!
//! Rendering is left to the host: the stage exposes shapes, the view
//! transform and a redraw counter, and the host feeds [`InputEvent`]s back in.

pub mod action;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod draw;
pub mod error;
pub mod geometry;
pub mod group;
pub mod input;
pub mod keybindings;
pub mod location;
pub mod notify;
pub mod palette;
pub mod plugins;
pub mod range;
pub mod scene;
pub mod shape;
pub mod stage;

pub use action::{Action, ActionFuture, Disposable};
pub use config::{ConfigError, LabelConfig, LogLevel};
pub use convert::{BusinessRecord, DataConversionFactory, TypeStyleTable};
pub use error::{ActionError, ConversionError, ConversionResult};
pub use geometry::{ImageBounds, Point, Rect};
pub use input::{InputEvent, Key, KeyEvent, MouseButton, PointerEvent};
pub use notify::SceneEvent;
pub use scene::Scene;
pub use shape::{ShapeHandle, ShapeId, ShapeStatus};
pub use stage::{LayerKind, Stage};
