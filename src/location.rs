//! Crosshair guide lines following the pointer across the image.

use std::cell::Cell;
use std::rc::Rc;

use crate::dispatch::{Phase, Subscription};
use crate::geometry::Point;
use crate::input::EventKind;
use crate::stage::Stage;

/// A line segment in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
}

/// The two guide lines through the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrosshairLines {
    pub horizontal: Segment,
    pub vertical: Segment,
}

/// Pointer-following crosshair spanning the whole image.
#[derive(Debug)]
pub struct Crosshair {
    stage: Stage,
    pointer: Rc<Cell<Option<Point>>>,
    listener: Option<Subscription>,
}

impl Crosshair {
    pub fn new(stage: &Stage) -> Self {
        Self {
            stage: stage.clone(),
            pointer: Rc::new(Cell::new(None)),
            listener: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.listener.is_some()
    }

    /// Turn tracking on or off. Repeating the current state does nothing.
    pub fn enable(&mut self, enabled: bool) {
        if enabled == self.is_enabled() {
            return;
        }
        if !enabled {
            self.listener = None;
            self.pointer.set(None);
            self.stage.request_redraw();
            log::debug!("Crosshair disabled");
            return;
        }

        let (pointer, weak) = (Rc::clone(&self.pointer), self.stage.downgrade());
        self.listener = Some(
            self.stage
                .dispatcher()
                .on(EventKind::PointerMove, Phase::Stage, move |_| {
                    if let Some(stage) = weak.upgrade() {
                        pointer.set(Some(stage.pointer_position()));
                        stage.request_redraw();
                    }
                }),
        );
        log::debug!("Crosshair enabled");
    }

    /// Guide lines for the last pointer sample, or `None` while disabled or
    /// when the pointer is outside the image.
    pub fn lines(&self) -> Option<CrosshairLines> {
        let at = self.pointer.get()?;
        let bounds = self.stage.bounds();
        if !bounds.contains(&at) {
            return None;
        }
        Some(CrosshairLines {
            horizontal: Segment {
                from: Point::new(0.0, at.y),
                to: Point::new(bounds.width, at.y),
            },
            vertical: Segment {
                from: Point::new(at.x, 0.0),
                to: Point::new(at.x, bounds.height),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ImageBounds;
    use crate::input::{InputEvent, PointerEvent};

    #[test]
    fn test_lines_span_image_through_pointer() {
        let stage = Stage::new(ImageBounds::new(200.0, 100.0));
        let mut crosshair = Crosshair::new(&stage);
        crosshair.enable(true);
        crosshair.enable(true);
        assert_eq!(stage.dispatcher().listener_count(), 1);

        stage.dispatch(Phase::Stage, &InputEvent::PointerMove(PointerEvent::at(40.0, 30.0)));
        let lines = crosshair.lines().unwrap();
        assert_eq!(lines.horizontal.from, Point::new(0.0, 30.0));
        assert_eq!(lines.horizontal.to, Point::new(200.0, 30.0));
        assert_eq!(lines.vertical.to, Point::new(40.0, 100.0));
    }

    #[test]
    fn test_hidden_outside_image_and_when_disabled() {
        let stage = Stage::new(ImageBounds::new(200.0, 100.0));
        let mut crosshair = Crosshair::new(&stage);
        assert!(crosshair.lines().is_none());

        crosshair.enable(true);
        stage.dispatch(Phase::Stage, &InputEvent::PointerMove(PointerEvent::at(250.0, 30.0)));
        assert!(crosshair.lines().is_none());

        stage.dispatch(Phase::Stage, &InputEvent::PointerMove(PointerEvent::at(20.0, 30.0)));
        assert!(crosshair.lines().is_some());
        crosshair.enable(false);
        assert!(crosshair.lines().is_none());
        assert_eq!(stage.dispatcher().listener_count(), 0);
    }
}
