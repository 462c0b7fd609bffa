use std::cell::RefCell;
use std::rc::Rc;

use crate::action::{Action, Settler};
use crate::dispatch::{Namespace, Phase, Subscriptions};
use crate::error::ActionError;
use crate::geometry::Point;
use crate::input::{EventKind, Key};
use crate::palette::Color;
use crate::shape::{DEFAULT_POINT_RADIUS, PolygonHandle, PolygonShape, ShapeId, ShapeMeta};
use crate::stage::{LayerKind, Stage};

/// Extra distance around vertex 0 within which the pointer snaps to it.
const CLOSE_SNAP_MARGIN: f32 = 10.0;

/// Draws one polygon per action, vertex by vertex.
///
/// Each primary release commits a vertex. The polygon closes either by
/// pressing on the highlighted first vertex once three vertices exist, or by
/// releasing the close key once two exist.
#[derive(Debug)]
pub struct PolygonPainter {
    stage: Stage,
    color: Color,
    radius: f32,
    close_key: Key,
    meta: ShapeMeta,
    namespace: RefCell<Option<Namespace>>,
}

#[derive(Debug, Default)]
struct PolygonDraw {
    shape: Option<PolygonHandle>,
    committed: Vec<Point>,
    /// Set by a press in this session; a release without it is ignored
    init: bool,
}

impl PolygonPainter {
    pub fn new(stage: &Stage, color: Color) -> Self {
        Self {
            stage: stage.clone(),
            color,
            radius: DEFAULT_POINT_RADIUS,
            close_key: Key::Space,
            meta: ShapeMeta::default(),
            namespace: RefCell::new(None),
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_close_key(mut self, key: Key) -> Self {
        self.close_key = key;
        self
    }

    pub fn with_meta(mut self, meta: ShapeMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn last_namespace(&self) -> Option<Namespace> {
        self.namespace.borrow().clone()
    }

    pub fn draw_one(&self) -> Action<PolygonHandle> {
        let namespace = Namespace::fresh("polygon-draw");
        *self.namespace.borrow_mut() = Some(namespace.clone());

        let state = Rc::new(RefCell::new(PolygonDraw::default()));
        let listeners = Rc::new(RefCell::new(Subscriptions::new()));
        let stage = self.stage.downgrade();

        let producer = {
            let (state, listeners, stage) = (Rc::clone(&state), Rc::clone(&listeners), stage.clone());
            let shape = PolygonShape::new(ShapeId::generate(), self.color)
                .with_radius(self.radius)
                .with_meta(self.meta.clone());
            let close_key = self.close_key;
            move |settler: Settler<PolygonHandle>| {
                let Some(live) = stage.upgrade() else {
                    settler.reject(ActionError::Failed("stage is gone".to_string()));
                    return;
                };
                let handle = PolygonHandle::new(shape);
                live.add_shape(LayerKind::Staging, handle.clone().into());
                live.request_redraw();
                state.borrow_mut().shape = Some(handle);

                let bag = bind_polygon_listeners(&live, &namespace, state, settler, close_key);
                *listeners.borrow_mut() = bag;
                log::debug!("Polygon draw armed in {}", namespace);
            }
        };

        let cancel_state = Rc::clone(&state);
        let cancel_stage = stage.clone();
        Action::new("draw polygon", producer)
            .on_cancel(move |_| {
                let shape = cancel_state.borrow_mut().shape.take();
                if let (Some(shape), Some(stage)) = (shape, cancel_stage.upgrade()) {
                    stage.remove_shape(&shape.id());
                }
            })
            .finally(move || {
                let released = listeners.borrow_mut().take();
                drop(released);
                if let Some(stage) = stage.upgrade() {
                    stage.request_redraw();
                }
            })
    }
}

/// Close the in-progress polygon on its committed vertices and resolve.
fn close_and_resolve(state: &RefCell<PolygonDraw>, settler: &Settler<PolygonHandle>, stage: &Stage) {
    let taken = {
        let mut draw = state.borrow_mut();
        let committed = std::mem::take(&mut draw.committed);
        draw.shape.take().map(|shape| (shape, committed))
    };
    let Some((handle, committed)) = taken else {
        return;
    };

    let count = committed.len();
    {
        let mut shape = handle.borrow_mut();
        shape.set_points(committed);
        shape.close();
    }
    stage.remove_shape(&handle.id());
    log::debug!("Polygon {} closed with {} points", handle.id(), count);
    settler.resolve(handle);
}

fn bind_polygon_listeners(
    live: &Stage,
    namespace: &Namespace,
    state: Rc<RefCell<PolygonDraw>>,
    settler: Settler<PolygonHandle>,
    close_key: Key,
) -> Subscriptions {
    let dispatcher = live.dispatcher();
    let mut bag = Subscriptions::new();

    // Down: close on the highlighted first vertex, otherwise arm a commit
    let (down_state, down_settler, weak) = (Rc::clone(&state), settler.clone(), live.downgrade());
    bag.push(dispatcher.on_in(namespace, EventKind::PointerDown, Phase::Stage, move |_| {
        let Some(stage) = weak.upgrade() else {
            return;
        };
        let can_close = {
            let draw = down_state.borrow();
            draw.committed.len() >= 3
                && draw
                    .shape
                    .as_ref()
                    .is_some_and(|shape| shape.borrow().is_point_active())
        };
        if can_close {
            close_and_resolve(&down_state, &down_settler, &stage);
            return;
        }
        down_state.borrow_mut().init = true;
    }));

    // Up: commit the vertex under the pointer
    let (up_state, weak) = (Rc::clone(&state), live.downgrade());
    bag.push(dispatcher.on_in(namespace, EventKind::PointerUp, Phase::Stage, move |event| {
        let (Some(stage), Some(pointer)) = (weak.upgrade(), event.pointer()) else {
            return;
        };
        let mut draw = up_state.borrow_mut();
        if !std::mem::take(&mut draw.init) {
            return;
        }
        let Some(handle) = draw.shape.clone() else {
            return;
        };

        let mut shape = handle.borrow_mut();
        if shape.points().len() <= 1 {
            let at = stage.absolute(pointer);
            shape.set_points(vec![at]);
        }
        draw.committed = shape.points().to_vec();
        log::trace!("Polygon vertex {} committed", draw.committed.len());
        drop(shape);
        drop(draw);
        stage.request_redraw();
    }));

    // Move: preview the next edge, snapping to vertex 0 when close enough
    let (move_state, weak) = (Rc::clone(&state), live.downgrade());
    bag.push(dispatcher.on_in(namespace, EventKind::PointerMove, Phase::Stage, move |event| {
        let (Some(stage), Some(pointer)) = (weak.upgrade(), event.pointer()) else {
            return;
        };
        let (handle, mut points) = {
            let draw = move_state.borrow();
            match (&draw.shape, draw.committed.is_empty()) {
                (Some(shape), false) => (shape.clone(), draw.committed.clone()),
                _ => return,
            }
        };

        let at = stage.absolute(pointer);
        let first = points[0];
        let mut shape = handle.borrow_mut();
        if !shape.is_closed() {
            let active = points.len() >= 3 && at.distance_to(&first) < shape.radius() + CLOSE_SNAP_MARGIN;
            shape.set_point_active(active);
        }
        points.push(if shape.is_point_active() { first } else { at });
        shape.set_points(points);
        drop(shape);
        stage.request_redraw();
    }));

    // Key up: close with the close key once two vertices exist
    let weak = live.downgrade();
    bag.push(dispatcher.on_in(namespace, EventKind::KeyUp, Phase::Window, move |event| {
        let (Some(stage), Some(key)) = (weak.upgrade(), event.key()) else {
            return;
        };
        if !key.key.matches(&close_key) {
            return;
        }
        let committed = state.borrow().committed.len();
        if committed < 2 {
            log::debug!("Close key ignored with {} committed vertices", committed);
            return;
        }
        close_and_resolve(&state, &settler, &stage);
    }));

    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputEvent, KeyEvent, PointerEvent};
    use futures::FutureExt;

    fn feed(stage: &Stage, event: InputEvent) {
        stage.dispatch(Phase::Stage, &event);
        stage.dispatch(Phase::Window, &event);
    }

    fn click(stage: &Stage, x: f32, y: f32) {
        feed(stage, InputEvent::PointerMove(PointerEvent::at(x, y)));
        feed(stage, InputEvent::PointerDown(PointerEvent::at(x, y)));
        feed(stage, InputEvent::PointerUp(PointerEvent::at(x, y)));
    }

    fn painter(stage: &Stage) -> PolygonPainter {
        PolygonPainter::new(stage, Color::rgb(0, 0, 0))
    }

    #[test]
    fn test_close_key_keeps_committed_vertices() {
        let stage = Stage::default();
        let painter = painter(&stage);
        let mut action = painter.draw_one();
        let mut result = action.get_result();
        assert_eq!(stage.shape_count(LayerKind::Staging), 1);

        click(&stage, 10.0, 10.0);
        click(&stage, 100.0, 10.0);
        click(&stage, 100.0, 100.0);
        feed(&stage, InputEvent::PointerMove(PointerEvent::at(50.0, 80.0)));
        assert!((&mut result).now_or_never().is_none());
        feed(&stage, InputEvent::KeyUp(KeyEvent::plain(Key::Space)));

        let polygon = result.now_or_never().unwrap().unwrap();
        let shape = polygon.borrow();
        assert!(shape.is_closed());
        assert_eq!(
            shape.points(),
            &[
                Point::new(10.0, 10.0),
                Point::new(100.0, 10.0),
                Point::new(100.0, 100.0)
            ]
        );
        assert_eq!(stage.shape_count(LayerKind::Staging), 0);
        assert_eq!(
            stage
                .dispatcher()
                .listener_count_in(&painter.last_namespace().unwrap()),
            0
        );
    }

    #[test]
    fn test_close_key_without_preview_keeps_last_vertex() {
        let stage = Stage::default();
        let mut action = painter(&stage).draw_one();
        let result = action.get_result();

        feed(&stage, InputEvent::PointerDown(PointerEvent::at(10.0, 10.0)));
        feed(&stage, InputEvent::PointerUp(PointerEvent::at(10.0, 10.0)));
        click(&stage, 60.0, 10.0);
        feed(&stage, InputEvent::KeyUp(KeyEvent::plain(Key::Space)));

        let polygon = result.now_or_never().unwrap().unwrap();
        assert_eq!(polygon.borrow().points().len(), 2);
    }

    #[test]
    fn test_close_key_ignored_below_two_vertices() {
        let stage = Stage::default();
        let mut action = painter(&stage).draw_one();
        let mut result = action.get_result();

        click(&stage, 10.0, 10.0);
        feed(&stage, InputEvent::KeyUp(KeyEvent::plain(Key::Space)));
        assert!((&mut result).now_or_never().is_none());
        feed(&stage, InputEvent::KeyUp(KeyEvent::plain(Key::Enter)));
        assert!(result.now_or_never().is_none());
    }

    #[test]
    fn test_press_on_highlighted_first_vertex_closes() {
        let stage = Stage::default();
        let mut action = painter(&stage).draw_one();
        let result = action.get_result();

        click(&stage, 10.0, 10.0);
        click(&stage, 100.0, 10.0);
        click(&stage, 100.0, 100.0);

        feed(&stage, InputEvent::PointerMove(PointerEvent::at(14.0, 13.0)));
        let handle = stage.shapes(LayerKind::Staging)[0].as_polygon().cloned().unwrap();
        assert!(handle.borrow().is_point_active());
        assert_eq!(handle.borrow().points()[3], Point::new(10.0, 10.0));

        feed(&stage, InputEvent::PointerDown(PointerEvent::at(14.0, 13.0)));
        let polygon = result.now_or_never().unwrap().unwrap();
        assert!(polygon.borrow().is_closed());
        assert!(!polygon.borrow().is_point_active());
        assert_eq!(polygon.borrow().points().len(), 3);
    }

    #[test]
    fn test_stray_release_is_ignored() {
        let stage = Stage::default();
        let mut action = painter(&stage).draw_one();
        let _result = action.get_result();

        feed(&stage, InputEvent::PointerUp(PointerEvent::at(30.0, 30.0)));
        let handle = stage.shapes(LayerKind::Staging)[0].as_polygon().cloned().unwrap();
        assert!(handle.borrow().points().is_empty());
    }

    #[test]
    fn test_dispose_removes_in_progress_polygon() {
        let stage = Stage::default();
        let mut action = painter(&stage).draw_one();
        let result = action.get_result();
        click(&stage, 10.0, 10.0);

        action.dispose(None);
        assert_eq!(stage.shape_count(LayerKind::Staging), 0);
        assert_eq!(stage.dispatcher().listener_count(), 0);
        assert!(matches!(
            result.now_or_never(),
            Some(Err(ActionError::Cancelled { .. }))
        ));
    }
}
