//! The scene collaborator: layers, view transform, dispatch and notifications.
//!
//! A [`Stage`] is a cheap, clonable handle. Painters, shapes and controllers
//! keep a clone and reach the staging ("buffer") and committed ("mark")
//! layers through it. Borrows of stage state never outlive a method call, so
//! listeners may call back into the stage freely.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use futures::channel::mpsc::UnboundedReceiver;

use crate::dispatch::{EventDispatcher, Phase};
use crate::geometry::{ImageBounds, Point, ViewTransform};
use crate::input::{InputEvent, PointerEvent};
use crate::notify::{Notifier, SceneEvent};
use crate::shape::{ShapeHandle, ShapeId};

/// Which drawing surface a shape belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// In-progress shapes that are not committed yet.
    Staging,
    /// Committed, selectable shapes.
    Mark,
}

#[derive(Debug)]
struct Layer {
    shapes: Vec<ShapeHandle>,
    listening: bool,
}

impl Layer {
    fn new(listening: bool) -> Self {
        Self {
            shapes: Vec::new(),
            listening,
        }
    }

    fn position(&self, id: &ShapeId) -> Option<usize> {
        self.shapes.iter().position(|s| &s.id() == id)
    }
}

#[derive(Debug)]
struct StageInner {
    dispatcher: EventDispatcher,
    staging: RefCell<Layer>,
    mark: RefCell<Layer>,
    bounds: Cell<ImageBounds>,
    view: Cell<ViewTransform>,
    pointer: Cell<Option<Point>>,
    drawing: Cell<bool>,
    redraws: Cell<u64>,
    notifier: Notifier,
}

/// Shared handle to the stage.
#[derive(Debug, Clone)]
pub struct Stage {
    inner: Rc<StageInner>,
}

impl Stage {
    pub fn new(bounds: ImageBounds) -> Self {
        Self {
            inner: Rc::new(StageInner {
                dispatcher: EventDispatcher::new(),
                staging: RefCell::new(Layer::new(false)),
                mark: RefCell::new(Layer::new(true)),
                bounds: Cell::new(bounds),
                view: Cell::new(ViewTransform::identity()),
                pointer: Cell::new(None),
                drawing: Cell::new(false),
                redraws: Cell::new(0),
                notifier: Notifier::new(),
            }),
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// A handle that does not keep the stage alive. Listeners registered on
    /// the stage's own dispatcher capture this to avoid reference cycles.
    pub fn downgrade(&self) -> WeakStage {
        WeakStage(Rc::downgrade(&self.inner))
    }

    // ------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------

    pub fn bounds(&self) -> ImageBounds {
        self.inner.bounds.get()
    }

    pub fn set_bounds(&self, bounds: ImageBounds) {
        log::debug!("Image bounds set to {}x{}", bounds.width, bounds.height);
        self.inner.bounds.set(bounds);
    }

    pub fn view(&self) -> ViewTransform {
        self.inner.view.get()
    }

    pub fn set_view(&self, view: ViewTransform) {
        self.inner.view.set(view);
        self.request_redraw();
    }

    /// Map a screen position into image space.
    pub fn to_image(&self, screen: Point) -> Point {
        self.view().to_image(screen)
    }

    /// Image-space position of a pointer event.
    pub fn absolute(&self, event: &PointerEvent) -> Point {
        self.to_image(event.position)
    }

    /// Image-space position of the last pointer sample, or the origin if the
    /// pointer has not been seen yet.
    pub fn pointer_position(&self) -> Point {
        self.inner
            .pointer
            .get()
            .map(|p| self.to_image(p))
            .unwrap_or_default()
    }

    /// Last pointer sample in screen space.
    pub fn pointer_screen_position(&self) -> Option<Point> {
        self.inner.pointer.get()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Deliver an event to the listeners of one phase.
    ///
    /// Targets on layers that are not listening are cleared, and enter/leave
    /// events for such shapes are dropped, as if the pointer hit empty canvas.
    pub fn dispatch(&self, phase: Phase, event: &InputEvent) -> usize {
        if let (Phase::Stage, Some(pointer)) = (phase, event.pointer()) {
            self.inner.pointer.set(Some(pointer.position));
        }

        let target_muted = event
            .target()
            .and_then(|t| self.layer_of(&t.shape))
            .is_some_and(|layer| !self.is_listening(layer));

        if !target_muted {
            return self.inner.dispatcher.dispatch(phase, event);
        }

        match event {
            InputEvent::PointerEnter(_) | InputEvent::PointerLeave(_) => 0,
            _ => {
                let mut muted = event.clone();
                match &mut muted {
                    InputEvent::PointerDown(p)
                    | InputEvent::PointerMove(p)
                    | InputEvent::PointerUp(p)
                    | InputEvent::Click(p) => p.target = None,
                    _ => {}
                }
                self.inner.dispatcher.dispatch(phase, &muted)
            }
        }
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    fn layer(&self, kind: LayerKind) -> &RefCell<Layer> {
        match kind {
            LayerKind::Staging => &self.inner.staging,
            LayerKind::Mark => &self.inner.mark,
        }
    }

    /// Add a shape on top of a layer. A shape with the same id is replaced.
    pub fn add_shape(&self, kind: LayerKind, shape: ShapeHandle) {
        let id = shape.id();
        let replaced = {
            let mut layer = self.layer(kind).borrow_mut();
            let replaced = layer.position(&id).map(|i| layer.shapes.remove(i));
            layer.shapes.push(shape);
            replaced
        };
        if replaced.is_some() {
            log::debug!("Replaced shape {} on {:?} layer", id, kind);
        }
    }

    /// Remove a shape from whichever layer holds it.
    pub fn remove_shape(&self, id: &ShapeId) -> Option<ShapeHandle> {
        [LayerKind::Staging, LayerKind::Mark]
            .into_iter()
            .find_map(|kind| {
                let mut layer = self.layer(kind).borrow_mut();
                layer.position(id).map(|i| layer.shapes.remove(i))
            })
    }

    pub fn find(&self, id: &ShapeId) -> Option<ShapeHandle> {
        [LayerKind::Staging, LayerKind::Mark]
            .into_iter()
            .find_map(|kind| {
                let layer = self.layer(kind).borrow();
                layer.position(id).map(|i| layer.shapes[i].clone())
            })
    }

    pub fn layer_of(&self, id: &ShapeId) -> Option<LayerKind> {
        [LayerKind::Staging, LayerKind::Mark]
            .into_iter()
            .find(|kind| self.layer(*kind).borrow().position(id).is_some())
    }

    /// Shapes of a layer, bottom to top.
    pub fn shapes(&self, kind: LayerKind) -> Vec<ShapeHandle> {
        self.layer(kind).borrow().shapes.clone()
    }

    pub fn shape_count(&self, kind: LayerKind) -> usize {
        self.layer(kind).borrow().shapes.len()
    }

    /// Empty a layer and hand back what it held.
    pub fn take_shapes(&self, kind: LayerKind) -> Vec<ShapeHandle> {
        std::mem::take(&mut self.layer(kind).borrow_mut().shapes)
    }

    /// Move a shape to the top of its layer.
    pub fn raise_to_top(&self, id: &ShapeId) -> bool {
        let Some(kind) = self.layer_of(id) else {
            return false;
        };
        let mut layer = self.layer(kind).borrow_mut();
        match layer.position(id) {
            Some(i) => {
                let shape = layer.shapes.remove(i);
                layer.shapes.push(shape);
                true
            }
            None => false,
        }
    }

    pub fn set_listening(&self, kind: LayerKind, listening: bool) {
        self.layer(kind).borrow_mut().listening = listening;
    }

    pub fn is_listening(&self, kind: LayerKind) -> bool {
        self.layer(kind).borrow().listening
    }

    /// While drawing, committed shapes stop receiving pointer targets and the
    /// staging layer takes them instead.
    pub fn set_is_drawing(&self, drawing: bool) {
        if self.inner.drawing.replace(drawing) != drawing {
            log::debug!("Drawing mode {}", if drawing { "on" } else { "off" });
        }
        self.set_listening(LayerKind::Mark, !drawing);
        self.set_listening(LayerKind::Staging, drawing);
        self.request_redraw();
    }

    pub fn is_drawing(&self) -> bool {
        self.inner.drawing.get()
    }

    // ------------------------------------------------------------------
    // Rendering hooks and notifications
    // ------------------------------------------------------------------

    /// Ask the host to repaint. Counted so hosts and tests can observe it.
    pub fn request_redraw(&self) {
        self.inner.redraws.set(self.inner.redraws.get() + 1);
    }

    pub fn redraw_count(&self) -> u64 {
        self.inner.redraws.get()
    }

    pub fn emit(&self, event: SceneEvent) {
        self.inner.notifier.emit(event);
    }

    pub fn subscribe(&self) -> UnboundedReceiver<SceneEvent> {
        self.inner.notifier.subscribe()
    }
}

/// Non-owning stage handle.
#[derive(Debug, Clone)]
pub struct WeakStage(Weak<StageInner>);

impl WeakStage {
    pub fn upgrade(&self) -> Option<Stage> {
        self.0.upgrade().map(|inner| Stage { inner })
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new(ImageBounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Phase;
    use crate::geometry::Rect;
    use crate::input::{EventKind, HitTarget};
    use crate::palette::Color;
    use crate::shape::{RectHandle, RectShape};
    use std::cell::RefCell;

    fn rect(id: &str) -> ShapeHandle {
        let shape = RectShape::new(ShapeId::from(id), Rect::new(0.0, 0.0, 10.0, 10.0), Color::rgb(1, 2, 3));
        RectHandle::new(shape).into()
    }

    #[test]
    fn test_layers_add_find_remove() {
        let stage = Stage::default();
        stage.add_shape(LayerKind::Mark, rect("a"));
        stage.add_shape(LayerKind::Staging, rect("b"));
        stage.add_shape(LayerKind::Mark, rect("c"));

        assert_eq!(stage.layer_of(&ShapeId::from("b")), Some(LayerKind::Staging));
        assert_eq!(stage.shape_count(LayerKind::Mark), 2);
        assert!(stage.raise_to_top(&ShapeId::from("a")));
        let ids: Vec<ShapeId> = stage.shapes(LayerKind::Mark).iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![ShapeId::from("c"), ShapeId::from("a")]);

        assert!(stage.remove_shape(&ShapeId::from("a")).is_some());
        assert!(stage.find(&ShapeId::from("a")).is_none());
    }

    #[test]
    fn test_drawing_toggles_listening() {
        let stage = Stage::default();
        assert!(stage.is_listening(LayerKind::Mark));
        stage.set_is_drawing(true);
        assert!(!stage.is_listening(LayerKind::Mark));
        assert!(stage.is_listening(LayerKind::Staging));
        stage.set_is_drawing(false);
        assert!(stage.is_listening(LayerKind::Mark));
    }

    #[test]
    fn test_muted_layer_clears_targets() {
        let stage = Stage::default();
        stage.add_shape(LayerKind::Mark, rect("a"));
        let seen: Rc<RefCell<Vec<Option<HitTarget>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = stage
            .dispatcher()
            .on(EventKind::Click, Phase::Stage, move |e| {
                sink.borrow_mut().push(e.target().cloned())
            });

        let click = InputEvent::Click(PointerEvent::at(5.0, 5.0).on(HitTarget::body("a")));
        stage.dispatch(Phase::Stage, &click);
        stage.set_is_drawing(true);
        stage.dispatch(Phase::Stage, &click);
        assert_eq!(stage.dispatch(Phase::Stage, &InputEvent::PointerEnter(HitTarget::body("a"))), 0);

        assert_eq!(*seen.borrow(), vec![Some(HitTarget::body("a")), None]);
    }

    #[test]
    fn test_pointer_position_uses_view() {
        let stage = Stage::default();
        assert_eq!(stage.pointer_position(), Point::default());
        let mut view = ViewTransform::identity();
        view.scale = 2.0;
        stage.set_view(view);
        stage.dispatch(Phase::Stage, &InputEvent::PointerMove(PointerEvent::at(40.0, 10.0)));
        assert_eq!(stage.pointer_position(), Point::new(20.0, 5.0));
    }
}
