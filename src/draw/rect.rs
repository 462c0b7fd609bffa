use std::cell::RefCell;
use std::rc::Rc;

use crate::action::{Action, Settler};
use crate::dispatch::{Namespace, Phase, Subscriptions};
use crate::error::ActionError;
use crate::geometry::{Point, Rect};
use crate::input::EventKind;
use crate::palette::Color;
use crate::shape::{RectHandle, RectShape, ShapeId, ShapeMeta};
use crate::stage::{LayerKind, Stage, WeakStage};

/// Draws one rectangle per action by a primary-button drag.
#[derive(Debug)]
pub struct RectPainter {
    stage: Stage,
    color: Color,
    meta: ShapeMeta,
    namespace: RefCell<Option<Namespace>>,
}

#[derive(Debug, Default)]
struct RectDraw {
    start: Option<Point>,
    preview: Option<RectHandle>,
}

impl RectDraw {
    /// Forget the gesture and hand back the preview, if any.
    fn reset(&mut self) -> Option<RectHandle> {
        self.start = None;
        self.preview.take()
    }
}

fn discard_preview(stage: &WeakStage, preview: Option<RectHandle>) {
    if let (Some(stage), Some(preview)) = (stage.upgrade(), preview) {
        stage.remove_shape(&preview.id());
    }
}

impl RectPainter {
    pub fn new(stage: &Stage, color: Color) -> Self {
        Self {
            stage: stage.clone(),
            color,
            meta: ShapeMeta::default(),
            namespace: RefCell::new(None),
        }
    }

    /// Tags every drawn rect carries.
    pub fn with_meta(mut self, meta: ShapeMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Namespace of the most recent draw's listeners.
    pub fn last_namespace(&self) -> Option<Namespace> {
        self.namespace.borrow().clone()
    }

    /// Arm a single rect draw. Nothing is registered until the result is
    /// requested.
    pub fn draw_one(&self) -> Action<RectHandle> {
        let namespace = Namespace::fresh("rect-draw");
        *self.namespace.borrow_mut() = Some(namespace.clone());

        let state = Rc::new(RefCell::new(RectDraw::default()));
        let listeners = Rc::new(RefCell::new(Subscriptions::new()));
        let stage = self.stage.downgrade();

        let producer = {
            let (state, listeners, stage) = (Rc::clone(&state), Rc::clone(&listeners), stage.clone());
            let (color, meta) = (self.color, self.meta.clone());
            move |settler: Settler<RectHandle>| {
                let Some(live) = stage.upgrade() else {
                    settler.reject(ActionError::Failed("stage is gone".to_string()));
                    return;
                };
                let bag = bind_rect_listeners(&live, &namespace, state, settler, color, meta);
                *listeners.borrow_mut() = bag;
                log::debug!("Rect draw armed in {}", namespace);
            }
        };

        let cancel_state = Rc::clone(&state);
        let cancel_stage = stage.clone();
        Action::new("draw rect", producer)
            .on_cancel(move |_| {
                let preview = cancel_state.borrow_mut().reset();
                discard_preview(&cancel_stage, preview);
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

fn bind_rect_listeners(
    live: &Stage,
    namespace: &Namespace,
    state: Rc<RefCell<RectDraw>>,
    settler: Settler<RectHandle>,
    color: Color,
    meta: ShapeMeta,
) -> Subscriptions {
    let dispatcher = live.dispatcher();
    let mut bag = Subscriptions::new();

    // Down: only a plain primary press starts the gesture
    let (down_state, down_settler, weak) = (Rc::clone(&state), settler.clone(), live.downgrade());
    bag.push(dispatcher.on_in(namespace, EventKind::PointerDown, Phase::Stage, move |event| {
        let (Some(stage), Some(pointer)) = (weak.upgrade(), event.pointer()) else {
            return;
        };
        if !pointer.is_only_left() {
            let preview = down_state.borrow_mut().reset();
            discard_preview(&weak, preview);
            stage.request_redraw();
            down_settler.reject(ActionError::InvalidInput("invalid button".to_string()));
            return;
        }
        let start = stage.absolute(pointer);
        log::trace!("Rect draw started at ({:.1}, {:.1})", start.x, start.y);
        down_state.borrow_mut().start = Some(start);
    }));

    // Move: rebuild the preview from the fixed start corner
    let (move_state, move_settler, weak) = (Rc::clone(&state), settler.clone(), live.downgrade());
    bag.push(dispatcher.on_in(namespace, EventKind::PointerMove, Phase::Stage, move |event| {
        let (Some(stage), Some(pointer)) = (weak.upgrade(), event.pointer()) else {
            return;
        };
        let start = move_state.borrow().start;
        let Some(start) = start else {
            return;
        };
        if !pointer.is_only_left() {
            move_settler.reject(ActionError::InvalidInput("invalid button".to_string()));
            return;
        }

        let rect = Rect::from_corners(start, stage.absolute(pointer));
        let existing = move_state.borrow().preview.clone();
        match existing {
            Some(preview) => preview.borrow_mut().set_rect(rect),
            None => {
                let shape = RectShape::new(ShapeId::generate(), rect, color).with_meta(meta.clone());
                let preview = RectHandle::new(shape);
                stage.add_shape(LayerKind::Staging, preview.clone().into());
                move_state.borrow_mut().preview = Some(preview);
            }
        }
        stage.request_redraw();
    }));

    // Up: resolve with the preview, or fail if nothing was dragged
    let weak = live.downgrade();
    bag.push(dispatcher.on_in(namespace, EventKind::PointerUp, Phase::Stage, move |_| {
        let preview = state.borrow_mut().reset();
        match preview {
            Some(preview) => {
                if let Some(stage) = weak.upgrade() {
                    stage.remove_shape(&preview.id());
                }
                let r = preview.borrow().rect();
                log::debug!(
                    "Rect drawn: ({:.1}, {:.1}) {:.1}x{:.1}",
                    r.x,
                    r.y,
                    r.width,
                    r.height
                );
                settler.resolve(preview);
            }
            None => {
                settler.reject(ActionError::DrawFailed("no rectangle was drawn".to_string()));
            }
        }
    }));

    bag
}
