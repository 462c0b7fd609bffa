use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use super::{Editable, FillStyle, ShapeId, ShapeMeta, ShapeStatus, StatusObservable};
use crate::dispatch::{Phase, Subscriptions};
use crate::geometry::{ImageBounds, Point, Rect};
use crate::input::{EventKind, InputEvent, ShapePart};
use crate::palette::Color;
use crate::stage::Stage;

/// Rect vertex handles, clockwise from the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Corner::TopLeft),
            1 => Some(Corner::TopRight),
            2 => Some(Corner::BottomRight),
            3 => Some(Corner::BottomLeft),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Corner::TopLeft => Corner::BottomRight,
            Corner::TopRight => Corner::BottomLeft,
            Corner::BottomRight => Corner::TopLeft,
            Corner::BottomLeft => Corner::TopRight,
        }
    }

    pub fn of(&self, rect: &Rect) -> Point {
        let [tl, tr, br, bl] = rect.corners();
        match self {
            Corner::TopLeft => tl,
            Corner::TopRight => tr,
            Corner::BottomRight => br,
            Corner::BottomLeft => bl,
        }
    }
}

/// Selection state of a rect inside its group (link mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Selected,
    #[default]
    Unselected,
}

impl GroupStatus {
    /// Selected group members are drawn with a dashed outline.
    pub fn dashed(&self) -> bool {
        matches!(self, GroupStatus::Selected)
    }
}

/// Every attribute of a rect that a snapshot captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectAttrs {
    pub id: ShapeId,
    pub rect: Rect,
    pub color: Color,
    pub meta: ShapeMeta,
    pub status: ShapeStatus,
    /// Label drawn at the top-left corner
    pub text: Option<String>,
    pub group_status: GroupStatus,
    pub draggable: bool,
}

/// Edit sub-state of a rect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RectEditState {
    NotEditing,
    Editing,
    /// A vertex handle is held; `fixed` is the opposite corner.
    Resizing { fixed: Point },
    /// The body is held; `last` is the previous pointer sample.
    Dragging { last: Point },
}

/// An axis-aligned rectangle label.
#[derive(Debug)]
pub struct RectShape {
    attrs: RectAttrs,
    committed: bool,
    edit: RectEditState,
    previous_status: ShapeStatus,
    hovering: bool,
    status_listeners: Subscriptions,
    edit_listeners: Subscriptions,
}

impl RectShape {
    pub fn new(id: ShapeId, rect: Rect, color: Color) -> Self {
        Self {
            attrs: RectAttrs {
                id,
                rect,
                color,
                meta: ShapeMeta::default(),
                status: ShapeStatus::Normal,
                text: None,
                group_status: GroupStatus::Unselected,
                draggable: false,
            },
            committed: false,
            edit: RectEditState::NotEditing,
            previous_status: ShapeStatus::Normal,
            hovering: false,
            status_listeners: Subscriptions::new(),
            edit_listeners: Subscriptions::new(),
        }
    }

    pub fn with_meta(mut self, meta: ShapeMeta) -> Self {
        self.attrs.meta = meta;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.attrs.text = Some(text.into());
        self
    }

    pub fn id(&self) -> &ShapeId {
        &self.attrs.id
    }

    pub fn attrs(&self) -> &RectAttrs {
        &self.attrs
    }

    /// Apply a snapshot. The id is never overwritten.
    pub fn restore(&mut self, mut attrs: RectAttrs) {
        attrs.id = self.attrs.id.clone();
        self.attrs = attrs;
    }

    pub fn rect(&self) -> Rect {
        self.attrs.rect
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.attrs.rect = rect;
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.attrs.rect.x += dx;
        self.attrs.rect.y += dy;
    }

    pub fn color(&self) -> Color {
        self.attrs.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.attrs.color = color;
    }

    pub fn meta(&self) -> &ShapeMeta {
        &self.attrs.meta
    }

    pub fn type_name(&self) -> &str {
        &self.attrs.meta.type_name
    }

    pub fn group_id(&self) -> Option<&str> {
        self.attrs.meta.group_id.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.attrs.text.as_deref()
    }

    pub fn set_text(&mut self, text: Option<String>) {
        self.attrs.text = text;
    }

    pub fn group_status(&self) -> GroupStatus {
        self.attrs.group_status
    }

    pub fn set_group_status(&mut self, status: GroupStatus) {
        self.attrs.group_status = status;
    }

    pub fn is_draggable(&self) -> bool {
        self.attrs.draggable
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub(crate) fn set_committed(&mut self, committed: bool) {
        self.committed = committed;
    }

    pub fn status(&self) -> ShapeStatus {
        self.attrs.status
    }

    pub fn set_status(&mut self, status: ShapeStatus) {
        if self.attrs.status != status {
            log::trace!("Rect {} status {:?} -> {:?}", self.attrs.id, self.attrs.status, status);
        }
        self.attrs.status = status;
    }

    pub fn fill_style(&self) -> FillStyle {
        self.attrs.status.fill_style(self.attrs.color)
    }

    pub fn out_range(&self, bounds: &ImageBounds) -> bool {
        !bounds.contains_rect(&self.attrs.rect)
    }

    /// Rounded corner coordinates as `"x,y x2,y2 "`.
    pub fn display_text(&self) -> String {
        let r = self.attrs.rect;
        format!(
            "{},{} {},{} ",
            r.x.round(),
            r.y.round(),
            (r.x + r.width).round(),
            (r.y + r.height).round()
        )
    }

    // ------------------------------------------------------------------
    // Status transitions
    // ------------------------------------------------------------------

    /// Pointer entered the shape. Returns whether the status changed.
    pub fn pointer_enter(&mut self) -> bool {
        if self.hovering || self.attrs.status == ShapeStatus::Active {
            return false;
        }
        self.hovering = true;
        self.previous_status = self.attrs.status;
        self.set_status(ShapeStatus::Hover);
        true
    }

    /// Pointer left the shape: back to the status held before entering.
    pub fn pointer_leave(&mut self) -> bool {
        let was_hovering = std::mem::replace(&mut self.hovering, false);
        if !was_hovering || self.attrs.status == ShapeStatus::Active {
            return false;
        }
        self.set_status(self.previous_status);
        true
    }

    /// Click on the shape activates it once committed.
    pub fn click(&mut self) -> bool {
        if !self.committed || self.attrs.status == ShapeStatus::Active {
            return false;
        }
        self.set_status(ShapeStatus::Active);
        true
    }

    /// Click on another shape or on empty canvas.
    pub fn click_elsewhere(&mut self) -> bool {
        if self.attrs.status != ShapeStatus::Active {
            return false;
        }
        self.previous_status = ShapeStatus::Normal;
        self.set_status(ShapeStatus::Normal);
        true
    }

    // ------------------------------------------------------------------
    // Edit gestures
    // ------------------------------------------------------------------

    pub fn edit_state(&self) -> RectEditState {
        self.edit
    }

    fn begin_edit(&mut self) -> bool {
        if self.edit != RectEditState::NotEditing {
            return false;
        }
        self.edit = RectEditState::Editing;
        true
    }

    /// Pointer pressed on part of the shape while editing.
    pub fn press(&mut self, part: ShapePart, at: Point) -> bool {
        if self.edit != RectEditState::Editing {
            return false;
        }
        match part {
            ShapePart::Vertex(index) => {
                let Some(corner) = Corner::from_index(index) else {
                    log::warn!("Rect {} has no vertex {}", self.attrs.id, index);
                    return false;
                };
                let fixed = corner.opposite().of(&self.attrs.rect);
                log::debug!(
                    "Rect {} resize from {:?}, fixed corner ({:.1}, {:.1})",
                    self.attrs.id,
                    corner,
                    fixed.x,
                    fixed.y
                );
                self.edit = RectEditState::Resizing { fixed };
            }
            ShapePart::Body => {
                self.attrs.draggable = true;
                self.edit = RectEditState::Dragging { last: at };
            }
        }
        true
    }

    /// Pointer moved while a handle or the body is held.
    pub fn drag_to(&mut self, at: Point) -> bool {
        match self.edit {
            RectEditState::Resizing { fixed } => {
                self.attrs.rect = Rect::from_corners(at, fixed);
                true
            }
            RectEditState::Dragging { last } => {
                self.translate(at.x - last.x, at.y - last.y);
                self.edit = RectEditState::Dragging { last: at };
                true
            }
            RectEditState::NotEditing | RectEditState::Editing => false,
        }
    }

    /// Pointer released: the gesture ends, editing continues.
    pub fn release(&mut self) -> bool {
        match self.edit {
            RectEditState::Resizing { .. } | RectEditState::Dragging { .. } => {
                self.edit = RectEditState::Editing;
                true
            }
            RectEditState::NotEditing | RectEditState::Editing => false,
        }
    }

    fn finish_edit(&mut self) -> Subscriptions {
        self.edit = RectEditState::NotEditing;
        self.attrs.draggable = false;
        self.edit_listeners.take()
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Shared handle to a rect owned by a stage layer.
#[derive(Debug, Clone)]
pub struct RectHandle {
    id: ShapeId,
    shape: Rc<RefCell<RectShape>>,
}

impl RectHandle {
    pub fn new(shape: RectShape) -> Self {
        Self {
            id: shape.id().clone(),
            shape: Rc::new(RefCell::new(shape)),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id.clone()
    }

    pub fn borrow(&self) -> Ref<'_, RectShape> {
        self.shape.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, RectShape> {
        self.shape.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &RectHandle) -> bool {
        Rc::ptr_eq(&self.shape, &other.shape)
    }

    /// End editing, release status listeners and remove from the stage.
    pub fn destroy(&self, stage: &Stage) {
        self.end_edit();
        self.unbind_status_events();
        stage.remove_shape(&self.id);
        stage.request_redraw();
        log::debug!("Destroyed rect {}", self.id);
    }
}

impl Editable for RectHandle {
    fn start_edit(&self, stage: &Stage) {
        if !self.shape.borrow_mut().begin_edit() {
            log::debug!("Rect {} is already being edited", self.id);
            return;
        }
        log::debug!("Rect {} entered edit mode", self.id);

        let dispatcher = stage.dispatcher();
        let mut listeners = Subscriptions::new();

        let (weak, id, weak_stage) = (Rc::downgrade(&self.shape), self.id.clone(), stage.downgrade());
        listeners.push(dispatcher.on(EventKind::PointerDown, Phase::Stage, move |event| {
            let (Some(shape), Some(stage)) = (weak.upgrade(), weak_stage.upgrade()) else {
                return;
            };
            let Some(pointer) = event.pointer() else {
                return;
            };
            let Some(target) = pointer.target.as_ref().filter(|t| t.shape == id) else {
                return;
            };
            let at = stage.absolute(pointer);
            shape.borrow_mut().press(target.part, at);
        }));

        let (weak, weak_stage) = (Rc::downgrade(&self.shape), stage.downgrade());
        listeners.push(dispatcher.on(EventKind::PointerMove, Phase::Window, move |event| {
            let (Some(shape), Some(stage), Some(pointer)) =
                (weak.upgrade(), weak_stage.upgrade(), event.pointer())
            else {
                return;
            };
            let moved = shape.borrow_mut().drag_to(stage.absolute(pointer));
            if moved {
                stage.request_redraw();
            }
        }));

        let weak = Rc::downgrade(&self.shape);
        listeners.push(dispatcher.on(EventKind::PointerUp, Phase::Window, move |_| {
            if let Some(shape) = weak.upgrade() {
                shape.borrow_mut().release();
            }
        }));

        self.shape.borrow_mut().edit_listeners = listeners;
    }

    fn end_edit(&self) {
        let released = self.shape.borrow_mut().finish_edit();
        if !released.is_empty() {
            log::debug!("Rect {} left edit mode", self.id);
        }
        drop(released);
    }

    fn is_editing(&self) -> bool {
        self.shape.borrow().edit != RectEditState::NotEditing
    }
}

impl StatusObservable for RectHandle {
    fn bind_status_events(&self, stage: &Stage) {
        if !self.shape.borrow().status_listeners.is_empty() {
            return;
        }
        let dispatcher = stage.dispatcher();
        let mut listeners = Subscriptions::new();

        for kind in [EventKind::PointerEnter, EventKind::PointerLeave, EventKind::Click] {
            let (weak, id, weak_stage) =
                (Rc::downgrade(&self.shape), self.id.clone(), stage.downgrade());
            listeners.push(dispatcher.on(kind, Phase::Stage, move |event| {
                let Some(shape) = weak.upgrade() else {
                    return;
                };
                let on_self = event.target().is_some_and(|t| t.shape == id);
                let changed = match event {
                    InputEvent::PointerEnter(_) if on_self => shape.borrow_mut().pointer_enter(),
                    InputEvent::PointerLeave(_) if on_self => shape.borrow_mut().pointer_leave(),
                    InputEvent::Click(_) if on_self => shape.borrow_mut().click(),
                    InputEvent::Click(_) => shape.borrow_mut().click_elsewhere(),
                    _ => false,
                };
                if changed {
                    if let Some(stage) = weak_stage.upgrade() {
                        stage.request_redraw();
                    }
                }
            }));
        }

        self.shape.borrow_mut().status_listeners = listeners;
    }

    fn unbind_status_events(&self) {
        let released = self.shape.borrow_mut().status_listeners.take();
        drop(released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{HitTarget, PointerEvent};
    use crate::stage::LayerKind;

    fn rect_at(x: f32, y: f32, w: f32, h: f32) -> RectShape {
        RectShape::new(ShapeId::from("r1"), Rect::new(x, y, w, h), Color::rgb(255, 0, 0))
    }

    fn committed(stage: &Stage, shape: RectShape) -> RectHandle {
        let handle = RectHandle::new(shape);
        handle.borrow_mut().set_committed(true);
        stage.add_shape(LayerKind::Mark, handle.clone().into());
        handle
    }

    fn feed(stage: &Stage, event: InputEvent) {
        stage.dispatch(Phase::Stage, &event);
        stage.dispatch(Phase::Window, &event);
    }

    #[test]
    fn test_hover_restores_previous_status() {
        let mut shape = rect_at(0.0, 0.0, 10.0, 10.0);
        assert!(shape.pointer_enter());
        assert_eq!(shape.status(), ShapeStatus::Hover);
        assert!(!shape.pointer_enter());
        assert!(shape.pointer_leave());
        assert_eq!(shape.status(), ShapeStatus::Normal);
    }

    #[test]
    fn test_click_requires_commit_and_active_ignores_hover() {
        let mut shape = rect_at(0.0, 0.0, 10.0, 10.0);
        assert!(!shape.click());
        shape.set_committed(true);
        assert!(shape.click());
        assert_eq!(shape.status(), ShapeStatus::Active);

        assert!(!shape.pointer_enter());
        assert!(!shape.pointer_leave());
        assert_eq!(shape.status(), ShapeStatus::Active);

        assert!(shape.click_elsewhere());
        assert_eq!(shape.status(), ShapeStatus::Normal);
    }

    #[test]
    fn test_resize_from_bottom_right_past_fixed_corner_normalizes() {
        let mut shape = rect_at(10.0, 10.0, 40.0, 30.0);
        assert!(shape.begin_edit());
        assert!(shape.press(ShapePart::Vertex(2), Point::new(50.0, 40.0)));
        assert_eq!(
            shape.edit_state(),
            RectEditState::Resizing {
                fixed: Point::new(10.0, 10.0)
            }
        );

        shape.drag_to(Point::new(0.0, 5.0));
        assert_eq!(shape.rect(), Rect::new(0.0, 5.0, 10.0, 5.0));
        assert!(shape.rect().width >= 0.0 && shape.rect().height >= 0.0);

        assert!(shape.release());
        assert_eq!(shape.edit_state(), RectEditState::Editing);
    }

    #[test]
    fn test_body_drag_translates() {
        let mut shape = rect_at(10.0, 10.0, 20.0, 20.0);
        shape.begin_edit();
        shape.press(ShapePart::Body, Point::new(15.0, 15.0));
        assert!(shape.is_draggable());
        shape.drag_to(Point::new(20.0, 17.0));
        shape.drag_to(Point::new(25.0, 19.0));
        assert_eq!(shape.rect(), Rect::new(20.0, 14.0, 20.0, 20.0));
    }

    #[test]
    fn test_press_ignored_when_not_editing() {
        let mut shape = rect_at(0.0, 0.0, 10.0, 10.0);
        assert!(!shape.press(ShapePart::Body, Point::default()));
        assert!(!shape.drag_to(Point::new(5.0, 5.0)));
        assert_eq!(shape.rect(), Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_out_range() {
        let bounds = ImageBounds::new(100.0, 100.0);
        assert!(!rect_at(0.0, 0.0, 100.0, 100.0).out_range(&bounds));
        assert!(rect_at(-1.0, 0.0, 10.0, 10.0).out_range(&bounds));
        assert!(rect_at(95.0, 0.0, 10.0, 10.0).out_range(&bounds));
        assert!(rect_at(0.0, 95.0, 10.0, 10.0).out_range(&bounds));
    }

    #[test]
    fn test_display_text_rounds() {
        let shape = rect_at(10.4, 9.6, 20.2, 30.0);
        assert_eq!(shape.display_text(), "10,10 31,40 ");
    }

    #[test]
    fn test_edit_listeners_drive_resize_and_release() {
        let stage = Stage::default();
        let handle = committed(&stage, rect_at(10.0, 10.0, 40.0, 30.0));
        let baseline = stage.dispatcher().listener_count();

        handle.start_edit(&stage);
        handle.start_edit(&stage);
        assert!(handle.is_editing());
        assert_eq!(stage.dispatcher().listener_count(), baseline + 3);

        feed(&stage, InputEvent::PointerDown(PointerEvent::at(10.0, 10.0).on(HitTarget::vertex("r1", 0))));
        feed(&stage, InputEvent::PointerMove(PointerEvent::at(60.0, 45.0)));
        assert_eq!(handle.borrow().rect(), Rect::new(50.0, 40.0, 10.0, 5.0));
        feed(&stage, InputEvent::PointerUp(PointerEvent::at(60.0, 45.0)));
        assert_eq!(handle.borrow().edit_state(), RectEditState::Editing);

        // Moves after release do nothing
        feed(&stage, InputEvent::PointerMove(PointerEvent::at(0.0, 0.0)));
        assert_eq!(handle.borrow().rect(), Rect::new(50.0, 40.0, 10.0, 5.0));

        handle.end_edit();
        assert!(!handle.is_editing());
        assert!(!handle.borrow().is_draggable());
        assert_eq!(stage.dispatcher().listener_count(), baseline);
    }

    #[test]
    fn test_status_listeners_follow_pointer() {
        let stage = Stage::default();
        let handle = committed(&stage, rect_at(0.0, 0.0, 10.0, 10.0));
        handle.bind_status_events(&stage);

        feed(&stage, InputEvent::PointerEnter(HitTarget::body("r1")));
        assert_eq!(handle.borrow().status(), ShapeStatus::Hover);
        feed(&stage, InputEvent::Click(PointerEvent::at(5.0, 5.0).on(HitTarget::body("r1"))));
        assert_eq!(handle.borrow().status(), ShapeStatus::Active);
        feed(&stage, InputEvent::PointerLeave(HitTarget::body("r1")));
        assert_eq!(handle.borrow().status(), ShapeStatus::Active);
        feed(&stage, InputEvent::Click(PointerEvent::at(500.0, 500.0)));
        assert_eq!(handle.borrow().status(), ShapeStatus::Normal);

        handle.unbind_status_events();
        feed(&stage, InputEvent::PointerEnter(HitTarget::body("r1")));
        assert_eq!(handle.borrow().status(), ShapeStatus::Normal);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let stage = Stage::default();
        let handle = committed(&stage, rect_at(0.0, 0.0, 10.0, 10.0));
        handle.bind_status_events(&stage);
        handle.start_edit(&stage);

        handle.destroy(&stage);
        assert_eq!(stage.dispatcher().listener_count(), 0);
        assert_eq!(stage.shape_count(LayerKind::Mark), 0);
        assert!(!handle.is_editing());
    }
}
