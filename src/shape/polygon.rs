use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use super::{Editable, FillStyle, ShapeId, ShapeMeta, ShapeStatus, StatusObservable};
use crate::dispatch::{Phase, Subscriptions};
use crate::geometry::{ImageBounds, Point};
use crate::input::{EventKind, InputEvent, ShapePart};
use crate::palette::Color;
use crate::stage::Stage;

/// Default vertex handle radius.
pub const DEFAULT_POINT_RADIUS: f32 = 6.0;

/// Every attribute of a polygon that a snapshot captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonAttrs {
    pub id: ShapeId,
    /// Translation applied to every local point
    pub offset: Point,
    /// Local vertex positions
    pub points: Vec<Point>,
    pub closed: bool,
    pub color: Color,
    pub meta: ShapeMeta,
    pub status: ShapeStatus,
    pub draggable: bool,
    /// Geometry writes are refused while false
    pub can_edit: bool,
    /// Highlight on vertex 0 while the pointer can close the polygon
    pub point_active: bool,
    pub radius: f32,
}

/// A polygon label, open while being drawn and closed once committed.
#[derive(Debug)]
pub struct PolygonShape {
    attrs: PolygonAttrs,
    editing: bool,
    drag_vertex: Option<usize>,
    drag_last: Option<Point>,
    status_listeners: Subscriptions,
    edit_listeners: Subscriptions,
}

impl PolygonShape {
    /// An empty, open polygon.
    pub fn new(id: ShapeId, color: Color) -> Self {
        Self {
            attrs: PolygonAttrs {
                id,
                offset: Point::default(),
                points: Vec::new(),
                closed: false,
                color,
                meta: ShapeMeta::default(),
                status: ShapeStatus::Normal,
                draggable: false,
                can_edit: true,
                point_active: false,
                radius: DEFAULT_POINT_RADIUS,
            },
            editing: false,
            drag_vertex: None,
            drag_last: None,
            status_listeners: Subscriptions::new(),
            edit_listeners: Subscriptions::new(),
        }
    }

    /// A closed polygon from absolute points.
    pub fn closed(id: ShapeId, points: Vec<Point>, color: Color) -> Self {
        let mut shape = Self::new(id, color);
        shape.attrs.points = points;
        shape.attrs.closed = true;
        shape
    }

    pub fn with_meta(mut self, meta: ShapeMeta) -> Self {
        self.attrs.meta = meta;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.attrs.radius = radius;
        self
    }

    pub fn id(&self) -> &ShapeId {
        &self.attrs.id
    }

    pub fn attrs(&self) -> &PolygonAttrs {
        &self.attrs
    }

    /// Apply a snapshot. The id is never overwritten.
    pub fn restore(&mut self, mut attrs: PolygonAttrs) {
        attrs.id = self.attrs.id.clone();
        self.attrs = attrs;
    }

    pub fn points(&self) -> &[Point] {
        &self.attrs.points
    }

    /// Points with the shape offset applied.
    pub fn absolute_points(&self) -> Vec<Point> {
        let o = self.attrs.offset;
        self.attrs.points.iter().map(|p| p.offset(o.x, o.y)).collect()
    }

    pub fn offset(&self) -> Point {
        self.attrs.offset
    }

    /// Replace the point list. Refused when editing is disabled, and for any
    /// change of vertex count once closed.
    pub fn set_points(&mut self, points: Vec<Point>) -> bool {
        if !self.attrs.can_edit {
            return false;
        }
        if self.attrs.closed && points.len() != self.attrs.points.len() {
            log::debug!(
                "Polygon {} is closed; refusing {} -> {} points",
                self.attrs.id,
                self.attrs.points.len(),
                points.len()
            );
            return false;
        }
        self.attrs.points = points;
        true
    }

    /// Move one vertex to an absolute position.
    pub fn move_vertex(&mut self, index: usize, to: Point) -> bool {
        if !self.attrs.can_edit {
            return false;
        }
        let o = self.attrs.offset;
        match self.attrs.points.get_mut(index) {
            Some(p) => {
                *p = Point::new(to.x - o.x, to.y - o.y);
                true
            }
            None => false,
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) -> bool {
        if !self.attrs.can_edit {
            return false;
        }
        self.attrs.offset = self.attrs.offset.offset(dx, dy);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.attrs.closed
    }

    pub fn close(&mut self) {
        self.attrs.closed = true;
        self.attrs.point_active = false;
    }

    pub fn color(&self) -> Color {
        self.attrs.color
    }

    pub fn meta(&self) -> &ShapeMeta {
        &self.attrs.meta
    }

    pub fn is_draggable(&self) -> bool {
        self.attrs.draggable
    }

    pub fn set_draggable(&mut self, draggable: bool) {
        self.attrs.draggable = draggable;
    }

    pub fn can_edit(&self) -> bool {
        self.attrs.can_edit
    }

    pub(crate) fn set_can_edit(&mut self, can_edit: bool) {
        self.attrs.can_edit = can_edit;
    }

    pub fn is_point_active(&self) -> bool {
        self.attrs.point_active
    }

    pub fn set_point_active(&mut self, active: bool) {
        self.attrs.point_active = active;
    }

    pub fn radius(&self) -> f32 {
        self.attrs.radius
    }

    /// Radius of vertex 0 while highlighted.
    pub fn active_radius(&self) -> f32 {
        self.attrs.radius * 2.0
    }

    pub fn status(&self) -> ShapeStatus {
        self.attrs.status
    }

    pub fn set_status(&mut self, status: ShapeStatus) {
        self.attrs.status = status;
    }

    pub fn fill_style(&self) -> FillStyle {
        self.attrs.status.fill_style(self.attrs.color)
    }

    /// Any absolute vertex outside the image.
    pub fn out_range(&self, bounds: &ImageBounds) -> bool {
        self.absolute_points().iter().any(|p| !bounds.contains(p))
    }

    // ------------------------------------------------------------------
    // Status transitions (only a closed polygon reacts)
    // ------------------------------------------------------------------

    pub fn pointer_enter(&mut self) -> bool {
        if !self.attrs.closed || self.attrs.status >= ShapeStatus::Hover {
            return false;
        }
        self.attrs.status = ShapeStatus::Hover;
        true
    }

    pub fn pointer_leave(&mut self) -> bool {
        if !self.attrs.closed || self.attrs.status != ShapeStatus::Hover {
            return false;
        }
        self.attrs.status = ShapeStatus::Normal;
        true
    }

    pub fn click(&mut self) -> bool {
        if !self.attrs.closed || self.attrs.status == ShapeStatus::Active {
            return false;
        }
        self.attrs.status = ShapeStatus::Active;
        true
    }

    pub fn click_elsewhere(&mut self) -> bool {
        if self.attrs.status == ShapeStatus::Normal {
            return false;
        }
        self.attrs.status = ShapeStatus::Normal;
        true
    }

    // ------------------------------------------------------------------
    // Edit gestures
    // ------------------------------------------------------------------

    fn begin_edit(&mut self) -> bool {
        if self.editing {
            return false;
        }
        self.editing = true;
        self.attrs.draggable = true;
        self.attrs.can_edit = true;
        true
    }

    /// Pointer pressed while editing: a vertex grabs that vertex, the body
    /// grabs the whole shape.
    pub fn press(&mut self, part: ShapePart, at: Point) -> bool {
        if !self.editing {
            return false;
        }
        match part {
            ShapePart::Vertex(index) if index < self.attrs.points.len() => {
                self.drag_vertex = Some(index);
                self.drag_last = None;
            }
            ShapePart::Vertex(index) => {
                log::warn!("Polygon {} has no vertex {}", self.attrs.id, index);
                return false;
            }
            ShapePart::Body => {
                self.drag_vertex = None;
                self.drag_last = Some(at);
            }
        }
        true
    }

    pub fn drag_to(&mut self, at: Point) -> bool {
        if let Some(index) = self.drag_vertex {
            return self.move_vertex(index, at);
        }
        if let Some(last) = self.drag_last {
            self.drag_last = Some(at);
            return self.translate(at.x - last.x, at.y - last.y);
        }
        false
    }

    pub fn release(&mut self) -> bool {
        self.drag_vertex.take().is_some() | self.drag_last.take().is_some()
    }

    fn finish_edit(&mut self) -> Subscriptions {
        self.editing = false;
        self.drag_vertex = None;
        self.drag_last = None;
        self.attrs.draggable = false;
        self.attrs.can_edit = false;
        self.edit_listeners.take()
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Shared handle to a polygon owned by a stage layer.
#[derive(Debug, Clone)]
pub struct PolygonHandle {
    id: ShapeId,
    shape: Rc<RefCell<PolygonShape>>,
}

impl PolygonHandle {
    pub fn new(shape: PolygonShape) -> Self {
        Self {
            id: shape.id().clone(),
            shape: Rc::new(RefCell::new(shape)),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id.clone()
    }

    pub fn borrow(&self) -> Ref<'_, PolygonShape> {
        self.shape.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, PolygonShape> {
        self.shape.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &PolygonHandle) -> bool {
        Rc::ptr_eq(&self.shape, &other.shape)
    }

    pub fn destroy(&self, stage: &Stage) {
        self.end_edit();
        self.unbind_status_events();
        stage.remove_shape(&self.id);
        stage.request_redraw();
        log::debug!("Destroyed polygon {}", self.id);
    }
}

impl Editable for PolygonHandle {
    fn start_edit(&self, stage: &Stage) {
        if !self.shape.borrow_mut().begin_edit() {
            log::debug!("Polygon {} is already being edited", self.id);
            return;
        }

        let dispatcher = stage.dispatcher();
        let mut listeners = Subscriptions::new();

        let (weak, id, weak_stage) = (Rc::downgrade(&self.shape), self.id.clone(), stage.downgrade());
        listeners.push(dispatcher.on(EventKind::PointerDown, Phase::Stage, move |event| {
            let (Some(shape), Some(stage), Some(pointer)) =
                (weak.upgrade(), weak_stage.upgrade(), event.pointer())
            else {
                return;
            };
            if let Some(target) = pointer.target.as_ref().filter(|t| t.shape == id) {
                shape.borrow_mut().press(target.part, stage.absolute(pointer));
            }
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
        log::debug!("Polygon {} entered edit mode", self.id);
    }

    fn end_edit(&self) {
        let released = self.shape.borrow_mut().finish_edit();
        drop(released);
    }

    fn is_editing(&self) -> bool {
        self.shape.borrow().editing
    }
}

impl StatusObservable for PolygonHandle {
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
                if let (true, Some(stage)) = (changed, weak_stage.upgrade()) {
                    stage.request_redraw();
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
