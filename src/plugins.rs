//! Optional stage behaviours installed on a scene by name.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dispatch::{Phase, Subscription, Subscriptions};
use crate::geometry::Point;
use crate::input::{EventKind, InputEvent, Key, KeyEvent, Modifiers};
use crate::shape::{RectHandle, ShapeStatus};
use crate::stage::{LayerKind, Stage};

/// Zoom factor applied per wheel notch away from the user.
pub const SCALE_BY: f32 = 0.9;

/// A behaviour that hooks into a stage's listeners.
pub trait ScenePlugin {
    fn name(&self) -> &str;
    fn install(&mut self, stage: &Stage);
    /// Release every listener the plugin registered.
    fn uninstall(&mut self, stage: &Stage);
}

// ============================================================================
// Wheel zoom
// ============================================================================

/// Zooms the view around the pointer on wheel events.
#[derive(Debug, Default)]
pub struct StageScalePlugin {
    listeners: Subscriptions,
}

impl StageScalePlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScenePlugin for StageScalePlugin {
    fn name(&self) -> &str {
        "StageScalePlugin"
    }

    fn install(&mut self, stage: &Stage) {
        self.listeners.clear();
        let weak = stage.downgrade();
        self.listeners
            .push(stage.dispatcher().on(EventKind::Wheel, Phase::Stage, move |event| {
                let (Some(stage), InputEvent::Wheel { delta, position }) = (weak.upgrade(), event) else {
                    return;
                };
                let factor = if *delta > 0.0 { SCALE_BY } else { 1.0 / SCALE_BY };
                let mut view = stage.view();
                view.zoom_around(*position, factor);
                log::trace!("Zoom to {:.3}", view.scale);
                stage.set_view(view);
            }));
    }

    fn uninstall(&mut self, _stage: &Stage) {
        self.listeners.clear();
    }
}

// ============================================================================
// Alt-drag panning
// ============================================================================

#[derive(Debug, Default)]
struct DragState {
    entering: bool,
    /// Last screen sample while the primary button is held
    last: Option<Point>,
}

/// While the drag key (Alt by default) is held, committed shapes stop
/// listening and drags pan the view.
#[derive(Debug)]
pub struct StageDragPlugin {
    key: Key,
    state: Rc<RefCell<DragState>>,
    listeners: Subscriptions,
}

impl Default for StageDragPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl StageDragPlugin {
    pub fn new() -> Self {
        Self {
            key: Key::Alt,
            state: Rc::new(RefCell::new(DragState::default())),
            listeners: Subscriptions::new(),
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    pub fn is_dragging_enabled(&self) -> bool {
        self.state.borrow().entering
    }
}

/// Whether pointer modifiers still report `key` as held. Keys that are not
/// modifiers cannot be observed on pointer events and count as held.
fn modifier_held(key: Key, modifiers: &Modifiers) -> bool {
    match key {
        Key::Alt => modifiers.alt,
        Key::Control => modifiers.ctrl,
        Key::Shift => modifiers.shift,
        Key::Meta => modifiers.meta,
        _ => true,
    }
}

fn reset_drag(stage: &Stage, state: &RefCell<DragState>) {
    *state.borrow_mut() = DragState::default();
    stage.set_is_drawing(false);
    log::debug!("Stage drag released");
}

impl ScenePlugin for StageDragPlugin {
    fn name(&self) -> &str {
        "StageDragPlugin"
    }

    fn install(&mut self, stage: &Stage) {
        self.listeners.clear();
        let dispatcher = stage.dispatcher();
        let drag_key = self.key;

        let (state, weak) = (Rc::clone(&self.state), stage.downgrade());
        self.listeners
            .push(dispatcher.on(EventKind::KeyDown, Phase::Window, move |event| {
                let (Some(stage), Some(key)) = (weak.upgrade(), event.key()) else {
                    return;
                };
                if !key.key.matches(&drag_key) || state.borrow().entering {
                    return;
                }
                state.borrow_mut().entering = true;
                stage.set_is_drawing(true);
                log::debug!("Stage drag armed");
            }));

        let (state, weak) = (Rc::clone(&self.state), stage.downgrade());
        self.listeners
            .push(dispatcher.on(EventKind::KeyUp, Phase::Window, move |event| {
                let (Some(stage), Some(key)) = (weak.upgrade(), event.key()) else {
                    return;
                };
                if key.key.matches(&drag_key) && state.borrow().entering {
                    reset_drag(&stage, &state);
                }
            }));

        let state = Rc::clone(&self.state);
        self.listeners
            .push(dispatcher.on(EventKind::PointerDown, Phase::Window, move |event| {
                let Some(pointer) = event.pointer() else {
                    return;
                };
                let mut drag = state.borrow_mut();
                if drag.entering && pointer.is_left() {
                    drag.last = Some(pointer.position);
                }
            }));

        let state = Rc::clone(&self.state);
        self.listeners
            .push(dispatcher.on(EventKind::PointerUp, Phase::Window, move |_| {
                state.borrow_mut().last = None;
            }));

        let (state, weak) = (Rc::clone(&self.state), stage.downgrade());
        self.listeners
            .push(dispatcher.on(EventKind::PointerMove, Phase::Window, move |event| {
                let (Some(stage), Some(pointer)) = (weak.upgrade(), event.pointer()) else {
                    return;
                };
                if !state.borrow().entering {
                    return;
                }
                if !modifier_held(drag_key, &pointer.modifiers) {
                    reset_drag(&stage, &state);
                    return;
                }
                let last = state.borrow_mut().last.replace(pointer.position);
                if let Some(last) = last {
                    let mut view = stage.view();
                    view.pan(pointer.position.x - last.x, pointer.position.y - last.y);
                    stage.set_view(view);
                }
            }));
    }

    fn uninstall(&mut self, _stage: &Stage) {
        self.listeners.clear();
        *self.state.borrow_mut() = DragState::default();
    }
}

// ============================================================================
// Ctrl-click deep select
// ============================================================================

/// The committed rect strictly containing `at` with the smallest area.
pub fn smallest_rect_at(stage: &Stage, at: Point) -> Option<RectHandle> {
    stage
        .shapes(LayerKind::Mark)
        .iter()
        .filter_map(|s| s.as_rect().cloned())
        .filter(|rect| {
            let r = rect.borrow().rect();
            at.x > r.x && at.y > r.y && at.x < r.x + r.width && at.y < r.y + r.height
        })
        .min_by(|a, b| a.borrow().rect().area().total_cmp(&b.borrow().rect().area()))
}

/// While the select key (Ctrl by default) is held without Alt or Shift, a
/// click selects the innermost rect under the pointer even when larger rects
/// cover it.
#[derive(Debug)]
pub struct DeepSelectPlugin {
    key: Key,
    click: Rc<RefCell<Option<Subscription>>>,
    listeners: Subscriptions,
}

impl Default for DeepSelectPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl DeepSelectPlugin {
    pub fn new() -> Self {
        Self {
            key: Key::Control,
            click: Rc::new(RefCell::new(None)),
            listeners: Subscriptions::new(),
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    pub fn is_armed(&self) -> bool {
        self.click.borrow().is_some()
    }
}

fn is_strict(event: &KeyEvent, key: &Key) -> bool {
    event.key.matches(key) && !event.modifiers.alt && !event.modifiers.shift
}

impl ScenePlugin for DeepSelectPlugin {
    fn name(&self) -> &str {
        "DeepSelectPlugin"
    }

    fn install(&mut self, stage: &Stage) {
        self.listeners.clear();
        let dispatcher = stage.dispatcher();
        let select_key = self.key;

        let (click, weak) = (Rc::clone(&self.click), stage.downgrade());
        self.listeners
            .push(dispatcher.on(EventKind::KeyDown, Phase::Window, move |event| {
                let (Some(stage), Some(key)) = (weak.upgrade(), event.key()) else {
                    return;
                };
                if !is_strict(key, &select_key) || click.borrow().is_some() {
                    return;
                }
                stage.set_is_drawing(true);

                let inner = stage.downgrade();
                let subscription = stage.dispatcher().on(EventKind::Click, Phase::Window, move |_| {
                    let Some(stage) = inner.upgrade() else {
                        return;
                    };
                    let at = stage.pointer_position();
                    if let Some(rect) = smallest_rect_at(&stage, at) {
                        stage.raise_to_top(&rect.id());
                        rect.borrow_mut().set_status(ShapeStatus::Active);
                        log::debug!("Deep select picked {}", rect.id());
                    }
                    stage.request_redraw();
                });
                *click.borrow_mut() = Some(subscription);
            }));

        let (click, weak) = (Rc::clone(&self.click), stage.downgrade());
        self.listeners
            .push(dispatcher.on(EventKind::KeyUp, Phase::Window, move |event| {
                let (Some(stage), Some(key)) = (weak.upgrade(), event.key()) else {
                    return;
                };
                if !is_strict(key, &select_key) {
                    return;
                }
                let released = click.borrow_mut().take();
                if released.is_some() {
                    drop(released);
                    stage.set_is_drawing(false);
                }
            }));
    }

    fn uninstall(&mut self, _stage: &Stage) {
        self.listeners.clear();
        let released = self.click.borrow_mut().take();
        drop(released);
    }
}
