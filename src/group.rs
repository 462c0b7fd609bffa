//! Group mode: hold a key to operate on the current group instead of shapes.
//!
//! While the group key is held the committed layer stops listening, a
//! secondary release asks for the current group to be deleted, and a primary
//! drag reports movement deltas. The scene only reports these intents; the
//! caller decides which group they apply to.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dispatch::{Phase, Subscription, Subscriptions};
use crate::geometry::Point;
use crate::input::{EventKind, InputEvent, Key, MouseButton};
use crate::notify::SceneEvent;
use crate::shape::RectHandle;
use crate::stage::{Stage, WeakStage};

/// One distinct group id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: String,
}

/// Distinct group ids of `rects` in first-seen order. Rects without a group
/// are skipped.
pub fn parse_rects_to_group_list(rects: &[RectHandle]) -> Vec<GroupRef> {
    let mut seen = HashSet::new();
    rects
        .iter()
        .filter_map(|rect| rect.borrow().group_id().map(str::to_string))
        .filter(|id| seen.insert(id.clone()))
        .map(|id| GroupRef { id })
        .collect()
}

#[derive(Debug, Default)]
struct GroupMode {
    active: bool,
    mode_listeners: Subscriptions,
    move_listener: Option<Subscription>,
    last: Point,
}

/// Key-driven group mode bound to a stage.
#[derive(Debug)]
pub struct GroupController {
    key: Key,
    state: Rc<RefCell<GroupMode>>,
    _listeners: Subscriptions,
}

impl GroupController {
    pub fn install(stage: &Stage, key: Key) -> Self {
        let state = Rc::new(RefCell::new(GroupMode::default()));
        let dispatcher = stage.dispatcher();
        let mut listeners = Subscriptions::new();

        let (down_state, weak) = (Rc::clone(&state), stage.downgrade());
        listeners.push(dispatcher.on(EventKind::KeyDown, Phase::Window, move |event| {
            let Some(k) = event.key() else {
                return;
            };
            if !k.key.matches(&key) || down_state.borrow().active {
                return;
            }
            if let Some(stage) = weak.upgrade() {
                enter(&stage, &down_state);
            }
        }));

        let (up_state, weak) = (Rc::clone(&state), stage.downgrade());
        listeners.push(dispatcher.on(EventKind::KeyUp, Phase::Window, move |event| {
            let Some(k) = event.key() else {
                return;
            };
            if !k.key.matches(&key) {
                return;
            }
            if let Some(stage) = weak.upgrade() {
                leave(&stage, &up_state);
            }
        }));

        Self {
            key,
            state,
            _listeners: listeners,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }
}

fn enter(stage: &Stage, state: &Rc<RefCell<GroupMode>>) {
    log::debug!("Group mode on");
    stage.set_is_drawing(true);

    let dispatcher = stage.dispatcher();
    let mut mode = Subscriptions::new();

    let weak = stage.downgrade();
    mode.push(dispatcher.on(EventKind::PointerUp, Phase::Window, move |event| {
        let (Some(stage), Some(pointer)) = (weak.upgrade(), event.pointer()) else {
            return;
        };
        if pointer.button == MouseButton::Right {
            stage.emit(SceneEvent::DeleteCurrentGroup);
        }
    }));

    let (press_state, weak) = (Rc::clone(state), stage.downgrade());
    mode.push(dispatcher.on(EventKind::PointerDown, Phase::Window, move |_| {
        let Some(stage) = weak.upgrade() else {
            return;
        };
        let tracker = track_moves(&stage, &press_state);
        let mut group = press_state.borrow_mut();
        group.last = stage.pointer_position();
        let replaced = group.move_listener.replace(tracker);
        drop(group);
        drop(replaced);
    }));

    let release_state = Rc::clone(state);
    mode.push(dispatcher.on(EventKind::PointerUp, Phase::Window, move |event| {
        if event.pointer().is_some_and(|p| p.is_left()) {
            let released = release_state.borrow_mut().move_listener.take();
            drop(released);
        }
    }));

    let mut group = state.borrow_mut();
    group.active = true;
    group.mode_listeners = mode;
}

fn track_moves(stage: &Stage, state: &Rc<RefCell<GroupMode>>) -> Subscription {
    let (state, weak): (_, WeakStage) = (Rc::clone(state), stage.downgrade());
    stage
        .dispatcher()
        .on(EventKind::PointerMove, Phase::Window, move |event: &InputEvent| {
            let (Some(stage), Some(_)) = (weak.upgrade(), event.pointer()) else {
                return;
            };
            let now = stage.pointer_position();
            let last = std::mem::replace(&mut state.borrow_mut().last, now);
            stage.emit(SceneEvent::GroupMove {
                dx: now.x - last.x,
                dy: now.y - last.y,
            });
            stage.request_redraw();
        })
}

fn leave(stage: &Stage, state: &Rc<RefCell<GroupMode>>) {
    let (mode, tracker) = {
        let mut group = state.borrow_mut();
        if !group.active {
            return;
        }
        group.active = false;
        (group.mode_listeners.take(), group.move_listener.take())
    };
    drop(mode);
    drop(tracker);
    stage.set_is_drawing(false);
    log::debug!("Group mode off");
}
