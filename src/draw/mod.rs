//! Draw controllers and the sessions a scene runs them in.
//!
//! A painter turns pointer and key events into one shape, wrapped in an
//! [`Action`]. A [`DrawSession`] is what the scene holds as its current
//! action: either one draw that commits a single shape, or a chain of rect
//! draws that keeps re-arming until stopped.

mod polygon;
mod rect;

pub use polygon::PolygonPainter;
pub use rect::RectPainter;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use crate::action::{AbortHandle, Action, Disposable};
use crate::error::ActionError;
use crate::shape::{RectHandle, ShapeHandle, ShapeId};

/// The scene's current draw.
#[derive(Debug)]
pub enum DrawSession {
    /// One shape, committed when the inner draw resolves.
    Single(Action<ShapeHandle>),
    /// Continuous rect drawing with a shared template.
    Chained(ChainedDraw),
}

impl DrawSession {
    pub fn name(&self) -> &str {
        match self {
            DrawSession::Single(action) => action.name(),
            DrawSession::Chained(chain) => chain.name(),
        }
    }

    /// End the whole session.
    pub fn stop(&self, reason: Option<&str>) {
        match self {
            DrawSession::Single(action) => action.dispose(reason),
            DrawSession::Chained(chain) => chain.stop(reason),
        }
    }

    /// Cancel the shape being drawn. A chain keeps going with a fresh draw.
    pub fn cancel_current(&self, reason: Option<&str>) {
        match self {
            DrawSession::Single(action) => action.dispose(reason),
            DrawSession::Chained(chain) => chain.cancel_current(reason),
        }
    }

    pub fn is_settled(&self) -> bool {
        match self {
            DrawSession::Single(action) => action.is_settled(),
            DrawSession::Chained(chain) => chain.is_stopped(),
        }
    }
}

impl Disposable for DrawSession {
    fn name(&self) -> &str {
        DrawSession::name(self)
    }

    fn dispose(&self, reason: Option<&str>) {
        self.stop(reason);
    }

    fn is_settled(&self) -> bool {
        DrawSession::is_settled(self)
    }
}

// ============================================================================
// Chained draw
// ============================================================================

#[derive(Default)]
struct ChainState {
    name: String,
    stopped: Cell<bool>,
    current: RefCell<Option<AbortHandle>>,
    committed: RefCell<Vec<ShapeId>>,
    on_finish: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl ChainState {
    fn finish(&self) {
        let on_finish = self.on_finish.borrow_mut().take();
        if let Some(on_finish) = on_finish {
            on_finish();
        }
    }
}

/// A run of rect draws where cancelling affects only the shape in flight.
#[derive(Clone)]
pub struct ChainedDraw {
    state: Rc<ChainState>,
}

impl ChainedDraw {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Rc::new(ChainState {
                name: name.into(),
                ..ChainState::default()
            }),
        }
    }

    /// Called once when the chain ends, whether stopped or broken.
    pub fn on_finish(&self, f: impl FnOnce() + 'static) {
        *self.state.on_finish.borrow_mut() = Some(Box::new(f));
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.get()
    }

    /// Ids of the shapes committed so far, in draw order.
    pub fn committed_ids(&self) -> Vec<ShapeId> {
        self.state.committed.borrow().clone()
    }

    /// Whether a sub-draw is armed right now.
    pub fn has_current(&self) -> bool {
        self.state.current.borrow().is_some()
    }

    /// Cancel the in-flight sub-draw. The chain arms the next one.
    pub fn cancel_current(&self, reason: Option<&str>) {
        let current = self.state.current.borrow().clone();
        match current {
            Some(current) => current.dispose(reason),
            None => log::debug!("Chain '{}' has no draw in flight", self.state.name),
        }
    }

    /// End the chain. Shapes already committed stay.
    pub fn stop(&self, reason: Option<&str>) {
        if self.state.stopped.replace(true) {
            return;
        }
        log::debug!(
            "Chain '{}' stopped after {} shape(s)",
            self.state.name,
            self.state.committed.borrow().len()
        );
        self.state.finish();
        let current = self.state.current.borrow_mut().take();
        if let Some(current) = current {
            current.dispose(reason);
        }
    }

    /// Drive the chain. `next` arms a sub-draw and `commit` places a finished
    /// rect, returning its committed id.
    pub fn run<N, C>(&self, mut next: N, mut commit: C) -> impl Future<Output = ()> + use<N, C>
    where
        N: FnMut() -> Action<RectHandle> + 'static,
        C: FnMut(RectHandle) -> ShapeId + 'static,
    {
        let state = Rc::clone(&self.state);
        async move {
            while !state.stopped.get() {
                let mut action = next();
                let result = action.get_result();
                *state.current.borrow_mut() = Some(action.abort_handle());

                let outcome = result.await;
                state.current.borrow_mut().take();
                match outcome {
                    Ok(rect) => {
                        let id = commit(rect);
                        log::debug!("Chain '{}' committed {}", state.name, id);
                        state.committed.borrow_mut().push(id);
                    }
                    Err(ActionError::Failed(message)) => {
                        log::warn!("Chain '{}' broken: {}", state.name, message);
                        state.stopped.set(true);
                    }
                    Err(error) => log::debug!("Chain '{}' sub-draw ended: {}", state.name, error),
                }
            }
            state.finish();
        }
    }
}

impl Disposable for ChainedDraw {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn dispose(&self, reason: Option<&str>) {
        self.stop(reason);
    }

    fn is_settled(&self) -> bool {
        self.is_stopped()
    }
}

impl std::fmt::Debug for ChainedDraw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedDraw")
            .field("name", &self.state.name)
            .field("stopped", &self.state.stopped.get())
            .field("committed", &self.state.committed.borrow().len())
            .finish()
    }
}
