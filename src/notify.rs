//! Notifications a scene broadcasts to caller-side subscribers.

use std::cell::RefCell;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::shape::ShapeId;

/// Events exposed to the caller as a continuous stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A shape left the image and was evicted.
    OutRange { id: ShapeId },
    /// Secondary click while group mode is held.
    DeleteCurrentGroup,
    /// Primary drag while group mode is held, as a delta between samples.
    GroupMove { dx: f32, dy: f32 },
    /// A registered shortcut fired on key release.
    Shortcut { name: String },
}

/// Broadcasts [`SceneEvent`]s to every live subscriber.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: RefCell<Vec<UnboundedSender<SceneEvent>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new stream. Events emitted before this call are not replayed.
    pub fn subscribe(&self) -> UnboundedReceiver<SceneEvent> {
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers.borrow_mut().push(sender);
        receiver
    }

    /// Send `event` to all subscribers, pruning the ones that hung up.
    pub fn emit(&self, event: SceneEvent) {
        log::debug!("Scene event: {:?}", event);
        self.subscribers
            .borrow_mut()
            .retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}
