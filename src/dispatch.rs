//! Listener registry with owned subscriptions.
//!
//! Every listener is released when its [`Subscription`] guard is dropped, so a
//! controller that owns its guards cannot leak listeners past its own
//! lifetime. Listeners can also be grouped under a [`Namespace`] to inspect or
//! release everything one draw session registered.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::input::{EventKind, InputEvent};

/// Dispatch phase. Stage listeners run before window listeners for the same
/// event, with pending continuations flushed in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Stage,
    Window,
}

/// A per-invocation listener namespace derived from the current time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

static NAMESPACE_SEQ: AtomicU64 = AtomicU64::new(0);

impl Namespace {
    /// Create a fresh namespace such as `rect-draw.1718000000000-3`.
    pub fn fresh(prefix: &str) -> Self {
        let seq = NAMESPACE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}.{}-{}", prefix, crate::shape::now_millis(), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Handler = Rc<RefCell<dyn FnMut(&InputEvent)>>;

struct Entry {
    id: u64,
    kind: EventKind,
    phase: Phase,
    namespace: Option<Namespace>,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

impl Registry {
    fn take(&mut self, id: u64) -> Option<Entry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }
}

/// Routes input events to registered listeners in registration order.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Rc<RefCell<Registry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned guard is dropped.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn on<F>(&self, kind: EventKind, phase: Phase, handler: F) -> Subscription
    where
        F: FnMut(&InputEvent) + 'static,
    {
        self.register(kind, phase, None, handler)
    }

    /// Register a listener grouped under `namespace`.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn on_in<F>(
        &self,
        namespace: &Namespace,
        kind: EventKind,
        phase: Phase,
        handler: F,
    ) -> Subscription
    where
        F: FnMut(&InputEvent) + 'static,
    {
        self.register(kind, phase, Some(namespace.clone()), handler)
    }

    fn register<F>(
        &self,
        kind: EventKind,
        phase: Phase,
        namespace: Option<Namespace>,
        handler: F,
    ) -> Subscription
    where
        F: FnMut(&InputEvent) + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.entries.push(Entry {
            id,
            kind,
            phase,
            namespace,
            handler: Rc::new(RefCell::new(handler)),
        });
        log::trace!("Registered listener {} for {:?}/{:?}", id, kind, phase);
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every listener registered for its kind in `phase`.
    ///
    /// Listeners removed by an earlier listener during the same dispatch are
    /// skipped. Returns the number of listeners invoked.
    pub fn dispatch(&self, phase: Phase, event: &InputEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<(u64, Handler)> = self
            .registry
            .borrow()
            .entries
            .iter()
            .filter(|e| e.kind == kind && e.phase == phase)
            .map(|e| (e.id, Rc::clone(&e.handler)))
            .collect();

        let mut invoked = 0;
        for (id, handler) in targets {
            if !self.registry.borrow().contains(id) {
                continue;
            }
            match handler.try_borrow_mut() {
                Ok(mut handler) => {
                    (&mut *handler)(event);
                    invoked += 1;
                }
                Err(_) => log::warn!("Listener {} is already running; skipping nested call", id),
            }
        }
        invoked
    }

    /// Release every listener registered under `namespace`.
    pub fn off_namespace(&self, namespace: &Namespace) -> usize {
        let removed: Vec<Entry> = {
            let mut registry = self.registry.borrow_mut();
            let (removed, kept) = std::mem::take(&mut registry.entries)
                .into_iter()
                .partition(|e| e.namespace.as_ref() == Some(namespace));
            registry.entries = kept;
            removed
        };
        let count = removed.len();
        drop(removed);
        count
    }

    pub fn listener_count(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn listener_count_in(&self, namespace: &Namespace) -> usize {
        self.registry
            .borrow()
            .entries
            .iter()
            .filter(|e| e.namespace.as_ref() == Some(namespace))
            .count()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Guard for a registered listener. Dropping it removes the listener.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.borrow().contains(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        // The entry is dropped after the borrow ends; its handler may own
        // further subscriptions.
        let entry = registry.borrow_mut().take(self.id);
        drop(entry);
    }
}

/// An owned bag of subscriptions released together.
#[derive(Debug, Default)]
pub struct Subscriptions(Vec<Subscription>);

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.0.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Release every subscription in the bag.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Move the subscriptions out, leaving the bag empty.
    pub fn take(&mut self) -> Subscriptions {
        Subscriptions(std::mem::take(&mut self.0))
    }
}

impl Extend<Subscription> for Subscriptions {
    fn extend<I: IntoIterator<Item = Subscription>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}
