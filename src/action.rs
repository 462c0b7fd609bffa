//! Cancellable, single-settlement actions.
//!
//! An [`Action`] wraps a producer that is handed a [`Settler`] when the
//! result is first requested. Whatever happens first wins: the producer
//! resolving, the producer rejecting, or the caller disposing the action.
//! Every terminal path runs the finalizer exactly once, including a started
//! action dropped before it settled, and every failure
//! path also runs the cancellation handler so staging state is cleaned up
//! the same way regardless of why the action ended.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;

use crate::error::ActionError;

type Producer<T> = Box<dyn FnOnce(Settler<T>)>;
type CancelHandler = Box<dyn FnOnce(&ActionError)>;
type Finalizer = Box<dyn FnOnce()>;

const DEFAULT_NAME: &str = "unnamed action";

struct Core<T> {
    name: String,
    settled: AtomicBool,
    started: Cell<bool>,
    sender: RefCell<Option<oneshot::Sender<Result<T, ActionError>>>>,
    on_cancel: RefCell<Option<CancelHandler>>,
    finalizer: RefCell<Option<Finalizer>>,
}

impl<T> Core<T> {
    /// Settle with `result`. Returns false if the action had already settled.
    fn settle(&self, result: Result<T, ActionError>) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Err(error) = &result {
            let handler = self.on_cancel.borrow_mut().take();
            if let Some(handler) = handler {
                handler(error);
            }
        }

        let finalizer = self.finalizer.borrow_mut().take();
        if let Some(finalizer) = finalizer {
            finalizer();
        }

        let sender = self.sender.borrow_mut().take();
        if let Some(sender) = sender {
            // The receiver may already be gone; nobody is waiting then.
            let _ = sender.send(result);
        }
        true
    }

    fn cancel(&self, reason: Option<&str>) {
        if !self.started.get() {
            log::warn!("Action '{}' disposed before it started; ignoring", self.name);
            return;
        }
        let reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("action '{}' cancelled by caller", self.name));
        if self.settle(Err(ActionError::Cancelled {
            reason: reason.clone(),
        })) {
            log::debug!("Action '{}' cancelled: {}", self.name, reason);
        }
    }
}

impl<T> Drop for Core<T> {
    /// A started action that loses every owner without settling fails, so
    /// its cancel handler and finalizer still run.
    fn drop(&mut self) {
        if self.started.get() && !self.settled.load(Ordering::Acquire) {
            log::debug!("Action '{}' dropped before it settled", self.name);
            let message = format!("action '{}' was dropped before it settled", self.name);
            self.settle(Err(ActionError::Failed(message)));
        }
    }
}

/// Type-erased control over an action, used to hold any action as the
/// current one.
pub trait Disposable {
    fn name(&self) -> &str;
    /// Cancel the action if it is pending. No-op once settled, ignored
    /// before the result has been requested.
    fn dispose(&self, reason: Option<&str>);
    fn is_settled(&self) -> bool;
}

impl<T> Disposable for Core<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dispose(&self, reason: Option<&str>) {
        self.cancel(reason);
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Action
// ============================================================================

/// A cancellable operation producing one `T`.
pub struct Action<T> {
    core: Rc<Core<T>>,
    producer: Option<Producer<T>>,
}

impl<T: 'static> Action<T> {
    /// Create an action. `producer` runs on the first [`Action::get_result`].
    pub fn new(name: impl Into<String>, producer: impl FnOnce(Settler<T>) + 'static) -> Self {
        let name = name.into();
        Self {
            core: Rc::new(Core {
                name: if name.is_empty() {
                    DEFAULT_NAME.to_string()
                } else {
                    name
                },
                settled: AtomicBool::new(false),
                started: Cell::new(false),
                sender: RefCell::new(None),
                on_cancel: RefCell::new(None),
                finalizer: RefCell::new(None),
            }),
            producer: Some(Box::new(producer)),
        }
    }

    /// Create an action with the default name.
    pub fn unnamed(producer: impl FnOnce(Settler<T>) + 'static) -> Self {
        Self::new(DEFAULT_NAME, producer)
    }

    /// Called with the failure on cancellation and on rejection.
    pub fn on_cancel(self, handler: impl FnOnce(&ActionError) + 'static) -> Self {
        *self.core.on_cancel.borrow_mut() = Some(Box::new(handler));
        self
    }

    /// Called once on every terminal path, before the result is delivered.
    pub fn finally(self, finalizer: impl FnOnce() + 'static) -> Self {
        *self.core.finalizer.borrow_mut() = Some(Box::new(finalizer));
        self
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_started(&self) -> bool {
        self.core.started.get()
    }

    pub fn is_settled(&self) -> bool {
        self.core.is_settled()
    }

    /// Start the producer and return the eventual result.
    ///
    /// Only the first call starts anything; later calls yield
    /// [`ActionError::Failed`] immediately.
    pub fn get_result(&mut self) -> ActionFuture<T> {
        let Some(producer) = self.producer.take() else {
            log::warn!("Result of action '{}' requested twice", self.core.name);
            return ActionFuture::ready(Err(ActionError::Failed(format!(
                "result of action '{}' was already requested",
                self.core.name
            ))));
        };

        let (sender, receiver) = oneshot::channel();
        *self.core.sender.borrow_mut() = Some(sender);
        self.core.started.set(true);
        log::trace!("Action '{}' started", self.core.name);

        producer(Settler {
            core: Rc::clone(&self.core),
        });
        ActionFuture::pending(receiver)
    }

    /// Cancel the action. See [`Disposable::dispose`].
    pub fn dispose(&self, reason: Option<&str>) {
        self.core.cancel(reason);
    }

    /// A clonable handle that can dispose this action without owning it.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> Disposable for Action<T> {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn dispose(&self, reason: Option<&str>) {
        self.core.cancel(reason);
    }

    fn is_settled(&self) -> bool {
        self.core.is_settled()
    }
}

impl<T> fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.core.name)
            .field("started", &self.core.started.get())
            .field("settled", &self.core.settled.load(Ordering::Relaxed))
            .finish()
    }
}

/// Disposes an action it does not own.
#[derive(Clone)]
pub struct AbortHandle {
    core: Rc<dyn Disposable>,
}

impl Disposable for AbortHandle {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn dispose(&self, reason: Option<&str>) {
        self.core.dispose(reason);
    }

    fn is_settled(&self) -> bool {
        self.core.is_settled()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("name", &self.core.name())
            .finish()
    }
}

// ============================================================================
// Settler
// ============================================================================

/// Handed to the producer to settle the action.
pub struct Settler<T> {
    core: Rc<Core<T>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T> Settler<T> {
    /// Deliver a value. Ignored if the action already settled.
    pub fn resolve(&self, value: T) -> bool {
        let settled = self.core.settle(Ok(value));
        if settled {
            log::debug!("Action '{}' resolved", self.core.name);
        }
        settled
    }

    /// Fail the action. Ignored if it already settled.
    pub fn reject(&self, error: ActionError) -> bool {
        if self.core.is_settled() {
            return false;
        }
        log::debug!("Action '{}' rejected: {}", self.core.name, error);
        self.core.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.core.is_settled()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }
}

// ============================================================================
// Result future
// ============================================================================

enum ResultState<T> {
    Pending(oneshot::Receiver<Result<T, ActionError>>),
    Ready(Option<Result<T, ActionError>>),
}

/// Resolves to the outcome of an [`Action`].
pub struct ActionFuture<T> {
    state: ResultState<T>,
}

impl<T> ActionFuture<T> {
    fn pending(receiver: oneshot::Receiver<Result<T, ActionError>>) -> Self {
        Self {
            state: ResultState::Pending(receiver),
        }
    }

    fn ready(result: Result<T, ActionError>) -> Self {
        Self {
            state: ResultState::Ready(Some(result)),
        }
    }
}

impl<T> Unpin for ActionFuture<T> {}

impl<T> Future for ActionFuture<T> {
    type Output = Result<T, ActionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            ResultState::Pending(receiver) => receiver.poll_unpin(cx).map(|received| {
                received.unwrap_or_else(|_| {
                    Err(ActionError::Failed(
                        "action was dropped before it settled".to_string(),
                    ))
                })
            }),
            ResultState::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(ActionError::Failed("result already taken".to_string()))
            })),
        }
    }
}

impl<T> fmt::Debug for ActionFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            ResultState::Pending(_) => "pending",
            ResultState::Ready(_) => "ready",
        };
        f.debug_struct("ActionFuture").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)))
    }

    /// An action whose settler is parked in `slot` once started.
    fn parked(
        name: &str,
        slot: &Rc<RefCell<Option<Settler<u32>>>>,
        cancels: &Rc<Cell<u32>>,
        finals: &Rc<Cell<u32>>,
    ) -> Action<u32> {
        let slot = Rc::clone(slot);
        let (cancels, finals) = (Rc::clone(cancels), Rc::clone(finals));
        Action::new(name, move |settler| *slot.borrow_mut() = Some(settler))
            .on_cancel(move |_| cancels.set(cancels.get() + 1))
            .finally(move || finals.set(finals.get() + 1))
    }

    #[test]
    fn test_resolve_delivers_value_and_finalizes_once() {
        let slot = Rc::new(RefCell::new(None));
        let (cancels, finals) = counter();
        let mut action = parked("count", &slot, &cancels, &finals);

        let mut result = action.get_result();
        assert!((&mut result).now_or_never().is_none());

        let settler = slot.borrow_mut().take().unwrap();
        assert!(settler.resolve(7));
        assert!(!settler.resolve(8));
        assert!(!settler.reject(ActionError::DrawFailed("late".into())));

        assert_eq!(result.now_or_never(), Some(Ok(7)));
        assert_eq!(finals.get(), 1);
        assert_eq!(cancels.get(), 0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let slot = Rc::new(RefCell::new(None));
        let (cancels, finals) = counter();
        let mut action = parked("draw rect", &slot, &cancels, &finals);
        let result = action.get_result();

        action.dispose(None);
        action.dispose(Some("again"));

        assert_eq!(cancels.get(), 1);
        assert_eq!(finals.get(), 1);
        assert_eq!(
            result.now_or_never(),
            Some(Err(ActionError::Cancelled {
                reason: "action 'draw rect' cancelled by caller".to_string()
            }))
        );
    }

    #[test]
    fn test_dispose_after_resolution_is_noop() {
        let slot = Rc::new(RefCell::new(None));
        let (cancels, finals) = counter();
        let mut action = parked("count", &slot, &cancels, &finals);
        let result = action.get_result();

        slot.borrow_mut().take().unwrap().resolve(1);
        action.dispose(Some("too late"));

        assert_eq!(cancels.get(), 0);
        assert_eq!(finals.get(), 1);
        assert_eq!(futures::executor::block_on(result), Ok(1));
    }

    #[test]
    fn test_dispose_before_start_is_ignored() {
        let slot = Rc::new(RefCell::new(None));
        let (cancels, finals) = counter();
        let mut action = parked("count", &slot, &cancels, &finals);

        action.dispose(Some("early"));
        assert!(!action.is_settled());
        assert_eq!(finals.get(), 0);

        let _result = action.get_result();
        assert!(action.is_started());
        assert!(slot.borrow().is_some());
    }

    #[test]
    fn test_reject_runs_cancel_handler() {
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let mut action = Action::<u32>::unnamed(|settler| {
            settler.reject(ActionError::InvalidInput("invalid button".into()));
        })
        .on_cancel(move |error| *sink.borrow_mut() = Some(error.clone()));

        assert_eq!(action.name(), "unnamed action");
        let result = action.get_result();
        assert_eq!(
            result.now_or_never(),
            Some(Err(ActionError::InvalidInput("invalid button".into())))
        );
        assert_eq!(
            *seen.borrow(),
            Some(ActionError::InvalidInput("invalid button".into()))
        );
    }

    #[test]
    fn test_dropped_pending_action_still_finalizes() {
        let slot = Rc::new(RefCell::new(None));
        let (cancels, finals) = counter();
        let mut action = parked("abandoned", &slot, &cancels, &finals);
        let result = action.get_result();

        drop(action);
        assert_eq!(finals.get(), 0);
        drop(slot.borrow_mut().take());

        assert_eq!(cancels.get(), 1);
        assert_eq!(finals.get(), 1);
        assert_eq!(
            result.now_or_never(),
            Some(Err(ActionError::Failed(
                "action 'abandoned' was dropped before it settled".to_string()
            )))
        );

        let (cancels, finals) = counter();
        drop(parked("never started", &slot, &cancels, &finals));
        assert_eq!((cancels.get(), finals.get()), (0, 0));
    }

    #[test]
    fn test_second_get_result_fails() {
        let mut action = Action::new("once", |settler: Settler<u32>| {
            settler.resolve(1);
        });
        assert_eq!(action.get_result().now_or_never(), Some(Ok(1)));
        assert!(matches!(
            action.get_result().now_or_never(),
            Some(Err(ActionError::Failed(_)))
        ));
    }

    #[test]
    fn test_abort_handle_and_dropped_settler() {
        let mut action = Action::new("dropped", |settler: Settler<u32>| drop(settler));
        let result = action.get_result();
        drop(action);
        assert!(matches!(result.now_or_never(), Some(Err(ActionError::Failed(_)))));

        let slot = Rc::new(RefCell::new(None));
        let (cancels, finals) = counter();
        let mut action = parked("held", &slot, &cancels, &finals);
        let handle = action.abort_handle();
        let _result = action.get_result();
        handle.dispose(Some("from handle"));
        assert!(action.is_settled());
        assert_eq!(finals.get(), 1);
    }
}
