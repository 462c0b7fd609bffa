//! Keeps committed shapes inside the image.
//!
//! On every pointer press the committed layer is snapshotted. On release, a
//! shape found outside the image is rolled back to its snapshot; if that
//! does not bring it back inside (or it was created during the gesture), it
//! is reported through [`SceneEvent::OutRange`] and destroyed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::dispatch::{Phase, Subscriptions};
use crate::input::EventKind;
use crate::notify::SceneEvent;
use crate::shape::{ShapeId, ShapeSnapshot};
use crate::stage::{LayerKind, Stage};

/// Attribute snapshots keyed by shape id, taken at pointer-down.
#[derive(Debug, Default)]
pub struct RangeCache {
    snapshots: HashMap<ShapeId, ShapeSnapshot>,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every committed shape. An empty layer leaves the cache as is.
    pub fn capture(&mut self, stage: &Stage) {
        let shapes = stage.shapes(LayerKind::Mark);
        if shapes.is_empty() {
            return;
        }
        self.snapshots = shapes.iter().map(|s| (s.id(), s.snapshot())).collect();
        log::trace!("Range cache holds {} snapshot(s)", self.snapshots.len());
    }

    pub fn get(&self, id: &ShapeId) -> Option<&ShapeSnapshot> {
        self.snapshots.get(id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Roll back or evict every committed shape outside the image. Returns the
/// ids of the evicted shapes.
pub fn reconcile(stage: &Stage, cache: &RangeCache) -> Vec<ShapeId> {
    let bounds = stage.bounds();
    let mut evicted = Vec::new();

    for shape in stage.shapes(LayerKind::Mark) {
        if !shape.out_range(&bounds) {
            continue;
        }
        let id = shape.id();
        let restored = cache.get(&id).is_some_and(|snapshot| shape.restore(snapshot));
        if restored && !shape.out_range(&bounds) {
            log::debug!("Shape {} left the image; restored", id);
            continue;
        }

        log::info!("Shape {} is out of range; removing it", id);
        stage.emit(SceneEvent::OutRange { id: id.clone() });
        shape.destroy(stage);
        evicted.push(id);
    }

    stage.request_redraw();
    evicted
}

/// Window-level listeners that enforce the image bounds around each gesture.
#[derive(Debug)]
pub struct RangeValidator {
    cache: Rc<RefCell<RangeCache>>,
    _listeners: Subscriptions,
}

impl RangeValidator {
    pub fn register(stage: &Stage) -> Self {
        let cache = Rc::new(RefCell::new(RangeCache::new()));
        let dispatcher = stage.dispatcher();
        let mut listeners = Subscriptions::new();

        let (down_cache, weak) = (Rc::clone(&cache), stage.downgrade());
        listeners.push(dispatcher.on(EventKind::PointerDown, Phase::Window, move |_| {
            if let Some(stage) = weak.upgrade() {
                down_cache.borrow_mut().capture(&stage);
            }
        }));

        let (up_cache, weak) = (Rc::clone(&cache), stage.downgrade());
        listeners.push(dispatcher.on(EventKind::PointerUp, Phase::Window, move |_| {
            let Some(stage) = weak.upgrade() else {
                return;
            };
            let cache = std::mem::take(&mut *up_cache.borrow_mut());
            reconcile(&stage, &cache);
        }));

        log::debug!("Range validation registered");
        Self {
            cache,
            _listeners: listeners,
        }
    }

    /// Snapshots currently held, for diagnostics.
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl Drop for RangeValidator {
    fn drop(&mut self) {
        log::debug!("Range validation unregistered");
    }
}
