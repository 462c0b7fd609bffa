//! The scene controller: owns the stage, the committed shapes and the
//! current draw, and drives them from host input.
//!
//! Every event is dispatched in two phases. Stage-phase listeners (painters,
//! shape status and edit listeners) run first; then pending continuations
//! run, so a draw that finished is committed before window-phase listeners
//! (range validation, group mode, modal keys) see the same event.

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

use crate::action::{AbortHandle, Action, ActionFuture, Disposable, Settler};
use crate::config::LabelConfig;
use crate::convert::{
    BusinessRecord, DataConversionFactory, IGNORE_AREA_COLOR, IGNORE_AREA_NAME, ModelShapes, TypeStyleTable,
    records_from_json, records_to_json,
};
use crate::dispatch::Phase;
use crate::draw::{ChainedDraw, DrawSession, PolygonPainter, RectPainter};
use crate::error::{ActionError, ConversionError, ConversionResult};
use crate::geometry::ImageBounds;
use crate::group::{GroupController, GroupRef, parse_rects_to_group_list};
use crate::input::InputEvent;
use crate::keybindings::ShortcutRegistry;
use crate::location::{Crosshair, CrosshairLines};
use crate::notify::SceneEvent;
use crate::palette::{Color, Palette, UNKNOWN_TYPE_COLOR};
use crate::plugins::{DeepSelectPlugin, ScenePlugin, StageDragPlugin, StageScalePlugin};
use crate::range::RangeValidator;
use crate::shape::{
    Editable, GroupStatus, PolygonHandle, RectHandle, ShapeHandle, ShapeId, ShapeMeta, StatusObservable,
};
use crate::stage::{LayerKind, Stage};

#[cfg(test)]
mod tests;

/// Reason given to a current action replaced by a new one.
pub const REASON_CHANGED: &str = "action changed by user";
/// Reason given by [`Scene::dispose_current_action`].
pub const REASON_DISPOSED: &str = "action disposed by user";

/// Put a finished shape on the mark layer and make it interactive.
fn commit_shape(stage: &Stage, shape: &ShapeHandle) {
    match shape {
        ShapeHandle::Rect(rect) => {
            {
                let mut r = rect.borrow_mut();
                r.set_committed(true);
                if r.text().is_none() {
                    let group = r.group_id().map(str::to_string);
                    r.set_text(group);
                }
            }
            rect.bind_status_events(stage);
        }
        ShapeHandle::Polygon(polygon) => {
            polygon.borrow_mut().set_can_edit(false);
            polygon.bind_status_events(stage);
        }
    }
    stage.add_shape(LayerKind::Mark, shape.clone());
    stage.request_redraw();
    log::debug!("Committed shape {}", shape.id());
}

/// Interactive annotation scene.
pub struct Scene {
    stage: Stage,
    config: LabelConfig,
    palette: Palette,
    pool: LocalPool,
    spawner: LocalSpawner,
    current: Option<DrawSession>,
    factory: Option<DataConversionFactory>,
    range: Option<RangeValidator>,
    group: GroupController,
    plugins: Vec<Box<dyn ScenePlugin>>,
    shortcuts: ShortcutRegistry,
    crosshair: Crosshair,
}

impl Scene {
    /// Create a scene with range validation registered and deep select
    /// installed. Both can be removed with [`Scene::unregister_range`] and
    /// [`Scene::uninstall_plugin`].
    pub fn new(config: LabelConfig) -> Self {
        let stage = Stage::new(config.image_bounds);
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let group = GroupController::install(&stage, config.keybindings.group_mode);
        let crosshair = Crosshair::new(&stage);
        log::info!(
            "Scene created for a {}x{} image",
            config.image_bounds.width,
            config.image_bounds.height
        );

        let deep_select = DeepSelectPlugin::new().with_key(config.keybindings.deep_select);
        let mut scene = Self {
            palette: config.palette(),
            stage,
            config,
            pool,
            spawner,
            current: None,
            factory: None,
            range: None,
            group,
            plugins: Vec::new(),
            shortcuts: ShortcutRegistry::new(),
            crosshair,
        };
        scene.register_range();
        scene.install_plugin(Box::new(deep_select));
        scene
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    /// Open a notification stream. See [`SceneEvent`].
    pub fn subscribe(&self) -> futures::channel::mpsc::UnboundedReceiver<SceneEvent> {
        self.stage.subscribe()
    }

    pub fn set_image_bounds(&mut self, bounds: ImageBounds) {
        self.config.image_bounds = bounds;
        self.stage.set_bounds(bounds);
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Feed one host event through both dispatch phases.
    pub fn handle_event(&mut self, event: &InputEvent) {
        self.stage.dispatch(Phase::Stage, event);
        self.pool.run_until_stalled();
        self.stage.dispatch(Phase::Window, event);
        self.pool.run_until_stalled();

        let fired = match event {
            InputEvent::KeyUp(key) => self.shortcuts.fired(key).map(str::to_string),
            _ => None,
        };
        if let Some(name) = fired {
            log::debug!("Shortcut '{}' fired", name);
            self.stage.emit(SceneEvent::Shortcut { name });
        }
    }

    /// Run continuations that became ready outside [`Scene::handle_event`],
    /// for example after stopping a chain directly.
    pub fn run_pending(&mut self) {
        self.pool.run_until_stalled();
    }

    pub fn shortcuts(&self) -> &ShortcutRegistry {
        &self.shortcuts
    }

    pub fn shortcuts_mut(&mut self) -> &mut ShortcutRegistry {
        &mut self.shortcuts
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// Replace the type table. Colors come from the configured palette by
    /// position.
    pub fn register_type_list<S: AsRef<str>>(&mut self, names: &[S]) {
        let table = TypeStyleTable::new(names, &self.palette);
        self.factory = Some(DataConversionFactory::new(table));
    }

    pub fn type_table(&self) -> Option<&TypeStyleTable> {
        self.factory.as_ref().map(DataConversionFactory::table)
    }

    fn color_for(&self, type_name: &str) -> Color {
        match &self.factory {
            Some(factory) => factory.color_for(type_name),
            None => {
                log::warn!("No type table registered; drawing '{}' with the fallback color", type_name);
                UNKNOWN_TYPE_COLOR
            }
        }
    }

    fn factory(&self) -> ConversionResult<&DataConversionFactory> {
        self.factory.as_ref().ok_or(ConversionError::MissingTypeTable)
    }

    // ========================================================================
    // Current action
    // ========================================================================

    /// Make `session` the current action, stopping the previous one.
    pub fn set_current_action(&mut self, session: DrawSession) {
        self.retire_current(REASON_CHANGED);
        log::debug!("Current action is now '{}'", session.name());
        self.current = Some(session);
    }

    /// Cancel what the current action is drawing. A chained draw keeps
    /// going with a fresh shape.
    pub fn dispose_current_action(&mut self) {
        match &self.current {
            Some(session) => session.cancel_current(Some(REASON_DISPOSED)),
            None => log::debug!("No current action to dispose"),
        }
        self.pool.run_until_stalled();
    }

    pub fn has_current_action(&self) -> bool {
        self.current.as_ref().is_some_and(|s| !s.is_settled())
    }

    pub fn current_action(&self) -> Option<&DrawSession> {
        self.current.as_ref()
    }

    fn retire_current(&mut self, reason: &str) {
        let previous = self.current.take();
        if let Some(previous) = previous {
            if !previous.is_settled() {
                log::debug!("Stopping '{}': {}", previous.name(), reason);
            }
            previous.stop(Some(reason));
        }
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    /// Draw one rect of `type_name` and commit it.
    pub fn draw_rect(&mut self, type_name: &str, group_id: Option<&str>) -> ActionFuture<ShapeHandle> {
        let painter = RectPainter::new(&self.stage, self.color_for(type_name)).with_meta(rect_meta(type_name, group_id));
        let inner = painter.draw_one();
        self.start_single("draw rect", inner)
    }

    /// Draw one ignore polygon and commit it.
    pub fn draw_polygon(&mut self) -> ActionFuture<ShapeHandle> {
        let painter = PolygonPainter::new(&self.stage, IGNORE_AREA_COLOR)
            .with_radius(self.config.polygon_radius)
            .with_close_key(self.config.keybindings.close_polygon)
            .with_meta(ShapeMeta::new(IGNORE_AREA_NAME));
        let inner = painter.draw_one();
        self.start_single("draw polygon", inner)
    }

    /// Keep drawing rects of `type_name` until the chain is stopped or
    /// replaced.
    pub fn draw_rect_chain(&mut self, type_name: &str, group_id: Option<&str>) -> ChainedDraw {
        let painter = RectPainter::new(&self.stage, self.color_for(type_name)).with_meta(rect_meta(type_name, group_id));
        let chain = ChainedDraw::new(format!("draw {} chain", type_name));

        let finish_stage = self.stage.downgrade();
        chain.on_finish(move || {
            if let Some(stage) = finish_stage.upgrade() {
                stage.set_is_drawing(false);
            }
        });

        self.retire_current(REASON_CHANGED);
        let commit_stage = self.stage.downgrade();
        let task = chain.run(
            move || painter.draw_one(),
            move |rect: RectHandle| {
                let shape = ShapeHandle::from(rect);
                if let Some(stage) = commit_stage.upgrade() {
                    commit_shape(&stage, &shape);
                }
                shape.id()
            },
        );
        if let Err(e) = self.spawner.spawn_local(task) {
            log::error!("Failed to start chain '{}': {}", chain.name(), e);
            chain.stop(None);
            return chain;
        }

        self.current = Some(DrawSession::Chained(chain.clone()));
        self.stage.set_is_drawing(true);
        self.pool.run_until_stalled();
        chain
    }

    /// Wrap a painter action so its shape is committed on resolution, then
    /// make it the current action.
    fn start_single<T>(&mut self, name: &str, mut inner: Action<T>) -> ActionFuture<ShapeHandle>
    where
        T: Into<ShapeHandle> + 'static,
    {
        let inner_abort: AbortHandle = inner.abort_handle();
        let spawner = self.spawner.clone();
        let (commit_stage, finish_stage) = (self.stage.downgrade(), self.stage.downgrade());

        let mut outer = Action::new(name, move |settler: Settler<ShapeHandle>| {
            let result = inner.get_result();
            let fallback = settler.clone();
            let task = async move {
                match result.await {
                    Ok(shape) => {
                        let shape = shape.into();
                        if let Some(stage) = commit_stage.upgrade() {
                            commit_shape(&stage, &shape);
                        }
                        settler.resolve(shape);
                    }
                    Err(error) => {
                        settler.reject(error);
                    }
                }
            };
            if let Err(e) = spawner.spawn_local(task) {
                fallback.reject(ActionError::Failed(format!("could not schedule commit: {}", e)));
            }
        })
        .on_cancel(move |error| {
            let reason = match error {
                ActionError::Cancelled { reason } => reason.clone(),
                other => other.to_string(),
            };
            inner_abort.dispose(Some(&reason));
        })
        .finally(move || {
            if let Some(stage) = finish_stage.upgrade() {
                stage.set_is_drawing(false);
            }
        });

        self.retire_current(REASON_CHANGED);
        let future = outer.get_result();
        log::debug!("Current action is now '{}'", outer.name());
        self.current = Some(DrawSession::Single(outer));
        self.stage.set_is_drawing(true);
        future
    }

    // ========================================================================
    // Committed shapes
    // ========================================================================

    pub fn find_shape(&self, id: &ShapeId) -> Option<ShapeHandle> {
        self.stage
            .shapes(LayerKind::Mark)
            .into_iter()
            .find(|s| &s.id() == id)
    }

    /// Committed rects, bottom to top.
    pub fn committed_rects(&self) -> Vec<RectHandle> {
        self.stage
            .shapes(LayerKind::Mark)
            .iter()
            .filter_map(|s| s.as_rect().cloned())
            .collect()
    }

    /// Committed polygons, bottom to top.
    pub fn committed_polygons(&self) -> Vec<PolygonHandle> {
        self.stage
            .shapes(LayerKind::Mark)
            .iter()
            .filter_map(|s| s.as_polygon().cloned())
            .collect()
    }

    /// Destroy a committed shape.
    pub fn remove_shape(&mut self, id: &ShapeId) -> bool {
        match self.find_shape(id) {
            Some(shape) => {
                shape.destroy(&self.stage);
                true
            }
            None => false,
        }
    }

    /// Destroy every committed shape.
    pub fn clear(&mut self) {
        for shape in self.stage.shapes(LayerKind::Mark) {
            shape.destroy(&self.stage);
        }
    }

    /// Put a committed shape into edit mode.
    pub fn start_edit(&self, id: &ShapeId) -> bool {
        match self.find_shape(id) {
            Some(ShapeHandle::Rect(rect)) => rect.start_edit(&self.stage),
            Some(ShapeHandle::Polygon(polygon)) => polygon.start_edit(&self.stage),
            None => {
                log::warn!("Cannot edit unknown shape {}", id);
                return false;
            }
        }
        true
    }

    pub fn end_edit(&self, id: &ShapeId) -> bool {
        match self.find_shape(id) {
            Some(ShapeHandle::Rect(rect)) => rect.end_edit(),
            Some(ShapeHandle::Polygon(polygon)) => polygon.end_edit(),
            None => return false,
        }
        self.stage.request_redraw();
        true
    }

    // ========================================================================
    // Business records
    // ========================================================================

    pub fn try_model_to_business(&self) -> ConversionResult<Vec<BusinessRecord>> {
        self.factory()?
            .try_model_to_business(&self.committed_rects(), &self.committed_polygons())
    }

    /// Records for every committed shape; empty on failure.
    pub fn model_to_business(&self) -> Vec<BusinessRecord> {
        self.try_model_to_business().unwrap_or_else(|e| {
            log::error!("Model to business conversion failed: {}", e);
            Vec::new()
        })
    }

    pub fn try_business_to_model(&self, records: &[BusinessRecord]) -> ConversionResult<ModelShapes> {
        Ok(self.factory()?.business_to_model(records))
    }

    /// Shapes rebuilt from records, not yet committed; empty on failure.
    pub fn business_to_model(&self, records: &[BusinessRecord]) -> ModelShapes {
        self.try_business_to_model(records).unwrap_or_else(|e| {
            log::error!("Business to model conversion failed: {}", e);
            ModelShapes::default()
        })
    }

    /// Rebuild shapes from records and commit them. Returns how many shapes
    /// were added.
    pub fn load_business(&mut self, records: &[BusinessRecord]) -> ConversionResult<usize> {
        let model = self.try_business_to_model(records)?;
        let count = model.rects.len() + model.polygons.len();
        for rect in model.rects {
            commit_shape(&self.stage, &RectHandle::new(rect).into());
        }
        for polygon in model.polygons {
            commit_shape(&self.stage, &PolygonHandle::new(polygon).into());
        }
        log::info!("Loaded {} shape(s) from {} record(s)", count, records.len());
        Ok(count)
    }

    pub fn load_business_json(&mut self, json: &str) -> ConversionResult<usize> {
        let records = records_from_json(json)?;
        self.load_business(&records)
    }

    pub fn business_json(&self) -> ConversionResult<String> {
        records_to_json(&self.try_model_to_business()?)
    }

    // ========================================================================
    // Range validation
    // ========================================================================

    /// Keep committed shapes inside the image. Registering twice is a no-op.
    pub fn register_range(&mut self) {
        if self.range.is_none() {
            self.range = Some(RangeValidator::register(&self.stage));
        }
    }

    pub fn unregister_range(&mut self) {
        self.range = None;
    }

    pub fn is_range_registered(&self) -> bool {
        self.range.is_some()
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub fn is_group_mode(&self) -> bool {
        self.group.is_active()
    }

    pub fn group_list(&self) -> Vec<GroupRef> {
        parse_rects_to_group_list(&self.committed_rects())
    }

    fn rects_in_group(&self, group_id: &str) -> Vec<RectHandle> {
        self.committed_rects()
            .into_iter()
            .filter(|r| r.borrow().group_id() == Some(group_id))
            .collect()
    }

    /// Mark the rects of `group_id` selected and every other rect
    /// unselected. Returns how many rects are selected.
    pub fn select_group(&mut self, group_id: &str) -> usize {
        let mut selected = 0;
        for rect in self.committed_rects() {
            let in_group = rect.borrow().group_id() == Some(group_id);
            let status = if in_group {
                selected += 1;
                GroupStatus::Selected
            } else {
                GroupStatus::Unselected
            };
            rect.borrow_mut().set_group_status(status);
        }
        self.stage.request_redraw();
        selected
    }

    /// Translate every rect of a group.
    pub fn move_group(&mut self, group_id: &str, dx: f32, dy: f32) -> usize {
        let rects = self.rects_in_group(group_id);
        for rect in &rects {
            rect.borrow_mut().translate(dx, dy);
        }
        self.stage.request_redraw();
        rects.len()
    }

    /// Destroy every rect of a group. Returns the removed ids.
    pub fn delete_group(&mut self, group_id: &str) -> Vec<ShapeId> {
        let rects = self.rects_in_group(group_id);
        for rect in &rects {
            rect.destroy(&self.stage);
        }
        log::info!("Deleted group {} ({} rect(s))", group_id, rects.len());
        rects.iter().map(RectHandle::id).collect()
    }

    // ========================================================================
    // Plugins and guides
    // ========================================================================

    /// Install a plugin. One with the same name is replaced.
    pub fn install_plugin(&mut self, mut plugin: Box<dyn ScenePlugin>) {
        self.uninstall_plugin(plugin.name());
        plugin.install(&self.stage);
        log::debug!("Installed plugin {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// Zoom, drag and deep select, bound to the configured keys.
    pub fn install_default_plugins(&mut self) {
        let keys = self.config.keybindings;
        self.install_plugin(Box::new(StageScalePlugin::new()));
        self.install_plugin(Box::new(StageDragPlugin::new().with_key(keys.stage_drag)));
        self.install_plugin(Box::new(DeepSelectPlugin::new().with_key(keys.deep_select)));
    }

    pub fn uninstall_plugin(&mut self, name: &str) -> bool {
        let Some(index) = self.plugins.iter().position(|p| p.name() == name) else {
            return false;
        };
        let mut plugin = self.plugins.remove(index);
        plugin.uninstall(&self.stage);
        log::debug!("Uninstalled plugin {}", name);
        true
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn enable_crosshair(&mut self, enabled: bool) {
        self.crosshair.enable(enabled);
    }

    pub fn crosshair_lines(&self) -> Option<CrosshairLines> {
        self.crosshair.lines()
    }
}

fn rect_meta(type_name: &str, group_id: Option<&str>) -> ShapeMeta {
    match group_id {
        Some(group) => ShapeMeta::new(type_name).with_group(group),
        None => ShapeMeta::new(type_name),
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(LabelConfig::default())
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.retire_current(REASON_DISPOSED);
        for plugin in &mut self.plugins {
            plugin.uninstall(&self.stage);
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("current", &self.current.as_ref().map(DrawSession::name))
            .field("committed", &self.stage.shape_count(LayerKind::Mark))
            .field("range", &self.range.is_some())
            .field("plugins", &self.plugin_names())
            .finish()
    }
}
