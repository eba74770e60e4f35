//! The frame loop tying documents, states, models and a driver together.
//!
//! An [`Environment`] owns everything a running document needs. Each call to
//! [`Environment::run_frame`] recomputes dirty items, advances animations,
//! applies queued model events, runs change acceptors, dispatches triggers
//! and finally lets the driver lay out and draw what was invalidated.

mod acceptors;
mod setup;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::{Duration, Instant};

use ivd_config::IvdConfig;
use tracing::{debug, info, warn};

use crate::display_item::ItemId;
use crate::document::Document;
use crate::driver::{Driver, DriverRequest, HeadlessDriver, Scene};
use crate::error::{DocumentError, LoadStatus, digest};
use crate::geometry::{Dimens, Rect};
use crate::image_cache::ImageSizeCache;
use crate::keywords::AttributeKey;
use crate::material::{MaterialMap, apply_to_colliding};
use crate::model::{ContainerId, ModelEvent, ModelItemId, ModelStore};
use crate::runtime::AttributeSignals;
use crate::state::{StateKey, StateManager, VirtualStateKeyPrecursor};
use crate::states;
use crate::text::MonospaceMeasure;
use crate::value_key::ScopedValueKey;
use crate::world::World;

pub(crate) use setup::resolve_state_key;

/// Attribute changes and animation requests raised while committing.
#[derive(Debug, Default)]
struct FrameQueues {
    /// Position changes, applied before every other acceptor.
    draw_tree: BTreeSet<(ItemId, AttributeKey)>,
    changed: BTreeSet<(ItemId, AttributeKey)>,
    ticking: BTreeSet<(ItemId, AttributeKey)>,
}

impl FrameQueues {
    fn forget(&mut self, item: ItemId) {
        self.draw_tree.retain(|(id, _)| *id != item);
        self.changed.retain(|(id, _)| *id != item);
        self.ticking.retain(|(id, _)| *id != item);
    }
}

impl AttributeSignals for FrameQueues {
    fn signal_change(&mut self, item: ItemId, key: AttributeKey) {
        if key == AttributeKey::PositionWithin {
            self.draw_tree.insert((item, key));
        } else {
            self.changed.insert((item, key));
        }
    }

    fn request_tick(&mut self, item: ItemId, key: AttributeKey) {
        self.ticking.insert((item, key));
    }

    fn cancel_tick(&mut self, item: ItemId, key: AttributeKey) {
        self.ticking.remove(&(item, key));
    }
}

pub struct Environment<D: Driver = HeadlessDriver> {
    world: World,
    states: StateManager,
    materials: MaterialMap,
    queues: FrameQueues,
    driver: D,
    measure: MonospaceMeasure,
    images: ImageSizeCache,
    config: IvdConfig,
    document: Option<Document>,
    load_error: Option<DocumentError>,
    /// Keys an item's `triggers` attribute fired this frame.
    trigger_map: BTreeMap<ItemId, Vec<ScopedValueKey>>,
    /// Virtual keys waiting for the states they reference to be registered.
    deferred: Vec<(ItemId, VirtualStateKeyPrecursor)>,
    windows: BTreeSet<ItemId>,
    /// Set when the last frame left work for the next one.
    busy: bool,
    frames: u64,
}

impl Environment<HeadlessDriver> {
    pub fn new() -> Self {
        Self::with_config(IvdConfig::default())
    }

    /// Headless environment with windows sized and titled from `config`.
    pub fn with_config(config: IvdConfig) -> Self {
        let size = Dimens::new(config.window.default_width, config.window.default_height);
        let driver = HeadlessDriver::new(size).with_title(config.window.title.clone());
        Self::with_driver(config, driver)
    }
}

impl Default for Environment<HeadlessDriver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Driver> Environment<D> {
    pub fn with_driver(config: IvdConfig, driver: D) -> Self {
        let measure = MonospaceMeasure {
            advance_ratio: f64::from(config.text.advance_ratio),
            line_height_ratio: f64::from(config.text.line_height_ratio),
        };
        Self {
            world: World::new(),
            states: StateManager::new(),
            materials: MaterialMap::new(),
            queues: FrameQueues::default(),
            driver,
            measure,
            images: ImageSizeCache::new(),
            config,
            document: None,
            load_error: None,
            trigger_map: BTreeMap::new(),
            deferred: Vec::new(),
            windows: BTreeSet::new(),
            busy: true,
            frames: 0,
        }
    }

    pub fn config(&self) -> &IvdConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn states(&self) -> &StateManager {
        &self.states
    }

    pub fn models(&self) -> &ModelStore {
        &self.world.models
    }

    /// Changes made here are picked up through the model event queue on
    /// the next frame.
    pub fn models_mut(&mut self) -> &mut ModelStore {
        &mut self.world.models
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Root items of the draw tree.
    pub fn windows(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.windows.iter().copied()
    }

    /// The display item of the element at `path`, instantiated statically or
    /// for `model`.
    pub fn item_for_path(&self, path: &[&str], model: Option<ModelItemId>) -> Option<ItemId> {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let element = self.world.element_for_path(&path)?;
        self.world.instance_of(element, model)
    }

    /// Registers a root model container that elements bind to by name.
    pub fn add_model(&mut self, name: &str) -> ContainerId {
        debug!(model = name, "adding root model");
        self.world.models.add_root_container(name)
    }

    /// Loads an element document from disk and instantiates its static
    /// elements.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> LoadStatus {
        let path = path.as_ref();
        match Document::load(path) {
            Ok(document) => self.load_document(document),
            Err(e) => self.reject(e),
        }
    }

    pub fn load_str(&mut self, source: &str) -> LoadStatus {
        match Document::parse(source) {
            Ok(document) => self.load_document(document),
            Err(e) => self.reject(e),
        }
    }

    fn reject(&mut self, error: DocumentError) -> LoadStatus {
        warn!("element document rejected: {error}");
        let status = error.status();
        self.load_error = Some(error);
        status
    }

    pub fn load_document(&mut self, document: Document) -> LoadStatus {
        if self.document.is_some() {
            warn!("an element document is already loaded, ignoring the new one");
            return LoadStatus::CompileError;
        }
        for element in document.elements() {
            self.world.index_element(element);
            if self.config.diagnostics.print_elements {
                info!(element = %element.name(), layers = element.keyed_len(), "compiled element");
            }
        }
        let statics: Vec<usize> = document.static_elements().map(|e| e.stamp()).collect();
        info!(elements = document.len(), statics = statics.len(), "element document loaded");
        self.document = Some(document);
        self.load_error = None;

        for stamp in statics {
            self.setup_display_item(stamp, None);
        }
        self.process_deferred_virtual_states();
        self.busy = true;
        LoadStatus::Success
    }

    /// Human readable report of why the last load failed. Empty after a
    /// successful load.
    pub fn compiler_errors(&self) -> String {
        match &self.load_error {
            None => String::new(),
            Some(DocumentError::Compile(errors)) => digest(errors),
            Some(other) => format!("{other}\n"),
        }
    }

    /// Runs frames until the quit trigger fires or the configured frame
    /// limit is reached, sleeping between idle frames.
    pub fn run(&mut self) {
        let sleep = Duration::from_millis(self.config.runtime.idle_sleep_ms);
        let mut ran = 0u64;
        loop {
            let alive = self.run_frame();
            ran += 1;
            if !alive {
                info!(frames = ran, "quit trigger received");
                break;
            }
            if self.config.runtime.max_frames.is_some_and(|max| ran >= max) {
                info!(frames = ran, "frame limit reached");
                break;
            }
            if self.is_idle() {
                std::thread::sleep(sleep);
            }
        }
    }

    /// Runs frames until nothing is left to do, at most `limit` of them.
    /// Returns the number of frames run, or `None` when the quit trigger
    /// fired.
    pub fn run_until_idle(&mut self, limit: u64) -> Option<u64> {
        let mut ran = 0;
        while ran < limit {
            ran += 1;
            if !self.run_frame() {
                return None;
            }
            if self.is_idle() {
                break;
            }
        }
        Some(ran)
    }

    /// Nothing is dirty, animating, queued or pending in the driver.
    pub fn is_idle(&self) -> bool {
        !self.busy && !self.driver.check_anything_to_do()
    }

    /// One pass of the frame loop. Returns `false` once the quit trigger
    /// fired during this frame.
    pub fn run_frame(&mut self) -> bool {
        self.frames += 1;
        let stamp_before = self.states.last_stamp();

        let dirty = self.world.take_dirty();
        if !dirty.is_empty() {
            debug!(frame = self.frames, items = dirty.len(), "recomputing attribute sets");
        }
        for id in dirty {
            self.update_item(id);
        }

        self.tick_animations(Instant::now());
        self.states.reset_trigger_states(&mut self.world);

        while let Some(event) = self.world.models.pop_event() {
            self.apply_model_event(event);
        }

        self.run_draw_tree_acceptors();
        self.run_change_acceptors();
        let quit = self.dispatch_triggers();

        self.drive();

        self.busy = self.world.has_dirty()
            || self.world.models.has_events()
            || !self.queues.ticking.is_empty()
            || !self.queues.changed.is_empty()
            || !self.queues.draw_tree.is_empty()
            || self.states.last_stamp() != stamp_before;
        !quit
    }

    fn update_item(&mut self, id: ItemId) {
        let Some(item) = self.world.item_mut(id) else { return };
        item.recompute_attribute_set(&mut self.queues);
        self.execute_state_changers(id);
        self.fire_sets(id);
    }

    /// Advances every running animation. Entries cancelled by an earlier
    /// tick in the same pass are skipped.
    fn tick_animations(&mut self, now: Instant) {
        let snapshot: Vec<(ItemId, AttributeKey)> = self.queues.ticking.iter().copied().collect();
        for entry in snapshot {
            if !self.queues.ticking.contains(&entry) {
                continue;
            }
            let (id, key) = entry;
            match self.world.item_mut(id) {
                Some(item) => item.attrs_mut().attr_mut(key).tick(now, id, &mut self.queues),
                None => {
                    self.queues.ticking.remove(&entry);
                }
            }
        }
    }

    fn apply_model_event(&mut self, event: ModelEvent) {
        debug!(?event, "model event");
        match event {
            ModelEvent::ItemAdded { container, item } => {
                let path = match self.world.models.model_path(container) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("added model item {item} has no usable path: {e}");
                        return;
                    }
                };
                let stamps: Vec<usize> = self
                    .document
                    .iter()
                    .flat_map(|d| d.elements_for_model(&path))
                    .map(|e| e.stamp())
                    .collect();
                for stamp in stamps {
                    self.setup_display_item(stamp, Some(item));
                }
                self.process_deferred_virtual_states();
            }
            ModelEvent::ItemRemoved { item, .. } => self.destroy_model_item(item),
            ModelEvent::OrderInvalidated { container } => {
                if let Some(first) = self.world.models.first(container) {
                    self.invalidate_first_display_item(first);
                }
            }
            ModelEvent::ItemsSwapped { first, second, .. } => {
                self.invalidate_first_display_item(first);
                self.invalidate_first_display_item(second);
            }
            ModelEvent::ItemSet { item } => {
                let bound = self.world.models.display_items(item).to_vec();
                for id in bound {
                    let key = StateKey::item(states::item::MODEL_CHANGED, id);
                    self.states.set_trigger_if_observed(&key, &mut self.world);
                    self.select_material(id);
                    self.driver.invalidate_geometry(id);
                }
            }
            ModelEvent::StateSet { key } => {
                self.states.mutate_if_observed(&key, true, &mut self.world);
            }
            ModelEvent::StateUnset { key } => {
                self.states.mutate_if_observed(&key, false, &mut self.world);
            }
        }
    }

    fn invalidate_first_display_item(&mut self, model: ModelItemId) {
        if let Some(id) = self.world.models.display_items(model).first().copied() {
            self.driver.invalidate_geometry(id);
        }
    }

    /// Input, hover and presentation.
    fn drive(&mut self) {
        for request in self.driver.process_events() {
            self.apply_request(request);
        }
        self.world.set_mouse(self.driver.mouse_point());
        if self.driver.check_hover_invalidated() {
            self.update_hover();
        }
        let mut scene = Scene {
            tree: &self.world,
            materials: &mut self.materials,
            measure: &self.measure,
            images: &mut self.images,
        };
        self.driver.refresh(&mut scene);
    }

    fn apply_request(&mut self, request: DriverRequest) {
        match request {
            DriverRequest::Trigger(key) => self.states.set_trigger_if_observed(&key, &mut self.world),
            DriverRequest::Mutate(key, value) => {
                self.states.mutate_if_observed(&key, value, &mut self.world);
            }
            DriverRequest::MutateAll(identity, value) => self.states.mutate_all(&identity, value, &mut self.world),
        }
    }

    /// Hover goes to the first item under the mouse that takes the hit.
    fn update_hover(&mut self) {
        self.states.mutate_all(states::item::HOVER, false, &mut self.world);
        let Some(root) = self.driver.window_item_with_mouse_focus() else { return };
        let target = Rect::new(self.driver.mouse_point(), Dimens::new(1, 1));
        let mut hit = None;
        apply_to_colliding(&self.world, &self.materials, root, &target, &mut |id| {
            hit = Some(id);
            true
        });
        if let Some(id) = hit {
            self.states.mutate_if_observed(&StateKey::item(states::item::HOVER, id), true, &mut self.world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::HeadlessInput;
    use crate::geometry::Coords;
    use crate::model::ModelCallbacks;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        numbers: BTreeMap<String, f64>,
        triggered: Rc<RefCell<Vec<String>>>,
    }

    impl ModelCallbacks for Recorder {
        fn get_number(&self, key: &str) -> f64 {
            self.numbers.get(key).copied().unwrap_or(0.0)
        }

        fn get_string(&self, key: &str) -> String {
            format!("<{key}>")
        }

        fn set_number(&mut self, key: &str, value: f64) {
            self.numbers.insert(key.to_string(), value);
        }

        fn set_string(&mut self, _: &str, _: &str) {}

        fn on_trigger(&mut self, key: &str) {
            self.triggered.borrow_mut().push(key.to_string());
        }
    }

    fn window_doc(extra: &str) -> String {
        format!(
            r##"{{ "elements": [
  {{ "path": ["Window"], "attributes": {{ "position-within": "Environment", "layout": "vbox" }},
    "states": [ {{ "when": "this.IVD-Window-Initialized", "attributes": {{ "trigger-state": ["this.ready"] }} }},
                {{ "when": "this.ready", "attributes": {{ "title-text": "Ready" }} }} ] }}{extra}
] }}"##
        )
    }

    fn window_of(env: &Environment) -> ItemId {
        env.item_for_path(&["Window"], None).unwrap()
    }

    #[test]
    fn test_load_places_window_and_draws() {
        let mut env = Environment::new();
        assert_eq!(env.load_str(&window_doc("")), LoadStatus::Success);
        assert!(env.compiler_errors().is_empty());
        assert!(env.run_until_idle(20).is_some());

        let window = window_of(&env);
        assert_eq!(env.windows().collect::<Vec<_>>(), vec![window]);
        let headless = env.driver().window(window).unwrap();
        assert_eq!(headless.size(), Dimens::new(640, 480));
        assert!(env.driver().frames() >= 1);
        assert!(env.is_idle());
    }

    #[test]
    fn test_trigger_state_is_a_pulse() {
        let mut env = Environment::new();
        env.load_str(&window_doc(""));
        env.run_until_idle(20);
        let window = window_of(&env);
        // Initialized fired once, `ready` was triggered and reset again.
        assert!(!env.states().check_state(&StateKey::item("ready", window)));
        assert_eq!(env.driver().window(window).unwrap().title, "IVD Window");
    }

    #[test]
    fn test_compile_errors_block_loading() {
        let mut env = Environment::new();
        let status = env.load_str(r#"{ "elements": [ { "path": ["A"], "attributes": { "width": "1 +" } } ] }"#);
        assert_eq!(status, LoadStatus::CompileError);
        assert!(env.compiler_errors().contains("line 1"));
        assert!(env.world().is_empty());
        assert_eq!(env.load_file("/no/such/file.ivd.json"), LoadStatus::FileNotFound);
    }

    #[test]
    fn test_model_items_instantiate_and_trigger() {
        let doc = window_doc(
            r##",
  { "path": ["Window", "Row"], "model": ["Todos"],
    "attributes": { "position-within": "Window", "height": "10", "triggers": ["model.remove"] } }"##,
        );
        let mut env = Environment::new();
        let todos = env.add_model("Todos");
        env.load_str(&doc);
        let triggered = Rc::new(RefCell::new(Vec::new()));
        let item = env.models_mut().push_back_new(todos).unwrap();
        let recorder = Recorder { triggered: Rc::clone(&triggered), ..Recorder::default() };
        env.models_mut().set_callbacks(item, Box::new(recorder)).unwrap();
        env.run_until_idle(20);

        let row = env.item_for_path(&["Window", "Row"], Some(item)).unwrap();
        assert_eq!(env.world().item(row).unwrap().parent(), Some(window_of(&env)));
        assert_eq!(triggered.borrow().as_slice(), ["remove".to_string()]);

        env.models_mut().erase_later(item).unwrap();
        env.run_until_idle(20);
        assert!(env.world().item(row).is_none());
        assert_eq!(env.models().len(todos), 0);
    }

    #[test]
    fn test_quit_trigger_stops_the_loop() {
        let doc = r##"{ "elements": [
  { "path": ["Window"], "attributes": { "position-within": "Environment" },
    "states": [ { "when": "this.IVD-Window-Initialized", "attributes": { "triggers": ["::IVD-Core-Quit"] } } ] }
] }"##;
        let mut env = Environment::new();
        env.load_str(doc);
        assert_eq!(env.run_until_idle(20), None);
    }

    #[test]
    fn test_hover_follows_the_mouse() {
        let doc = window_doc(
            r##",
  { "path": ["Window", "Box"], "attributes": { "position-within": "Window", "width": "100", "height": "50" },
    "states": [ { "when": "this.IVD-Item-Hover", "attributes": { "color": "#00ff00" } } ] }"##,
        );
        let mut env = Environment::new();
        env.load_str(&doc);
        env.run_until_idle(20);
        let boxed = env.item_for_path(&["Window", "Box"], None).unwrap();
        let hover = StateKey::item(states::item::HOVER, boxed);

        env.driver_mut().script(vec![HeadlessInput::MoveMouse { window: None, at: Coords::new(5, 5) }]);
        env.run_until_idle(20);
        assert!(env.states().check_state(&hover));
        assert_eq!(env.world().mouse(), Coords::new(5, 5));

        env.driver_mut().script(vec![HeadlessInput::MoveMouse { window: None, at: Coords::new(5, 300) }]);
        env.run_until_idle(20);
        assert!(!env.states().check_state(&hover));
    }
}
