//! Platform seam: windows, input and presentation.
//!
//! The environment tells a [`Driver`] which display items are windows and
//! which of them need new geometry or a redraw; the driver answers with
//! state requests produced by input. [`HeadlessDriver`] is the in-process
//! implementation used by tests and the `ivd` binary. It draws into
//! [`RecordingCanvas`]es and replays scripted input one frame at a time.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use crate::canvas::{Canvas, RecordingCanvas};
use crate::display_item::ItemId;
use crate::geometry::{Angle, Coords, Dimens, GeometryProposal};
use crate::image_cache::ImageSizeCache;
use crate::defaults;
use crate::keywords::{AttributeKey, Property};
use crate::material::{LayoutCx, LayoutTree, MaterialMap, PaintCx, draw, set_absolute_offset, shape};
use crate::state::StateKey;
use crate::states;
use crate::text::TextMeasure;

/// What input asks of the state manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverRequest {
    Trigger(StateKey),
    Mutate(StateKey, bool),
    /// Every scoped state with this identity.
    MutateAll(String, bool),
}

/// Everything a driver needs to lay out and draw its windows.
pub struct Scene<'a> {
    pub tree: &'a dyn LayoutTree,
    pub materials: &'a mut MaterialMap,
    pub measure: &'a dyn TextMeasure,
    pub images: &'a mut ImageSizeCache,
}

pub trait Driver {
    /// `item` became the root of a window.
    fn add_display_item(&mut self, item: ItemId);
    fn remove_display_item(&mut self, item: ItemId);

    /// These accept any item; the driver finds the window it lives in.
    fn invalidate_geometry(&mut self, item: ItemId);
    fn invalidate_position(&mut self, item: ItemId);
    fn invalidate_canvas(&mut self, item: ItemId);
    fn invalidate_title_text(&mut self, item: ItemId);
    fn invalidate_visibility(&mut self, item: ItemId);

    fn process_events(&mut self) -> Vec<DriverRequest>;

    fn check_hover_invalidated(&mut self) -> bool;
    fn window_item_with_mouse_focus(&self) -> Option<ItemId>;
    /// Mouse position relative to the focused window.
    fn mouse_point(&self) -> Coords;

    /// Re-shapes and redraws whatever was invalidated.
    fn refresh(&mut self, scene: &mut Scene<'_>);
    fn check_anything_to_do(&self) -> bool;
}

/// Input replayed by [`HeadlessDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessInput {
    Request(DriverRequest),
    /// Moves the mouse into `window`, or the first window when `None`.
    MoveMouse { window: Option<ItemId>, at: Coords },
    Resize { window: Option<ItemId>, size: Dimens },
    /// A mouse button or key, named like [`states::mouse::LEFT`] or
    /// [`states::key::scan`].
    Press(String),
    Release(String),
    /// The user asked to close `window`, or the first window.
    Close { window: Option<ItemId> },
}

#[derive(Debug)]
pub struct HeadlessWindow {
    pub canvas: RecordingCanvas,
    pub title: String,
    pub visible: bool,
    size: Dimens,
    initialized: bool,
    /// Visibility has been reported at least once.
    initialized_visibility: bool,
    geometry: bool,
    redraw: bool,
    title_dirty: bool,
    visibility_dirty: bool,
}

impl HeadlessWindow {
    fn new(size: Dimens) -> Self {
        Self {
            canvas: RecordingCanvas::new(size),
            title: String::new(),
            visible: true,
            size,
            initialized: false,
            initialized_visibility: false,
            geometry: true,
            redraw: true,
            title_dirty: true,
            visibility_dirty: true,
        }
    }

    pub fn size(&self) -> Dimens {
        self.size
    }

    fn is_dirty(&self) -> bool {
        self.geometry || self.redraw || self.title_dirty || self.visibility_dirty
    }
}

#[derive(Debug, Default)]
pub struct HeadlessDriver {
    default_size: Dimens,
    /// Shown by windows whose item sets no title text.
    default_title: String,
    windows: BTreeMap<ItemId, HeadlessWindow>,
    geometry: BTreeSet<ItemId>,
    canvas: BTreeSet<ItemId>,
    title: BTreeSet<ItemId>,
    visibility: BTreeSet<ItemId>,
    script: VecDeque<Vec<HeadlessInput>>,
    requests: Vec<DriverRequest>,
    mouse: Coords,
    mouse_window: Option<ItemId>,
    hover_invalidated: bool,
    frames: u64,
}

impl HeadlessDriver {
    pub fn new(default_size: Dimens) -> Self {
        Self { default_size, default_title: defaults::TITLE_TEXT.to_string(), ..Self::default() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    /// Queues one frame worth of input.
    pub fn script(&mut self, frame: Vec<HeadlessInput>) {
        self.script.push_back(frame);
    }

    pub fn window(&self, item: ItemId) -> Option<&HeadlessWindow> {
        self.windows.get(&item)
    }

    pub fn windows(&self) -> impl Iterator<Item = (ItemId, &HeadlessWindow)> + '_ {
        self.windows.iter().map(|(id, w)| (*id, w))
    }

    /// Number of window redraws so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn pick_window(&self, window: Option<ItemId>) -> Option<ItemId> {
        window.or_else(|| self.windows.keys().next().copied())
    }

    fn apply(&mut self, input: HeadlessInput) -> Vec<DriverRequest> {
        use DriverRequest::{Mutate, Trigger};
        match input {
            HeadlessInput::Request(request) => vec![request],
            HeadlessInput::MoveMouse { window, at } => {
                let target = self.pick_window(window);
                let mut out = vec![Trigger(StateKey::global(states::mouse::MOTION))];
                if target != self.mouse_window {
                    if let Some(old) = self.mouse_window {
                        out.push(Mutate(StateKey::item(states::window::MOUSE_FOCUS, old), false));
                    }
                    if let Some(new) = target {
                        out.push(Mutate(StateKey::item(states::window::MOUSE_FOCUS, new), true));
                    }
                }
                self.mouse_window = target;
                self.mouse = at;
                self.hover_invalidated = true;
                out
            }
            HeadlessInput::Resize { window, size } => {
                if let Some(w) = self.pick_window(window).and_then(|id| self.windows.get_mut(&id)) {
                    w.size = size;
                    w.geometry = true;
                }
                Vec::new()
            }
            HeadlessInput::Press(button) => {
                let mut out = vec![
                    Trigger(StateKey::global(states::button_press(&button))),
                    Mutate(StateKey::global(states::button_active(&button)), true),
                ];
                if !states::mouse::is_button(&button) {
                    out.push(Trigger(StateKey::global(states::key::ANY)));
                }
                out
            }
            HeadlessInput::Release(button) => vec![
                Trigger(StateKey::global(states::button_release(&button))),
                Mutate(StateKey::global(states::button_active(&button)), false),
            ],
            HeadlessInput::Close { window } => {
                let Some(id) = self.pick_window(window) else { return Vec::new() };
                let mut out = vec![Trigger(StateKey::item(states::window::CLOSE_REQUEST, id))];
                if self.windows.len() == 1 {
                    out.push(Trigger(StateKey::global(states::app::CLOSE)));
                }
                out
            }
        }
    }

    /// Top-down windows keep their size; bottom-up ones shrink around their
    /// content.
    fn window_proposal(&self, tree: &dyn LayoutTree, root: ItemId, current: Dimens) -> GeometryProposal {
        let strategy = tree.item(root).map_or(Property::TopDown, |item| item.window_size_strategy());
        if strategy == Property::BottomUp {
            let mut proposal = GeometryProposal::new(self.default_size);
            proposal.set_shrink(Angle::Horizontal, true);
            proposal.set_shrink(Angle::Vertical, true);
            proposal
        } else {
            GeometryProposal::new(current)
        }
    }

    /// Routes item invalidations to the windows the items live in.
    fn route(&mut self, tree: &dyn LayoutTree) {
        let root_of = |mut id: ItemId| {
            while let Some(parent) = tree.item(id)?.parent() {
                id = parent;
            }
            Some(id)
        };
        for id in std::mem::take(&mut self.geometry) {
            if let Some(w) = root_of(id).and_then(|r| self.windows.get_mut(&r)) {
                w.geometry = true;
            }
        }
        for id in std::mem::take(&mut self.canvas) {
            if let Some(w) = root_of(id).and_then(|r| self.windows.get_mut(&r)) {
                w.redraw = true;
            }
        }
        for id in std::mem::take(&mut self.title) {
            if let Some(w) = self.windows.get_mut(&id) {
                w.title_dirty = true;
            }
        }
        for id in std::mem::take(&mut self.visibility) {
            if let Some(w) = self.windows.get_mut(&id) {
                w.visibility_dirty = true;
            }
        }
    }
}

impl Driver for HeadlessDriver {
    fn add_display_item(&mut self, item: ItemId) {
        self.windows.entry(item).or_insert_with(|| HeadlessWindow::new(self.default_size));
    }

    fn remove_display_item(&mut self, item: ItemId) {
        if self.windows.remove(&item).is_some() && self.mouse_window == Some(item) {
            self.mouse_window = None;
            self.hover_invalidated = true;
        }
    }

    fn invalidate_geometry(&mut self, item: ItemId) {
        self.geometry.insert(item);
    }

    fn invalidate_position(&mut self, item: ItemId) {
        self.canvas.insert(item);
    }

    fn invalidate_canvas(&mut self, item: ItemId) {
        self.canvas.insert(item);
    }

    fn invalidate_title_text(&mut self, item: ItemId) {
        self.title.insert(item);
    }

    fn invalidate_visibility(&mut self, item: ItemId) {
        self.visibility.insert(item);
    }

    fn process_events(&mut self) -> Vec<DriverRequest> {
        let mut out = std::mem::take(&mut self.requests);
        for input in self.script.pop_front().unwrap_or_default() {
            out.extend(self.apply(input));
        }
        out
    }

    fn check_hover_invalidated(&mut self) -> bool {
        std::mem::take(&mut self.hover_invalidated)
    }

    fn window_item_with_mouse_focus(&self) -> Option<ItemId> {
        self.mouse_window
    }

    fn mouse_point(&self) -> Coords {
        self.mouse
    }

    fn refresh(&mut self, scene: &mut Scene<'_>) {
        let tree = scene.tree;
        self.route(tree);
        let source = tree.values();
        let ids: Vec<ItemId> = self.windows.keys().copied().collect();

        for root in ids {
            let Some(item) = tree.item(root) else { continue };
            let Some(current) = self.windows.get(&root).map(|w| w.size) else { continue };
            let proposal = self.window_proposal(tree, root, current);
            let Some(window) = self.windows.get_mut(&root) else { continue };

            if window.geometry {
                let mut cx = LayoutCx {
                    tree,
                    materials: &mut *scene.materials,
                    measure: scene.measure,
                    images: &mut *scene.images,
                };
                window.size = shape(&mut cx, root, proposal);
                set_absolute_offset(&mut cx, root, Coords::default());
                window.canvas.set_size(window.size);
                window.geometry = false;
                window.redraw = true;
                self.hover_invalidated = true;
                if !window.initialized {
                    window.initialized = true;
                    self.requests.push(DriverRequest::Trigger(StateKey::item(states::window::INITIALIZED, root)));
                }
            }
            if window.title_dirty {
                window.title = if item.is_active(AttributeKey::TitleText) {
                    item.title_text(source)
                } else {
                    self.default_title.clone()
                };
                window.title_dirty = false;
            }
            if window.visibility_dirty {
                let was_visible = window.visible && window.initialized_visibility;
                window.visible = item.is_visible();
                window.visibility_dirty = false;
                window.initialized_visibility = true;
                if window.visible && !was_visible {
                    self.requests.push(DriverRequest::Trigger(StateKey::item(states::window::SHOWN, root)));
                }
                let (shown, hidden) = (window.visible, !window.visible);
                self.requests.push(DriverRequest::Mutate(StateKey::item(states::window::VISIBLE, root), shown));
                self.requests.push(DriverRequest::Mutate(StateKey::item(states::window::HIDDEN, root), hidden));
            }
            if window.redraw {
                window.canvas.clear();
                let mut cx = PaintCx {
                    tree,
                    materials: &*scene.materials,
                    images: &mut *scene.images,
                    canvas: &mut window.canvas,
                };
                draw(&mut cx, root);
                window.canvas.flush();
                window.redraw = false;
                self.frames += 1;
                debug!(window = %root, size = %window.size, "window redrawn");
            }
        }
    }

    fn check_anything_to_do(&self) -> bool {
        !self.script.is_empty()
            || !self.requests.is_empty()
            || !self.geometry.is_empty()
            || !self.canvas.is_empty()
            || !self.title.is_empty()
            || !self.visibility.is_empty()
            || self.windows.values().any(HeadlessWindow::is_dirty)
    }
}
