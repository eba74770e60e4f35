//! Layout, drawing and hit testing of display items.
//!
//! Every display item owns a [`Material`]: a strategy kind plus the frame the
//! last layout pass produced. Shaping runs bottom-up from a
//! [`GeometryProposal`], offsets are assigned top-down, and both passes go
//! through the free functions of this module, which dispatch on
//! [`MaterialKind`].
//!
//! Frames hold two rectangles. The *viewport* is the cell the parent gave
//! the item, in absolute coordinates. The *drawing area* is what remains
//! after margins and padding, stored relative to the viewport origin.

mod free;
mod image;
mod inline;
mod line;
mod row;
mod stack;
mod text;

use std::collections::BTreeMap;

use tracing::warn;

pub use text::TextRun;

use crate::canvas::Canvas;
use crate::display_item::{DisplayItem, Edge, ItemId};
use crate::expression::ValueSource;
use crate::geometry::{Angle, Coords, Dimens, FillPrecedence, GeometryProposal, Rect};
use crate::image_cache::ImageSizeCache;
use crate::keywords::{AttributeKey, Property};
use crate::text::TextMeasure;

/// Read access to the item tree the layout pass walks.
pub trait LayoutTree {
    fn item(&self, id: ItemId) -> Option<&DisplayItem>;

    /// Children of `id` in layout order.
    fn ordered_children(&self, id: ItemId) -> Vec<ItemId>;

    fn values(&self) -> &dyn ValueSource;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// A plain box taking whatever it is offered.
    Simple,
    /// Children in one line along the given axis.
    Row(Angle),
    /// Children and text flowing into wrapped rows.
    Inline,
    /// Children on top of each other, all the same size.
    Stack,
    /// Children placed by their own translation.
    Free,
    Image,
    /// Wrapped text of the item itself.
    Paragraph,
}

impl MaterialKind {
    /// Picks the strategy for an item from its text, image and layout
    /// attributes.
    pub fn select(item: &DisplayItem, source: &dyn ValueSource) -> MaterialKind {
        if !item.text(source).is_empty() {
            return MaterialKind::Paragraph;
        }
        if item.image_path().is_some() {
            return MaterialKind::Image;
        }
        match item.property(AttributeKey::Layout) {
            Some(Property::Vbox) => MaterialKind::Row(Angle::Vertical),
            Some(Property::Hbox) => MaterialKind::Row(Angle::Horizontal),
            Some(Property::Inline) => MaterialKind::Inline,
            Some(Property::FreeLayout) => MaterialKind::Free,
            Some(Property::StackLayout) => MaterialKind::Stack,
            _ => MaterialKind::Simple,
        }
    }
}

/// Result of the last shape and offset passes of one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    pub viewport: Rect,
    /// Relative to `viewport.c`.
    drawing: Rect,
}

impl Frame {
    /// Drawing area in absolute coordinates.
    pub fn drawing_area(&self) -> Rect {
        Rect::new(self.drawing_offset(), self.drawing.d)
    }

    pub fn drawing_offset(&self) -> Coords {
        self.viewport.c + self.drawing.c
    }

    fn set_viewport_offset(&mut self, item: &DisplayItem, source: &dyn ValueSource, offset: Coords) {
        self.viewport.c = offset + item.translation_offset(source);
    }

    /// Aligns the drawing area inside the viewport, minding margins and
    /// padding.
    fn update_drawing_offset(&mut self, item: &DisplayItem, source: &dyn ValueSource) {
        let mut relative = Coords::default();
        for angle in [Angle::Horizontal, Angle::Vertical] {
            *relative.get_mut(angle) = item.cell_alignment_offset(
                angle,
                self.drawing.d.get(angle),
                self.viewport.d.get(angle),
                item.reserved(angle, Edge::Inner, source),
                item.reserved(angle, Edge::Outer, source),
            );
        }
        self.drawing.c = relative;
    }

    /// Aligns the drawing area ignoring reserved space.
    fn align_drawing_offset(&mut self, item: &DisplayItem) {
        let mut relative = Coords::default();
        for angle in [Angle::Horizontal, Angle::Vertical] {
            *relative.get_mut(angle) =
                item.cell_alignment_offset(angle, self.drawing.d.get(angle), self.viewport.d.get(angle), 0, 0);
        }
        self.drawing.c = relative;
    }
}

/// One cell of an inline row: a child item or one of the material's own
/// text runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineCell {
    Item(ItemId),
    Run(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineRow {
    pub cells: Vec<InlineCell>,
    /// Extent along the item flow.
    pub adjacent: i32,
    /// Extent along the row flow.
    pub opposite: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    kind: MaterialKind,
    frame: Frame,
    runs: Vec<TextRun>,
    rows: Vec<InlineRow>,
}

impl Material {
    pub fn new(kind: MaterialKind) -> Self {
        Self { kind, frame: Frame::default(), runs: Vec::new(), rows: Vec::new() }
    }

    pub fn kind(&self) -> MaterialKind {
        self.kind
    }

    /// Switches strategy, dropping anything the old one produced.
    pub fn set_kind(&mut self, kind: MaterialKind) {
        if self.kind != kind {
            *self = Material::new(kind);
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn viewport(&self) -> Rect {
        self.frame.viewport
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn rows(&self) -> &[InlineRow] {
        &self.rows
    }
}

pub type MaterialMap = BTreeMap<ItemId, Material>;

/// Everything the shape and offset passes read or write.
pub struct LayoutCx<'a> {
    pub tree: &'a dyn LayoutTree,
    pub materials: &'a mut MaterialMap,
    pub measure: &'a dyn TextMeasure,
    pub images: &'a mut ImageSizeCache,
}

impl LayoutCx<'_> {
    fn kind(&self, id: ItemId) -> MaterialKind {
        self.materials.get(&id).map_or(MaterialKind::Simple, |m| m.kind)
    }

    fn viewport_dimens(&self, id: ItemId) -> Dimens {
        self.materials.get(&id).map_or_else(Dimens::default, |m| m.frame.viewport.d)
    }

    fn material_mut(&mut self, id: ItemId) -> &mut Material {
        self.materials.entry(id).or_insert_with(|| Material::new(MaterialKind::Simple))
    }
}

pub fn fill_precedence(tree: &dyn LayoutTree, materials: &MaterialMap, id: ItemId, angle: Angle) -> FillPrecedence {
    let Some(item) = tree.item(id) else {
        return FillPrecedence::Shrinky;
    };
    if let Some(forced) = item.fill_precedence_override(angle) {
        return forced;
    }
    let source = tree.values();
    match materials.get(&id).map_or(MaterialKind::Simple, |m| m.kind) {
        MaterialKind::Simple => {
            let reserved = item.reserved_dimens(source).get(angle);
            let size = item.size(angle, source).unwrap_or(0);
            if reserved + size != 0 { FillPrecedence::Shrinky } else { FillPrecedence::Greedy }
        }
        MaterialKind::Row(_) | MaterialKind::Stack => {
            let greedy = tree
                .ordered_children(id)
                .into_iter()
                .any(|child| fill_precedence(tree, materials, child, angle) == FillPrecedence::Greedy);
            if greedy { FillPrecedence::Greedy } else { FillPrecedence::Shrinky }
        }
        MaterialKind::Inline | MaterialKind::Free | MaterialKind::Image | MaterialKind::Paragraph => {
            FillPrecedence::Shrinky
        }
    }
}

/// Shapes `id` against `proposal` and returns its viewport size.
pub fn shape(cx: &mut LayoutCx<'_>, id: ItemId, proposal: GeometryProposal) -> Dimens {
    let tree = cx.tree;
    let Some(item) = tree.item(id) else {
        warn!("cannot shape unknown display item {id}");
        return Dimens::default();
    };
    let source = tree.values();
    let kind = cx.kind(id);
    if kind == MaterialKind::Paragraph {
        return text::shape_paragraph(cx, item, proposal);
    }

    let mut revised = item.revise_proposal(proposal, source);
    let reserved = item.reserved_dimens(source);
    revised.proposed = (revised.proposed - reserved).zero_guarded();

    let drawing = match kind {
        MaterialKind::Simple => revised.proposed,
        MaterialKind::Row(angle) => row::shape(cx, id, revised, angle),
        MaterialKind::Inline => inline::shape(cx, item, revised),
        MaterialKind::Stack => stack::shape(cx, id, revised),
        MaterialKind::Free => free::shape(cx, id, revised),
        MaterialKind::Image => image::shape(cx, item, revised),
        MaterialKind::Paragraph => unreachable!("paragraphs shape themselves"),
    };

    let frame = &mut cx.material_mut(id).frame;
    frame.drawing.d = drawing;
    frame.viewport.d = proposal.round_conflicts(drawing + reserved);
    frame.viewport.d
}

/// Places `id` with its viewport at `offset`, then its children.
pub fn set_absolute_offset(cx: &mut LayoutCx<'_>, id: ItemId, offset: Coords) {
    let tree = cx.tree;
    let Some(item) = tree.item(id) else {
        warn!("cannot place unknown display item {id}");
        return;
    };
    let source = tree.values();
    let kind = cx.kind(id);
    if kind == MaterialKind::Paragraph {
        text::offset_paragraph(cx, item, offset);
        return;
    }

    let frame = {
        let frame = &mut cx.material_mut(id).frame;
        frame.set_viewport_offset(item, source, offset);
        frame.update_drawing_offset(item, source);
        *frame
    };
    match kind {
        MaterialKind::Row(angle) => row::set_offset(cx, id, &frame, angle),
        MaterialKind::Inline => inline::set_offset(cx, item, &frame),
        MaterialKind::Stack => {
            for child in tree.ordered_children(id) {
                set_absolute_offset(cx, child, offset);
            }
        }
        MaterialKind::Free => {
            for child in tree.ordered_children(id) {
                set_absolute_offset(cx, child, frame.drawing_offset());
            }
        }
        MaterialKind::Simple | MaterialKind::Image | MaterialKind::Paragraph => {}
    }
}

/// Everything the draw pass needs.
pub struct PaintCx<'a> {
    pub tree: &'a dyn LayoutTree,
    pub materials: &'a MaterialMap,
    pub images: &'a mut ImageSizeCache,
    pub canvas: &'a mut dyn Canvas,
}

/// Draws `id` clipped to its viewport, then its children.
pub fn draw(cx: &mut PaintCx<'_>, id: ItemId) {
    let tree = cx.tree;
    let materials = cx.materials;
    let Some(item) = tree.item(id) else { return };
    let Some(material) = materials.get(&id) else { return };
    let source = tree.values();

    cx.canvas.push_clip(material.frame.viewport);
    match material.kind {
        MaterialKind::Paragraph => text::draw_runs(cx.canvas, tree, &material.runs),
        MaterialKind::Image => image::draw(cx, item, &material.frame),
        MaterialKind::Inline => {
            draw_basic(cx.canvas, item, source, &material.frame);
            for row in &material.rows {
                for cell in &row.cells {
                    match *cell {
                        InlineCell::Item(child) => draw(cx, child),
                        InlineCell::Run(index) => {
                            if let Some(run) = material.runs.get(index) {
                                text::draw_runs(cx.canvas, tree, std::slice::from_ref(run));
                            }
                        }
                    }
                }
            }
        }
        MaterialKind::Simple => draw_basic(cx.canvas, item, source, &material.frame),
        MaterialKind::Row(_) | MaterialKind::Stack | MaterialKind::Free => {
            draw_basic(cx.canvas, item, source, &material.frame);
            for child in tree.ordered_children(id) {
                draw(cx, child);
            }
        }
    }
    cx.canvas.pop_clip();
}

/// Paints the element color over the drawing area grown by the padding.
fn draw_basic(canvas: &mut dyn Canvas, item: &DisplayItem, source: &dyn ValueSource, frame: &Frame) {
    let Some(color) = item.element_color() else { return };
    let mut area = frame.drawing_area();
    area.c -= item.inner_padding(source);
    area.d += item.padding_dimens(source);
    canvas.fill_rect(area, color, item.alpha());
}

/// Calls `fun` for `item` when `target` hits its drawing area grown by the
/// padding.
fn hit_single(
    item: &DisplayItem,
    source: &dyn ValueSource,
    frame: &Frame,
    target: &Rect,
    fun: &mut dyn FnMut(ItemId) -> bool,
) -> bool {
    if !frame.viewport.intersects(target) {
        return false;
    }
    let mut area = frame.drawing_area();
    area.c -= item.inner_padding(source);
    area.d += item.padding_dimens(source);
    area.intersects(target) && fun(item.id())
}

/// Calls `fun` for items under `target`, innermost first, until it returns
/// true.
pub fn apply_to_colliding(
    tree: &dyn LayoutTree,
    materials: &MaterialMap,
    id: ItemId,
    target: &Rect,
    fun: &mut dyn FnMut(ItemId) -> bool,
) -> bool {
    let Some(item) = tree.item(id) else { return false };
    let Some(material) = materials.get(&id) else { return false };
    let source = tree.values();
    let frame = &material.frame;

    match material.kind {
        MaterialKind::Simple | MaterialKind::Image => hit_single(item, source, frame, target, fun),
        MaterialKind::Paragraph => text::hit_runs(tree, &material.runs, target, fun),
        MaterialKind::Row(_) | MaterialKind::Free => {
            tree.ordered_children(id)
                .into_iter()
                .any(|child| apply_to_colliding(tree, materials, child, target, fun))
                || hit_single(item, source, frame, target, fun)
        }
        MaterialKind::Stack => {
            let hit = tree
                .ordered_children(id)
                .into_iter()
                .rev()
                .any(|child| apply_to_colliding(tree, materials, child, target, fun));
            if !hit {
                // Stacks let hits fall through to whatever is behind them.
                hit_single(item, source, frame, target, fun);
            }
            hit
        }
        MaterialKind::Inline => {
            for row in &material.rows {
                for cell in &row.cells {
                    let hit = match *cell {
                        InlineCell::Item(child) => apply_to_colliding(tree, materials, child, target, fun),
                        InlineCell::Run(index) => material
                            .runs
                            .get(index)
                            .is_some_and(|run| text::hit_runs(tree, std::slice::from_ref(run), target, fun)),
                    };
                    if hit {
                        return true;
                    }
                }
            }
            hit_single(item, source, frame, target, fun)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::rc::Rc;

    use super::*;
    use crate::color::Color;
    use crate::element::Element;
    use crate::expression::Expression;
    use crate::reference::ReferenceAttribute;
    use crate::runtime::AttributeSignals;
    use crate::text::MonospaceMeasure;
    use crate::value_key::ScopedValueKey;

    struct Quiet;

    impl AttributeSignals for Quiet {
        fn signal_change(&mut self, _: ItemId, _: AttributeKey) {}
        fn request_tick(&mut self, _: ItemId, _: AttributeKey) {}
        fn cancel_tick(&mut self, _: ItemId, _: AttributeKey) {}
    }

    struct NoValues;

    impl ValueSource for NoValues {
        fn get_number(&self, _: ItemId, _: &ScopedValueKey) -> f64 {
            0.0
        }
        fn get_string(&self, _: ItemId, _: &ScopedValueKey) -> String {
            String::new()
        }
    }

    /// Small hand-built tree; children keep insertion order.
    #[derive(Default)]
    pub(crate) struct TestTree {
        items: BTreeMap<ItemId, DisplayItem>,
        order: BTreeMap<ItemId, Vec<ItemId>>,
        pub materials: MaterialMap,
        next: u64,
    }

    pub(crate) fn scalar(value: f64) -> ReferenceAttribute {
        ReferenceAttribute { active: true, expr: Some(Rc::new(Expression::constant(value))), ..Default::default() }
    }

    pub(crate) fn property(p: Property) -> ReferenceAttribute {
        ReferenceAttribute { active: true, property: Some(p), ..Default::default() }
    }

    pub(crate) fn literal(text: &str) -> ReferenceAttribute {
        ReferenceAttribute { active: true, literal: Some(text.to_string()), ..Default::default() }
    }

    pub(crate) fn color(c: Color) -> ReferenceAttribute {
        ReferenceAttribute { active: true, color: Some(c), ..Default::default() }
    }

    impl TestTree {
        pub(crate) fn add(&mut self, parent: Option<ItemId>, attrs: &[(AttributeKey, ReferenceAttribute)]) -> ItemId {
            self.next += 1;
            let id = ItemId::from_raw(self.next);
            let mut element = Element::new(self.next as usize, vec![format!("Item{}", self.next)]);
            for (key, attr) in attrs {
                element.default_set_mut().insert(*key, attr.clone());
            }
            let mut item = DisplayItem::new(id, &element, None);
            item.recompute_attribute_set(&mut Quiet);
            if let Some(parent) = parent {
                item.set_parent_link(Some(parent));
                if let Some(p) = self.items.get_mut(&parent) {
                    p.insert_child_link(id);
                }
                self.order.entry(parent).or_default().push(id);
            }
            let kind = MaterialKind::select(&item, &NoValues);
            self.items.insert(id, item);
            self.materials.insert(id, Material::new(kind));
            id
        }

        pub(crate) fn layout(&mut self, root: ItemId, proposal: GeometryProposal) -> Dimens {
            let measure = MonospaceMeasure::default();
            let mut images = ImageSizeCache::new();
            let mut materials = std::mem::take(&mut self.materials);
            let size = {
                let mut cx = LayoutCx { tree: &*self, materials: &mut materials, measure: &measure, images: &mut images };
                let size = shape(&mut cx, root, proposal);
                set_absolute_offset(&mut cx, root, Coords::default());
                size
            };
            self.materials = materials;
            size
        }

        pub(crate) fn viewport(&self, id: ItemId) -> Rect {
            self.materials[&id].viewport()
        }

        pub(crate) fn hits(&self, root: ItemId, at: Coords) -> BTreeSet<ItemId> {
            let mut hit = BTreeSet::new();
            let target = Rect::new(at, Dimens::new(1, 1));
            apply_to_colliding(self, &self.materials, root, &target, &mut |id| {
                hit.insert(id);
                false
            });
            hit
        }
    }

    impl LayoutTree for TestTree {
        fn item(&self, id: ItemId) -> Option<&DisplayItem> {
            self.items.get(&id)
        }

        fn ordered_children(&self, id: ItemId) -> Vec<ItemId> {
            self.order.get(&id).cloned().unwrap_or_default()
        }

        fn values(&self) -> &dyn ValueSource {
            &NoValues
        }
    }

    pub(crate) fn fixed(w: i32, h: i32) -> GeometryProposal {
        GeometryProposal::new(Dimens::new(w, h))
    }

    #[test]
    fn test_select_kind() {
        let mut tree = TestTree::default();
        let vbox = tree.add(None, &[(AttributeKey::Layout, property(Property::Vbox))]);
        let text = tree.add(None, &[(AttributeKey::Text, literal("hi"))]);
        let image = tree.add(None, &[(AttributeKey::ImagePath, literal("a.png"))]);
        let plain = tree.add(None, &[]);
        assert_eq!(tree.materials[&vbox].kind(), MaterialKind::Row(Angle::Vertical));
        assert_eq!(tree.materials[&text].kind(), MaterialKind::Paragraph);
        assert_eq!(tree.materials[&image].kind(), MaterialKind::Image);
        assert_eq!(tree.materials[&plain].kind(), MaterialKind::Simple);
    }

    #[test]
    fn test_simple_box_reserves_margins() {
        let mut tree = TestTree::default();
        let item = tree.add(None, &[(AttributeKey::MarginAdjIn, scalar(5.0)), (AttributeKey::PaddingOppIn, scalar(2.0))]);
        let size = tree.layout(item, fixed(100, 50));
        assert_eq!(size, Dimens::new(100, 50));
        let frame = *tree.materials[&item].frame();
        assert_eq!(frame.drawing_area(), Rect::new(Coords::new(5, 2), Dimens::new(95, 48)));
    }

    #[test]
    fn test_simple_precedence_follows_size() {
        let mut tree = TestTree::default();
        let sized = tree.add(None, &[(AttributeKey::SizeA, scalar(10.0))]);
        let free = tree.add(None, &[]);
        assert_eq!(fill_precedence(&tree, &tree.materials, sized, Angle::Horizontal), FillPrecedence::Shrinky);
        assert_eq!(fill_precedence(&tree, &tree.materials, sized, Angle::Vertical), FillPrecedence::Greedy);
        assert_eq!(fill_precedence(&tree, &tree.materials, free, Angle::Horizontal), FillPrecedence::Greedy);
    }

    #[test]
    fn test_draw_fills_padding_box() {
        let mut tree = TestTree::default();
        let item = tree.add(
            None,
            &[
                (AttributeKey::ElementColor, color(Color::WHITE)),
                (AttributeKey::MarginAdjIn, scalar(4.0)),
                (AttributeKey::PaddingAdjIn, scalar(3.0)),
            ],
        );
        tree.layout(item, fixed(50, 20));
        let mut canvas = crate::canvas::RecordingCanvas::new(Dimens::new(50, 20));
        let mut images = ImageSizeCache::new();
        let mut cx = PaintCx { tree: &tree, materials: &tree.materials, images: &mut images, canvas: &mut canvas };
        draw(&mut cx, item);
        let fills: Vec<_> = canvas.fills().collect();
        assert_eq!(fills, vec![(Rect::new(Coords::new(4, 0), Dimens::new(46, 20)), Color::WHITE)]);
        assert_eq!(canvas.clip_depth(), 0);
    }
}
