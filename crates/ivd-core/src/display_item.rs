//! Live instances of elements.
//!
//! A [`DisplayItem`] owns the runtime attribute set of one instantiated
//! element, the keyed layers currently contributing to it and its position in
//! the draw tree. Geometry lives with the item's material, which the
//! environment keeps beside the item.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::color::Color;
use crate::defaults;
use crate::element::Element;
use crate::expression::ValueSource;
use crate::geometry::{Alignment, Angle, Coords, Dimens, FillPrecedence, GeometryProposal};
use crate::keywords::{AttributeKey, Property};
use crate::model::ModelItemId;
use crate::reference::{AttributeLayer, ReferenceAttributeSet};
use crate::runtime::{AttributeSignals, RuntimeAttributeSet};
use crate::value_key::{ValueKey, ValueKeyPath, format_path};

/// Handle of a display item, unique for the lifetime of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side of an axis a margin or padding sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Inner,
    Outer,
}

#[derive(Debug, Clone)]
pub struct DisplayItem {
    id: ItemId,
    element_stamp: usize,
    path: ValueKeyPath,
    model: Option<ModelItemId>,
    default_layer: Rc<ReferenceAttributeSet>,
    contributing: BTreeMap<usize, Rc<ReferenceAttributeSet>>,
    attrs: RuntimeAttributeSet,
    parent: Option<ItemId>,
    children: BTreeSet<ItemId>,
    variables: BTreeMap<ValueKey, f64>,
}

impl DisplayItem {
    pub fn new(id: ItemId, element: &Element, model: Option<ModelItemId>) -> Self {
        Self {
            id,
            element_stamp: element.stamp(),
            path: element.path().clone(),
            model,
            default_layer: Rc::clone(element.default_set()),
            contributing: BTreeMap::new(),
            attrs: RuntimeAttributeSet::new(),
            parent: None,
            children: BTreeSet::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn element_stamp(&self) -> usize {
        self.element_stamp
    }

    pub fn path(&self) -> &ValueKeyPath {
        &self.path
    }

    /// Element path plus a model marker, for diagnostics.
    pub fn describe(&self) -> String {
        let kind = if self.model.is_some() { "model" } else { "static" };
        format!("[{}] {} [{kind}]", format_path(&self.path), self.id)
    }

    pub fn model(&self) -> Option<ModelItemId> {
        self.model
    }

    pub fn attrs(&self) -> &RuntimeAttributeSet {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut RuntimeAttributeSet {
        &mut self.attrs
    }

    pub fn add_attribute_set(&mut self, layer: &AttributeLayer) {
        self.contributing.insert(layer.position, Rc::clone(&layer.set));
    }

    pub fn remove_attribute_set(&mut self, layer: &AttributeLayer) {
        self.contributing.remove(&layer.position);
    }

    pub fn contributing_len(&self) -> usize {
        self.contributing.len()
    }

    /// Re-merges the default layer and every contributing layer, in position
    /// order, and reports what changed.
    pub fn recompute_attribute_set(&mut self, signals: &mut dyn AttributeSignals) {
        self.attrs.begin_recompute();
        self.attrs.merge_in(&self.default_layer);
        for layer in self.contributing.values() {
            self.attrs.merge_in(layer);
        }
        self.attrs.commit_recompute(self.id, signals);
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn children(&self) -> &BTreeSet<ItemId> {
        &self.children
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<ItemId>) {
        self.parent = parent;
    }

    pub(crate) fn insert_child_link(&mut self, child: ItemId) {
        self.children.insert(child);
    }

    pub(crate) fn remove_child_link(&mut self, child: ItemId) {
        self.children.remove(&child);
    }

    pub(crate) fn take_children(&mut self) -> BTreeSet<ItemId> {
        std::mem::take(&mut self.children)
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    pub fn set_variable(&mut self, name: impl Into<ValueKey>, value: f64) {
        self.variables.insert(name.into(), value);
    }

    pub fn number(&self, key: AttributeKey, source: &dyn ValueSource) -> Option<f64> {
        self.attrs.value(key, source, self.id)
    }

    /// Attribute value truncated to whole pixels.
    pub fn int(&self, key: AttributeKey, source: &dyn ValueSource) -> Option<i32> {
        self.number(key, source).map(|v| v as i32)
    }

    pub fn property(&self, key: AttributeKey) -> Option<Property> {
        self.attrs.attr(key).property()
    }

    pub fn is_active(&self, key: AttributeKey) -> bool {
        self.attrs.attr(key).is_active()
    }

    pub fn relative_adjacent(&self) -> Angle {
        match self.property(AttributeKey::Orientation) {
            None => defaults::ANGLE,
            Some(Property::AdjacentIsHorizontal) => Angle::Horizontal,
            Some(_) => Angle::Vertical,
        }
    }

    fn adjacent_or_opposite(&self, angle: Angle, adjacent: AttributeKey, opposite: AttributeKey) -> AttributeKey {
        if angle == self.relative_adjacent() { adjacent } else { opposite }
    }

    pub fn margin(&self, angle: Angle, edge: Edge, source: &dyn ValueSource) -> i32 {
        let key = match edge {
            Edge::Inner => self.adjacent_or_opposite(angle, AttributeKey::MarginAdjIn, AttributeKey::MarginOppIn),
            Edge::Outer => self.adjacent_or_opposite(angle, AttributeKey::MarginAdjOut, AttributeKey::MarginOppOut),
        };
        self.int(key, source).unwrap_or(0)
    }

    pub fn padding(&self, angle: Angle, edge: Edge, source: &dyn ValueSource) -> i32 {
        let key = match edge {
            Edge::Inner => self.adjacent_or_opposite(angle, AttributeKey::PaddingAdjIn, AttributeKey::PaddingOppIn),
            Edge::Outer => self.adjacent_or_opposite(angle, AttributeKey::PaddingAdjOut, AttributeKey::PaddingOppOut),
        };
        self.int(key, source).unwrap_or(0)
    }

    /// Margin plus padding on one side of `angle`.
    pub fn reserved(&self, angle: Angle, edge: Edge, source: &dyn ValueSource) -> i32 {
        self.margin(angle, edge, source) + self.padding(angle, edge, source)
    }

    /// Everything margins and paddings take away from the drawing area.
    pub fn reserved_dimens(&self, source: &dyn ValueSource) -> Dimens {
        let axis = |a| self.reserved(a, Edge::Inner, source) + self.reserved(a, Edge::Outer, source);
        Dimens::new(axis(Angle::Horizontal), axis(Angle::Vertical))
    }

    pub fn padding_dimens(&self, source: &dyn ValueSource) -> Dimens {
        let axis = |a| self.padding(a, Edge::Inner, source) + self.padding(a, Edge::Outer, source);
        Dimens::new(axis(Angle::Horizontal), axis(Angle::Vertical))
    }

    pub fn inner_padding(&self, source: &dyn ValueSource) -> Coords {
        Coords::new(
            self.padding(Angle::Horizontal, Edge::Inner, source),
            self.padding(Angle::Vertical, Edge::Inner, source),
        )
    }

    fn size_key(&self, angle: Angle) -> AttributeKey {
        self.adjacent_or_opposite(angle, AttributeKey::SizeA, AttributeKey::SizeO)
    }

    /// Explicit size along `angle`, if the element sets one.
    pub fn size(&self, angle: Angle, source: &dyn ValueSource) -> Option<i32> {
        self.int(self.size_key(angle), source)
    }

    /// Applies the item's own size attributes to a parent's proposal. A
    /// constant size locks the axis, a computed one is only proposed.
    pub fn revise_proposal(&self, mut proposal: GeometryProposal, source: &dyn ValueSource) -> GeometryProposal {
        for angle in [Angle::Horizontal, Angle::Vertical] {
            let key = self.size_key(angle);
            let attr = self.attrs.attr(key);
            if !attr.is_active() {
                continue;
            }
            let Some(size) = self.int(key, source) else { continue };
            if attr.is_expr_const() {
                proposal.lock(angle, size);
            } else {
                *proposal.proposed.get_mut(angle) = size;
            }
        }
        proposal
    }

    pub fn justification_offset(&self, item_size: i32, cell_size: i32) -> i32 {
        match self.property(AttributeKey::Justify) {
            None | Some(Property::Inner) => 0,
            Some(Property::Center) => cell_size / 2 - item_size / 2,
            Some(_) => cell_size - item_size,
        }
    }

    /// Offset of a drawing area inside its cell. Alignment only applies when
    /// the item is smaller than the cell.
    pub fn cell_alignment_offset(
        &self,
        angle: Angle,
        item_size: i32,
        cell_size: i32,
        reserved_inner: i32,
        reserved_outer: i32,
    ) -> i32 {
        let key = self.adjacent_or_opposite(angle, AttributeKey::AlignAdjacent, AttributeKey::AlignOpposite);
        let alignment = self
            .property(key)
            .and_then(Alignment::from_property)
            .filter(|_| item_size < cell_size)
            .unwrap_or(defaults::ALIGNMENT);
        match alignment {
            Alignment::Inner => reserved_inner,
            Alignment::Center => cell_size / 2 - item_size / 2,
            Alignment::Outer => cell_size - item_size - reserved_outer,
        }
    }

    pub fn translation_offset(&self, source: &dyn ValueSource) -> Coords {
        let mut trans = Coords::default();
        let adjacent = self.relative_adjacent();
        if let Some(a) = self.int(AttributeKey::TranslationA, source) {
            *trans.get_mut(adjacent) = a;
        }
        if let Some(o) = self.int(AttributeKey::TranslationO, source) {
            *trans.get_mut(adjacent.flip()) = o;
        }
        trans
    }

    pub fn fill_precedence_override(&self, angle: Angle) -> Option<FillPrecedence> {
        let key = self.adjacent_or_opposite(
            angle,
            AttributeKey::OverrideFillPrecedenceAdjacent,
            AttributeKey::OverrideFillPrecedenceOpposite,
        );
        match self.property(key)? {
            Property::Greedy => Some(FillPrecedence::Greedy),
            Property::Shrinky => Some(FillPrecedence::Shrinky),
            other => {
                warn!("{}: {other} is not a fill precedence", self.describe());
                None
            }
        }
    }

    /// A string attribute: its literal, else the value behind its key.
    fn string_attr(&self, key: AttributeKey, source: &dyn ValueSource, fallback: &str) -> String {
        let attr = self.attrs.attr(key);
        if let Some(literal) = attr.user_token() {
            return literal.to_string();
        }
        match attr.single_key() {
            Some(value_key) => source.get_string(self.id, value_key),
            None => fallback.to_string(),
        }
    }

    pub fn text(&self, source: &dyn ValueSource) -> String {
        self.string_attr(AttributeKey::Text, source, "")
    }

    pub fn title_text(&self, source: &dyn ValueSource) -> String {
        self.string_attr(AttributeKey::TitleText, source, defaults::TITLE_TEXT)
    }

    pub fn image_path(&self) -> Option<&str> {
        self.attrs.attr(AttributeKey::ImagePath).user_token()
    }

    pub fn font(&self) -> Property {
        self.property(AttributeKey::Font).unwrap_or(defaults::FONT_FACE)
    }

    pub fn font_size(&self, source: &dyn ValueSource) -> f64 {
        self.number(AttributeKey::FontSize, source).unwrap_or(defaults::FONT_SIZE)
    }

    pub fn font_color(&self) -> Color {
        self.attrs.attr(AttributeKey::FontColor).color().unwrap_or(defaults::FONT_COLOR)
    }

    /// No color is different from a transparent one: unset means unpainted.
    pub fn element_color(&self) -> Option<Color> {
        self.attrs.attr(AttributeKey::ElementColor).color()
    }

    pub fn border_color(&self) -> Option<Color> {
        self.attrs.attr(AttributeKey::BorderColor).color()
    }

    pub fn alpha(&self) -> u8 {
        defaults::ALPHA
    }

    pub fn is_visible(&self) -> bool {
        self.property(AttributeKey::Visibility).map_or(defaults::VISIBLE, |p| p == Property::Enable)
    }

    pub fn is_borderless(&self) -> bool {
        self.property(AttributeKey::Borderless) == Some(Property::Enable)
    }

    pub fn window_size_strategy(&self) -> Property {
        self.property(AttributeKey::WindowSizeStrategy).unwrap_or(defaults::WINDOW_SIZE_STRATEGY)
    }

    /// Explicit sizes pin a window. Otherwise the property decides, and
    /// bottom-up windows follow their content.
    pub fn is_resizable(&self, source: &dyn ValueSource) -> bool {
        if self.size(Angle::Horizontal, source).is_some() || self.size(Angle::Vertical, source).is_some() {
            return false;
        }
        match self.property(AttributeKey::Resizable) {
            Some(flag) => flag == Property::Enable,
            None => self.window_size_strategy() != Property::BottomUp,
        }
    }

    pub fn model_order(&self) -> bool {
        self.property(AttributeKey::ModelOrder).map_or(defaults::MODEL_ORDER, |p| p == Property::Enable)
    }

    /// Path of the item this one is placed within.
    pub fn position_within(&self) -> Option<ValueKeyPath> {
        let key = self.attrs.attr(AttributeKey::PositionWithin).single_key()?;
        match (&key.path, &key.key) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(k)) => Some(vec![k.clone()]),
            (None, None) => None,
        }
    }

    /// Named cell of the parent this item sits in.
    pub fn cell_name(&self) -> Option<&str> {
        self.attrs.attr(AttributeKey::PositionWithin).single_key()?.key.as_deref()
    }

    pub fn cell_names(&self) -> Option<&[String]> {
        let attr = self.attrs.attr(AttributeKey::CellNames);
        attr.is_active().then(|| attr.literal_list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::tests::MapSource;
    use crate::expression::{Expression, ExpressionNode};
    use crate::reference::ReferenceAttribute;
    use crate::value_key::ScopedValueKey;

    struct Quiet;

    impl AttributeSignals for Quiet {
        fn signal_change(&mut self, _: ItemId, _: AttributeKey) {}
        fn request_tick(&mut self, _: ItemId, _: AttributeKey) {}
        fn cancel_tick(&mut self, _: ItemId, _: AttributeKey) {}
    }

    fn scalar(value: f64) -> ReferenceAttribute {
        ReferenceAttribute { active: true, expr: Some(Rc::new(Expression::constant(value))), ..Default::default() }
    }

    fn property(p: Property) -> ReferenceAttribute {
        ReferenceAttribute { active: true, property: Some(p), ..Default::default() }
    }

    fn item_with(attrs: &[(AttributeKey, ReferenceAttribute)]) -> DisplayItem {
        let mut element = Element::new(0, vec!["Box".into()]);
        for (key, attr) in attrs {
            element.default_set_mut().insert(*key, attr.clone());
        }
        let mut item = DisplayItem::new(ItemId::from_raw(1), &element, None);
        item.recompute_attribute_set(&mut Quiet);
        item
    }

    #[test]
    fn test_constant_size_locks_axis() {
        let item = item_with(&[(AttributeKey::SizeA, scalar(40.0))]);
        let source = MapSource::default();
        let revised = item.revise_proposal(GeometryProposal::unconstrained(Dimens::new(100, 100)), &source);
        assert_eq!(revised.proposed, Dimens::new(40, 100));
        assert!(!revised.expand(Angle::Horizontal));
        assert!(revised.expand(Angle::Vertical));
    }

    #[test]
    fn test_weak_size_is_only_proposed() {
        let weak = ReferenceAttribute {
            active: true,
            expr: Some(Rc::new(Expression::new(ExpressionNode::weak_key(ScopedValueKey::element("w"))))),
            ..Default::default()
        };
        let item = item_with(&[(AttributeKey::SizeA, weak)]);
        let mut source = MapSource::default();
        source.values.insert("this.w".into(), 25.0);
        let revised = item.revise_proposal(GeometryProposal::unconstrained(Dimens::new(100, 100)), &source);
        assert_eq!(revised.proposed.w, 25);
        assert!(revised.expand(Angle::Horizontal));
    }

    #[test]
    fn test_orientation_swaps_relative_axes() {
        let item = item_with(&[
            (AttributeKey::Orientation, property(Property::AdjacentIsVertical)),
            (AttributeKey::MarginAdjIn, scalar(3.0)),
            (AttributeKey::PaddingOppOut, scalar(2.0)),
            (AttributeKey::TranslationA, scalar(7.0)),
        ]);
        let source = MapSource::default();
        assert_eq!(item.relative_adjacent(), Angle::Vertical);
        assert_eq!(item.reserved(Angle::Vertical, Edge::Inner, &source), 3);
        assert_eq!(item.reserved_dimens(&source), Dimens::new(2, 3));
        assert_eq!(item.translation_offset(&source), Coords::new(0, 7));
    }

    #[test]
    fn test_alignment_only_when_smaller_than_cell() {
        let item = item_with(&[(AttributeKey::AlignAdjacent, property(Property::Outer))]);
        assert_eq!(item.cell_alignment_offset(Angle::Horizontal, 20, 100, 1, 4), 76);
        assert_eq!(item.cell_alignment_offset(Angle::Horizontal, 100, 100, 1, 4), 1);
        let centered = item_with(&[(AttributeKey::Justify, property(Property::Center))]);
        assert_eq!(centered.justification_offset(20, 100), 40);
    }

    #[test]
    fn test_resizable_filter() {
        let source = MapSource::default();
        assert!(item_with(&[]).is_resizable(&source));
        assert!(!item_with(&[(AttributeKey::SizeO, scalar(10.0))]).is_resizable(&source));
        let bottom_up = item_with(&[(AttributeKey::WindowSizeStrategy, property(Property::BottomUp))]);
        assert!(!bottom_up.is_resizable(&source));
    }

    #[test]
    fn test_position_within_prefers_path() {
        let key = ScopedValueKey::element("header").with_path(vec!["Window".into()]);
        let item = item_with(&[(
            AttributeKey::PositionWithin,
            ReferenceAttribute { active: true, single_key: Some(key), ..Default::default() },
        )]);
        assert_eq!(item.position_within(), Some(vec!["Window".to_string()]));
        assert_eq!(item.cell_name(), Some("header"));
    }
}
