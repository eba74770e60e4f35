//! Text runs and the paragraph material built from them.

use crate::canvas::{Canvas, TextStyle};
use crate::defaults;
use crate::display_item::{DisplayItem, ItemId};
use crate::expression::ValueSource;
use crate::geometry::{Coords, Dimens, GeometryProposal, Rect, zero_guard};
use crate::text::{TextMeasure, extract_excess};

use super::{Frame, LayoutCx, LayoutTree, draw_basic, hit_single};

/// One line of text drawn with the style of `style`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub style: ItemId,
    pub text: String,
    frame: Frame,
}

impl TextRun {
    pub fn new(style: ItemId, text: impl Into<String>) -> Self {
        Self { style, text: text.into(), frame: Frame::default() }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

pub(super) fn text_style(item: &DisplayItem, source: &dyn ValueSource) -> TextStyle {
    TextStyle { font: item.font(), size: item.font_size(source), color: item.font_color(), alpha: item.alpha() }
}

/// Splits `text` into what fits `space` along the item flow, after the
/// style item's own margins and padding, and the overflow.
pub(super) fn split_for_space<'t>(
    measure: &dyn TextMeasure,
    item: &DisplayItem,
    source: &dyn ValueSource,
    text: &'t str,
    space: i32,
) -> (&'t str, &'t str) {
    let revised = zero_guard(space - item.reserved_dimens(source).get(defaults::ITEM_FLOW));
    extract_excess(measure, &text_style(item, source), text, revised)
}

/// Text sets its own size; the proposal only rounds the viewport.
pub(super) fn shape_run(
    measure: &dyn TextMeasure,
    item: &DisplayItem,
    source: &dyn ValueSource,
    run: &mut TextRun,
    proposal: GeometryProposal,
) -> Dimens {
    let drawing = measure.run_dimensions(&run.text, &text_style(item, source));
    run.frame.drawing.d = drawing;
    run.frame.viewport.d = proposal.round_conflicts(drawing + item.reserved_dimens(source));
    run.frame.viewport.d
}

pub(super) fn offset_run(item: &DisplayItem, source: &dyn ValueSource, run: &mut TextRun, offset: Coords) {
    run.frame.set_viewport_offset(item, source, offset);
    run.frame.update_drawing_offset(item, source);
}

pub(super) fn draw_runs(canvas: &mut dyn Canvas, tree: &dyn LayoutTree, runs: &[TextRun]) {
    let source = tree.values();
    for run in runs {
        let Some(item) = tree.item(run.style) else { continue };
        canvas.push_clip(run.frame.viewport);
        draw_basic(canvas, item, source, &run.frame);
        canvas.draw_text(run.frame.drawing_offset(), &run.text, &text_style(item, source));
        canvas.pop_clip();
    }
}

pub(super) fn hit_runs(
    tree: &dyn LayoutTree,
    runs: &[TextRun],
    target: &Rect,
    fun: &mut dyn FnMut(ItemId) -> bool,
) -> bool {
    let source = tree.values();
    runs.iter().any(|run| tree.item(run.style).is_some_and(|item| hit_single(item, source, &run.frame, target, fun)))
}

/// Paragraphs leave margins to their runs: the drawing area is the union of
/// the run viewports.
pub(super) fn shape_paragraph(cx: &mut LayoutCx<'_>, item: &DisplayItem, proposal: GeometryProposal) -> Dimens {
    let source = cx.tree.values();
    let revised = item.revise_proposal(proposal, source);
    let text = item.text(source);
    let item_flow = defaults::ITEM_FLOW;
    let row_flow = defaults::ROW_FLOW;

    let mut runs = Vec::new();
    let drawing = if text.is_empty() {
        revised.proposed
    } else if !revised.expand(item_flow) {
        let mut used = Dimens::default();
        let mut remaining = text.as_str();
        while !remaining.is_empty() {
            let space = revised.proposed.get(item_flow);
            let (fits, rest) = split_for_space(cx.measure, item, source, remaining, space);
            if fits.is_empty() {
                break;
            }
            let mut run = TextRun::new(item.id(), fits);
            let d = shape_run(cx.measure, item, source, &mut run, GeometryProposal::expanding());
            *used.get_mut(row_flow) += d.get(row_flow);
            let along = used.get_mut(item_flow);
            *along = (*along).max(d.get(item_flow));
            runs.push(run);
            remaining = rest;
        }
        used
    } else {
        let mut run = TextRun::new(item.id(), text.as_str());
        let d = shape_run(cx.measure, item, source, &mut run, revised);
        runs.push(run);
        d
    };

    let material = cx.material_mut(item.id());
    material.runs = runs;
    material.rows.clear();
    material.frame.drawing.d = drawing;
    material.frame.viewport.d = proposal.round_conflicts(drawing);
    material.frame.viewport.d
}

pub(super) fn offset_paragraph(cx: &mut LayoutCx<'_>, item: &DisplayItem, offset: Coords) {
    let source = cx.tree.values();
    let item_flow = defaults::ITEM_FLOW;
    let row_flow = defaults::ROW_FLOW;

    let material = cx.material_mut(item.id());
    material.frame.set_viewport_offset(item, source, offset);
    material.frame.align_drawing_offset(item);
    let origin = material.frame.drawing_offset();
    let available = material.frame.viewport.d.get(item_flow);

    let mut at = origin;
    for run in &mut material.runs {
        let run_extent = run.frame.viewport.d.get(item_flow);
        *at.get_mut(item_flow) += item.justification_offset(run_extent, available);
        offset_run(item, source, run, at);
        *at.get_mut(row_flow) += run.frame.viewport.d.get(row_flow);
        *at.get_mut(item_flow) = origin.get(item_flow);
    }
}
