//! Inline flow: child items and the text of child items wrapped into rows.

use crate::defaults;
use crate::display_item::DisplayItem;
use crate::geometry::{Dimens, GeometryProposal, zero_guard};

use super::line::{ItemCells, line};
use super::text::{TextRun, offset_run, shape_run, split_for_space};
use super::{Frame, InlineCell, InlineRow, LayoutCx, set_absolute_offset, shape as shape_item};

struct RowBuilder {
    rows: Vec<InlineRow>,
    current: InlineRow,
    used: Dimens,
}

impl RowBuilder {
    fn new() -> Self {
        Self { rows: Vec::new(), current: empty_row(), used: Dimens::default() }
    }

    fn push(&mut self, cell: InlineCell, viewport: Dimens) {
        self.current.adjacent += viewport.get(defaults::ITEM_FLOW);
        self.current.opposite = self.current.opposite.max(viewport.get(defaults::ROW_FLOW));
        self.current.cells.push(cell);
    }

    /// Closes the current row unless it is empty.
    fn next_row(&mut self) {
        if self.current.cells.is_empty() {
            return;
        }
        let row = std::mem::replace(&mut self.current, empty_row());
        *self.used.get_mut(defaults::ROW_FLOW) += row.opposite;
        let along = self.used.get_mut(defaults::ITEM_FLOW);
        *along = (*along).max(row.adjacent);
        self.rows.push(row);
    }
}

fn empty_row() -> InlineRow {
    InlineRow { cells: Vec::new(), adjacent: 0, opposite: 0 }
}

/// Greedy line breaking when the item flow is bounded, a single line
/// otherwise.
pub(super) fn shape(cx: &mut LayoutCx<'_>, item: &DisplayItem, proposal: GeometryProposal) -> Dimens {
    let tree = cx.tree;
    let source = tree.values();
    let item_flow = defaults::ITEM_FLOW;
    let row_flow = defaults::ROW_FLOW;
    let children = tree.ordered_children(item.id());
    let mut runs: Vec<TextRun> = Vec::new();

    let (rows, used) = if !proposal.expand(item_flow) {
        let max_row = proposal.proposed.get(item_flow);
        let mut builder = RowBuilder::new();

        for &child in &children {
            let Some(child_item) = tree.item(child) else { continue };
            let text = child_item.text(source);
            if text.is_empty() {
                let natural = shape_item(cx, child, GeometryProposal::expanding());
                if natural.get(item_flow) > max_row - builder.current.adjacent && builder.current.adjacent != 0 {
                    builder.next_row();
                }
                let mut cell = proposal;
                cell.set_expand(row_flow, true);
                *cell.proposed.get_mut(item_flow) = zero_guard(max_row - builder.current.adjacent);
                let d = shape_item(cx, child, cell);
                builder.push(InlineCell::Item(child), d);
                continue;
            }

            let mut remaining = text.as_str();
            while !remaining.is_empty() {
                let space = max_row - builder.current.adjacent;
                let (mut fits, mut rest) = split_for_space(cx.measure, child_item, source, remaining, space);
                if fits.is_empty() {
                    if builder.current.adjacent == 0 {
                        break;
                    }
                    builder.next_row();
                    (fits, rest) = split_for_space(cx.measure, child_item, source, remaining, max_row);
                    if fits.is_empty() {
                        break;
                    }
                }
                let mut run = TextRun::new(child, fits);
                let d = shape_run(cx.measure, child_item, source, &mut run, GeometryProposal::expanding());
                runs.push(run);
                builder.push(InlineCell::Run(runs.len() - 1), d);
                remaining = rest;
            }
        }
        builder.next_row();

        // Level every cell to the height of its row.
        for row in &builder.rows {
            for cell in &row.cells {
                match *cell {
                    InlineCell::Item(child) => {
                        let mut pinned = GeometryProposal::new(cx.viewport_dimens(child));
                        *pinned.proposed.get_mut(row_flow) = row.opposite;
                        shape_item(cx, child, pinned);
                    }
                    InlineCell::Run(index) => {
                        let Some(run) = runs.get_mut(index) else { continue };
                        let Some(style) = tree.item(run.style) else { continue };
                        let mut pinned = GeometryProposal::new(run.frame().viewport.d);
                        *pinned.proposed.get_mut(row_flow) = row.opposite;
                        shape_run(cx.measure, style, source, run, pinned);
                    }
                }
            }
        }
        (builder.rows, builder.used)
    } else {
        let used = line(&mut ItemCells { cx, items: &children }, proposal, item_flow);
        let row = InlineRow {
            cells: children.iter().copied().map(InlineCell::Item).collect(),
            adjacent: used.get(item_flow),
            opposite: used.get(row_flow),
        };
        (vec![row], used)
    };

    let material = cx.material_mut(item.id());
    material.runs = runs;
    material.rows = rows;
    used
}

/// Places rows one after another along the row flow, justifying each.
pub(super) fn set_offset(cx: &mut LayoutCx<'_>, item: &DisplayItem, frame: &Frame) {
    let tree = cx.tree;
    let source = tree.values();
    let item_flow = defaults::ITEM_FLOW;
    let row_flow = defaults::ROW_FLOW;

    let (rows, mut runs) = {
        let material = cx.material_mut(item.id());
        (std::mem::take(&mut material.rows), std::mem::take(&mut material.runs))
    };

    let origin = frame.drawing_offset();
    let available = frame.drawing_area().d.get(item_flow);
    let mut at = origin;
    for row in &rows {
        *at.get_mut(item_flow) += item.justification_offset(row.adjacent, available);
        for cell in &row.cells {
            let extent = match *cell {
                InlineCell::Item(child) => {
                    set_absolute_offset(cx, child, at);
                    cx.viewport_dimens(child).get(item_flow)
                }
                InlineCell::Run(index) => match runs.get_mut(index) {
                    Some(run) => {
                        if let Some(style) = tree.item(run.style) {
                            offset_run(style, source, run, at);
                        }
                        run.frame().viewport.d.get(item_flow)
                    }
                    None => 0,
                },
            };
            *at.get_mut(item_flow) += extent;
        }
        *at.get_mut(row_flow) += row.opposite;
        *at.get_mut(item_flow) = origin.get(item_flow);
    }

    let material = cx.material_mut(item.id());
    material.rows = rows;
    material.runs = runs;
}

#[cfg(test)]
mod tests {
    use crate::canvas::RecordingCanvas;
    use crate::display_item::ItemId;
    use crate::geometry::{Coords, Dimens, GeometryProposal};
    use crate::image_cache::ImageSizeCache;
    use crate::keywords::{AttributeKey, Property};
    use crate::material::tests::{TestTree, fixed, literal, property, scalar};
    use crate::material::{PaintCx, draw};

    fn inline_with(tree: &mut TestTree, texts: &[&str]) -> (ItemId, Vec<ItemId>) {
        let root = tree.add(None, &[(AttributeKey::Layout, property(Property::Inline))]);
        let children = texts
            .iter()
            .map(|t| tree.add(Some(root), &[(AttributeKey::Text, literal(t)), (AttributeKey::FontSize, scalar(10.0))]))
            .collect();
        (root, children)
    }

    fn texts(tree: &TestTree, id: ItemId) -> Vec<(Coords, String)> {
        let mut canvas = RecordingCanvas::new(Dimens::new(200, 200));
        let mut images = ImageSizeCache::new();
        let mut cx = PaintCx { tree, materials: &tree.materials, images: &mut images, canvas: &mut canvas };
        draw(&mut cx, id);
        canvas.texts().map(|(c, t)| (c, t.to_string())).collect()
    }

    #[test]
    fn test_text_wraps_across_children() {
        let mut tree = TestTree::default();
        let (root, children) = inline_with(&mut tree, &["aaaa", "bbbbbb"]);
        tree.layout(root, fixed(48, 100));
        let rows = tree.materials[&root].rows();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].adjacent, rows[0].opposite), (48, 12));
        assert_eq!((rows[1].adjacent, rows[1].opposite), (12, 12));
        assert_eq!(
            texts(&tree, root),
            vec![
                (Coords::new(0, 0), "aaaa".to_string()),
                (Coords::new(24, 0), "bbbb".to_string()),
                (Coords::new(0, 12), "bb".to_string()),
            ]
        );
        // Hits on a run report the child that owns the text.
        assert!(tree.hits(root, Coords::new(3, 14)).contains(&children[1]));
    }

    #[test]
    fn test_unbounded_flow_is_one_line() {
        let mut tree = TestTree::default();
        let (root, _) = inline_with(&mut tree, &["aaaa", "bbbbbb"]);
        let size = tree.layout(root, GeometryProposal::unconstrained(Dimens::new(10, 10)));
        assert_eq!(size, Dimens::new(60, 12));
        assert_eq!(tree.materials[&root].rows().len(), 1);
        assert!(tree.materials[&root].runs().is_empty());
    }

    #[test]
    fn test_word_too_long_for_any_row_is_dropped() {
        let mut tree = TestTree::default();
        let (root, _) = inline_with(&mut tree, &["abc"]);
        tree.layout(root, fixed(4, 20));
        assert!(tree.materials[&root].rows().is_empty());
    }
}
