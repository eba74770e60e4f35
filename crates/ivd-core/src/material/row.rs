use crate::display_item::ItemId;
use crate::geometry::{Angle, Coords, Dimens, GeometryProposal};

use super::line::{ItemCells, line};
use super::{Frame, LayoutCx, set_absolute_offset};

pub(super) fn shape(cx: &mut LayoutCx<'_>, id: ItemId, proposal: GeometryProposal, adjacent: Angle) -> Dimens {
    let children = cx.tree.ordered_children(id);
    if children.is_empty() {
        return proposal.proposed;
    }
    line(&mut ItemCells { cx, items: &children }, proposal, adjacent)
}

/// Lays children end to end from the drawing area origin.
pub(super) fn set_offset(cx: &mut LayoutCx<'_>, id: ItemId, frame: &Frame, adjacent: Angle) {
    let origin = frame.drawing_offset();
    let mut along = origin.get(adjacent);
    for child in cx.tree.ordered_children(id) {
        let mut at = Coords::default();
        *at.get_mut(adjacent) = along;
        *at.get_mut(adjacent.flip()) = origin.get(adjacent.flip());
        set_absolute_offset(cx, child, at);
        along += cx.viewport_dimens(child).get(adjacent);
    }
}
