use crate::display_item::ItemId;
use crate::geometry::{Dimens, GeometryProposal};

use super::{LayoutCx, shape as shape_item};

/// Children take their natural size; the free material itself takes what it
/// is offered.
pub(super) fn shape(cx: &mut LayoutCx<'_>, id: ItemId, proposal: GeometryProposal) -> Dimens {
    for child in cx.tree.ordered_children(id) {
        shape_item(cx, child, GeometryProposal::expanding());
    }
    proposal.proposed
}

#[cfg(test)]
mod tests {
    use crate::geometry::{Coords, Dimens, Rect};
    use crate::keywords::{AttributeKey, Property};
    use crate::material::tests::{TestTree, fixed, property, scalar};

    #[test]
    fn test_children_are_placed_by_translation() {
        let mut tree = TestTree::default();
        let root = tree.add(
            None,
            &[(AttributeKey::Layout, property(Property::FreeLayout)), (AttributeKey::PaddingAdjIn, scalar(5.0))],
        );
        let dot = tree.add(
            Some(root),
            &[
                (AttributeKey::SizeA, scalar(4.0)),
                (AttributeKey::SizeO, scalar(4.0)),
                (AttributeKey::TranslationA, scalar(30.0)),
                (AttributeKey::TranslationO, scalar(12.0)),
            ],
        );
        assert_eq!(tree.layout(root, fixed(100, 100)), Dimens::new(100, 100));
        assert_eq!(tree.viewport(dot), Rect::new(Coords::new(35, 12), Dimens::new(4, 4)));
    }
}
