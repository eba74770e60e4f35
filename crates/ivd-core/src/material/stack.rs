use crate::display_item::ItemId;
use crate::geometry::{Angle, Dimens, GeometryProposal};

use super::{LayoutCx, shape as shape_item};

/// Shapes every child against the same proposal, then pins them all to the
/// largest extent per axis.
pub(super) fn shape(cx: &mut LayoutCx<'_>, id: ItemId, proposal: GeometryProposal) -> Dimens {
    let children = cx.tree.ordered_children(id);
    let sizes: Vec<Dimens> = children.iter().map(|&child| shape_item(cx, child, proposal)).collect();

    let mut maxed = Dimens::default();
    for angle in [Angle::Horizontal, Angle::Vertical] {
        *maxed.get_mut(angle) =
            sizes.iter().map(|d| d.get(angle)).max().unwrap_or_else(|| proposal.proposed.get(angle));
    }

    let pinned = GeometryProposal::new(maxed);
    for &child in &children {
        shape_item(cx, child, pinned);
    }
    maxed
}

#[cfg(test)]
mod tests {
    use crate::display_item::ItemId;
    use crate::geometry::{Coords, Dimens, GeometryProposal, Rect};
    use crate::keywords::{AttributeKey, Property};
    use crate::material::tests::{TestTree, property, scalar};

    fn stack_with_two(tree: &mut TestTree) -> (ItemId, [ItemId; 2]) {
        let root = tree.add(None, &[(AttributeKey::Layout, property(Property::StackLayout))]);
        let wide = tree.add(Some(root), &[(AttributeKey::SizeA, scalar(40.0)), (AttributeKey::SizeO, scalar(10.0))]);
        let tall = tree.add(Some(root), &[(AttributeKey::SizeA, scalar(20.0)), (AttributeKey::SizeO, scalar(30.0))]);
        (root, [wide, tall])
    }

    #[test]
    fn test_children_share_the_largest_extent() {
        let mut tree = TestTree::default();
        let (root, [wide, tall]) = stack_with_two(&mut tree);
        let size = tree.layout(root, GeometryProposal::unconstrained(Dimens::new(100, 100)));
        assert_eq!(size, Dimens::new(40, 30));
        assert_eq!(tree.viewport(wide), Rect::new(Coords::new(0, 0), Dimens::new(40, 30)));
        assert_eq!(tree.viewport(tall), Rect::new(Coords::new(0, 0), Dimens::new(40, 30)));
        // Explicit sizes still bound the drawing areas inside the shared cell.
        assert_eq!(tree.materials[&wide].frame().drawing_area().d, Dimens::new(40, 10));
        assert_eq!(tree.materials[&tall].frame().drawing_area().d, Dimens::new(20, 30));
    }

    #[test]
    fn test_hit_prefers_topmost_child() {
        let mut tree = TestTree::default();
        let (root, [wide, tall]) = stack_with_two(&mut tree);
        tree.layout(root, GeometryProposal::unconstrained(Dimens::new(100, 100)));
        let mut first = None;
        let target = Rect::new(Coords::new(5, 5), Dimens::new(1, 1));
        crate::material::apply_to_colliding(&tree, &tree.materials, root, &target, &mut |id| {
            first = Some(id);
            true
        });
        assert_eq!(first, Some(tall));
        assert!(tree.hits(root, Coords::new(30, 5)).contains(&wide));
    }
}
