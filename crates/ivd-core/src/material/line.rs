//! Distribution of one line of cells along an axis.

use crate::display_item::ItemId;
use crate::geometry::{Angle, Dimens, FillPrecedence, GeometryProposal, zero_guard};

use super::{LayoutCx, fill_precedence, shape};

/// The cells of one line, shaped in place.
pub(super) trait LineCells {
    fn count(&self) -> usize;
    fn precedence(&self, cell: usize, angle: Angle) -> FillPrecedence;
    /// Shapes `cell` and returns its new viewport size.
    fn shape(&mut self, cell: usize, proposal: GeometryProposal) -> Dimens;
    fn viewport(&self, cell: usize) -> Dimens;
}

/// Child items of a material as line cells.
pub(super) struct ItemCells<'c, 'a> {
    pub cx: &'c mut LayoutCx<'a>,
    pub items: &'c [ItemId],
}

impl LineCells for ItemCells<'_, '_> {
    fn count(&self) -> usize {
        self.items.len()
    }

    fn precedence(&self, cell: usize, angle: Angle) -> FillPrecedence {
        fill_precedence(self.cx.tree, &*self.cx.materials, self.items[cell], angle)
    }

    fn shape(&mut self, cell: usize, proposal: GeometryProposal) -> Dimens {
        shape(self.cx, self.items[cell], proposal)
    }

    fn viewport(&self, cell: usize) -> Dimens {
        self.cx.viewport_dimens(self.items[cell])
    }
}

struct Line<'l> {
    cells: &'l mut dyn LineCells,
    adjacent: Angle,
    available_opposite: i32,
    used_adjacent: i32,
    used_opposite: i32,
    invalid_opposite: bool,
}

impl Line<'_> {
    fn opposite(&self) -> Angle {
        self.adjacent.flip()
    }

    fn reset(&mut self) {
        self.used_adjacent = 0;
        self.used_opposite = 0;
    }

    fn apply(&mut self, cell: usize, mut proposal: GeometryProposal, adjacent_extent: i32) {
        *proposal.proposed.get_mut(self.adjacent) = adjacent_extent;
        let d = self.cells.shape(cell, proposal);
        debug_assert!(proposal.verify_compliance(d), "cell {cell} ignored its proposal");
        self.used_adjacent += d.get(self.adjacent);
        let opposite = d.get(self.opposite());
        self.used_opposite = self.used_opposite.max(opposite);
        if opposite != self.available_opposite {
            self.invalid_opposite = true;
        }
    }

    /// Re-shapes every cell with the opposite axis pinned to the widest one.
    fn adjust_opposite(&mut self, base: &GeometryProposal) {
        if !self.invalid_opposite {
            return;
        }
        self.used_adjacent = 0;
        let opposite = self.opposite();
        for cell in 0..self.cells.count() {
            let mut proposal = *base;
            proposal.proposed = self.cells.viewport(cell);
            proposal.lock(opposite, self.used_opposite);
            proposal.set_expand(self.adjacent, false);
            proposal.set_shrink(self.adjacent, false);
            let d = self.cells.shape(cell, proposal);
            self.used_adjacent += d.get(self.adjacent);
        }
        self.invalid_opposite = false;
    }
}

/// Shapes every cell into one line along `adjacent` and returns the space
/// the line ends up using.
///
/// Every cell first gets an equal share. A line that overflows a proposal it
/// may not exceed is cut evenly; one that underflows a proposal it may not
/// undercut pads its greedy cells, or its shrinky ones when none is greedy.
pub(super) fn line(cells: &mut dyn LineCells, proposal: GeometryProposal, adjacent: Angle) -> Dimens {
    let count = cells.count();
    let available_adjacent = proposal.proposed.get(adjacent);
    let available_opposite = proposal.proposed.get(adjacent.flip());

    let (greedy, shrinky): (Vec<usize>, Vec<usize>) =
        (0..count).partition(|&cell| cells.precedence(cell, adjacent) == FillPrecedence::Greedy);

    let mut line = Line {
        cells,
        adjacent,
        available_opposite,
        used_adjacent: 0,
        used_opposite: 0,
        invalid_opposite: false,
    };

    if count > 0 {
        let mut initial = proposal;
        initial.set_expand(adjacent, true);
        initial.set_shrink(adjacent, true);
        let share = zero_guard(available_adjacent / count as i32);
        for &cell in shrinky.iter().chain(&greedy) {
            line.apply(cell, initial, share);
        }
        line.adjust_opposite(&proposal);
    }

    if line.used_adjacent > available_adjacent && !proposal.expand(adjacent) && count > 0 {
        // Smallest cells first, each taking its share of what is still to
        // cut rounded up; whatever a cell cannot give up moves on to larger
        // ones.
        let mut order: Vec<(usize, i32)> =
            shrinky.iter().chain(&greedy).map(|&cell| (cell, line.cells.viewport(cell).get(adjacent))).collect();
        order.sort_by_key(|&(_, current)| current);
        let mut excess = line.used_adjacent - available_adjacent;
        line.reset();
        let mut cutting = proposal;
        cutting.set_expand(adjacent, false);
        for (done, &(cell, current)) in order.iter().enumerate() {
            let left = (count - done) as i32;
            let cut = ((excess + left - 1) / left).min(current).max(0);
            excess -= cut;
            line.apply(cell, cutting, zero_guard(current - cut));
        }
        line.adjust_opposite(&proposal);
    }

    if line.used_adjacent < available_adjacent && !proposal.shrink(adjacent) && count > 0 {
        let (padded, rest) = if greedy.is_empty() { (&shrinky, &greedy) } else { (&greedy, &shrinky) };
        let mut slack = available_adjacent - line.used_adjacent;
        line.reset();
        let mut padding = proposal;
        padding.set_shrink(adjacent, false);
        for (done, &cell) in padded.iter().enumerate() {
            let left = (padded.len() - done) as i32;
            let pad = slack / left;
            slack -= pad;
            let extent = line.cells.viewport(cell).get(adjacent) + pad;
            line.apply(cell, padding, extent);
        }
        for &cell in rest {
            let d = line.cells.viewport(cell);
            if d.get(adjacent.flip()) > line.used_opposite {
                line.used_opposite = d.get(adjacent.flip());
                line.invalid_opposite = true;
            }
            line.used_adjacent += d.get(adjacent);
        }
        line.adjust_opposite(&proposal);
    }

    Dimens::from_axes(adjacent, line.used_adjacent, line.used_opposite)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cells with a natural size that honour proposals the way a plain box
    /// with a fixed content size would.
    struct Boxes {
        natural: Vec<Dimens>,
        precedence: Vec<FillPrecedence>,
        viewports: Vec<Dimens>,
    }

    impl Boxes {
        fn new(cells: &[(i32, i32, FillPrecedence)]) -> Self {
            Self {
                natural: cells.iter().map(|&(w, h, _)| Dimens::new(w, h)).collect(),
                precedence: cells.iter().map(|&(_, _, p)| p).collect(),
                viewports: vec![Dimens::default(); cells.len()],
            }
        }
    }

    impl LineCells for Boxes {
        fn count(&self) -> usize {
            self.natural.len()
        }

        fn precedence(&self, cell: usize, _: Angle) -> FillPrecedence {
            self.precedence[cell]
        }

        fn shape(&mut self, cell: usize, proposal: GeometryProposal) -> Dimens {
            let mut d = self.natural[cell];
            for angle in [Angle::Horizontal, Angle::Vertical] {
                if self.precedence[cell] == FillPrecedence::Greedy && !proposal.shrink(angle) {
                    *d.get_mut(angle) = proposal.proposed.get(angle);
                }
            }
            self.viewports[cell] = proposal.round_conflicts(d);
            self.viewports[cell]
        }

        fn viewport(&self, cell: usize) -> Dimens {
            self.viewports[cell]
        }
    }

    use FillPrecedence::{Greedy, Shrinky};

    #[test]
    fn test_fixed_proposal_is_filled_exactly() {
        let mut cells = Boxes::new(&[(10, 5, Shrinky), (20, 5, Greedy), (16, 5, Greedy)]);
        let used = line(&mut cells, GeometryProposal::new(Dimens::new(100, 30)), Angle::Horizontal);
        assert_eq!(used, Dimens::new(100, 30));
        let total: i32 = cells.viewports.iter().map(|d| d.w).sum();
        assert_eq!(total, 100);
        assert!(cells.viewports.iter().all(|d| d.h == 30));
    }

    #[test]
    fn test_overflow_is_cut_evenly() {
        let mut cells = Boxes::new(&[(50, 5, Shrinky), (70, 5, Shrinky)]);
        let mut proposal = GeometryProposal::new(Dimens::new(60, 10));
        proposal.set_shrink(Angle::Horizontal, true);
        let used = line(&mut cells, proposal, Angle::Horizontal);
        assert_eq!(used.w, 60);
        assert_eq!(cells.viewports.iter().map(|d| d.w).sum::<i32>(), 60);
    }

    #[test]
    fn test_cut_line_never_exceeds_a_fixed_proposal() {
        for n in 1..=6usize {
            for available in 0..=40 {
                let natural: Vec<(i32, i32, FillPrecedence)> = (0..n).map(|i| (10 + i as i32 * 3, 5, Shrinky)).collect();
                let mut cells = Boxes::new(&natural);
                let used = line(&mut cells, GeometryProposal::new(Dimens::new(available, 10)), Angle::Horizontal);
                let total: i32 = cells.viewports.iter().map(|d| d.w).sum();
                assert!(total <= available, "n={n} available={available} total={total}");
                assert_eq!(used.w, total);
            }
        }
    }

    #[test]
    fn test_uneven_cut_fills_the_proposal() {
        let mut cells = Boxes::new(&[(10, 5, Shrinky), (10, 5, Shrinky)]);
        let used = line(&mut cells, GeometryProposal::new(Dimens::new(7, 10)), Angle::Horizontal);
        assert_eq!(used.w, 7);
        assert_eq!(cells.viewports[0].w + cells.viewports[1].w, 7);
    }

    #[test]
    fn test_expandable_line_keeps_natural_sizes() {
        let mut cells = Boxes::new(&[(10, 4, Shrinky), (12, 9, Shrinky)]);
        let used = line(&mut cells, GeometryProposal::unconstrained(Dimens::new(5, 0)), Angle::Horizontal);
        assert_eq!(used, Dimens::new(22, 9));
        assert_eq!(cells.viewports, vec![Dimens::new(10, 9), Dimens::new(12, 9)]);
    }

    #[test]
    fn test_vertical_line() {
        let mut cells = Boxes::new(&[(5, 10, Shrinky), (5, 10, Greedy)]);
        let used = line(&mut cells, GeometryProposal::new(Dimens::new(40, 50)), Angle::Vertical);
        assert_eq!(used, Dimens::new(40, 50));
        assert_eq!(cells.viewports[0].h + cells.viewports[1].h, 50);
    }

    #[test]
    fn test_empty_line_uses_nothing() {
        let mut cells = Boxes::new(&[]);
        let used = line(&mut cells, GeometryProposal::new(Dimens::new(40, 50)), Angle::Horizontal);
        assert_eq!(used, Dimens::default());
    }
}
