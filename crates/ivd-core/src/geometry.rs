//! Integer box geometry used by the layout pass.
//!
//! Every layout routine is written against an abstract pair of axes: the
//! *adjacent* axis (the direction children are laid out along) and the
//! *opposite* axis. `Angle` names a physical axis; layout code flips between
//! them with [`Angle::flip`] instead of hardcoding width/height.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use crate::keywords::Property;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Angle {
    Horizontal,
    Vertical,
}

impl Angle {
    pub fn flip(self) -> Angle {
        match self {
            Angle::Horizontal => Angle::Vertical,
            Angle::Vertical => Angle::Horizontal,
        }
    }

    pub fn pick<T>(self, horizontal: T, vertical: T) -> T {
        match self {
            Angle::Horizontal => horizontal,
            Angle::Vertical => vertical,
        }
    }
}

/// Placement of a child inside the cell it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Inner,
    Center,
    Outer,
}

impl Alignment {
    pub fn from_property(property: Property) -> Option<Self> {
        match property {
            Property::Inner => Some(Alignment::Inner),
            Property::Center => Some(Alignment::Center),
            Property::Outer => Some(Alignment::Outer),
            _ => None,
        }
    }
}

/// Greedy materials never take less than they are offered; shrinky ones take
/// less whenever the proposal allows it. Both still ask for more when the
/// offer is too small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPrecedence {
    Greedy,
    Shrinky,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Coords {
    pub x: i32,
    pub y: i32,
}

impl Coords {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn get(&self, angle: Angle) -> i32 {
        angle.pick(self.x, self.y)
    }

    pub fn get_mut(&mut self, angle: Angle) -> &mut i32 {
        match angle {
            Angle::Horizontal => &mut self.x,
            Angle::Vertical => &mut self.y,
        }
    }
}

impl From<Dimens> for Coords {
    fn from(d: Dimens) -> Self {
        Coords::new(d.w, d.h)
    }
}

impl Add for Coords {
    type Output = Coords;
    fn add(self, rhs: Coords) -> Coords {
        Coords::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Add<Dimens> for Coords {
    type Output = Coords;
    fn add(self, rhs: Dimens) -> Coords {
        Coords::new(self.x + rhs.w, self.y + rhs.h)
    }
}

impl AddAssign for Coords {
    fn add_assign(&mut self, rhs: Coords) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Coords {
    type Output = Coords;
    fn sub(self, rhs: Coords) -> Coords {
        Coords::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Coords {
    fn sub_assign(&mut self, rhs: Coords) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x {}, y {}", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Dimens {
    pub w: i32,
    pub h: i32,
}

impl Dimens {
    pub const fn new(w: i32, h: i32) -> Self {
        Self { w, h }
    }

    pub fn get(&self, angle: Angle) -> i32 {
        angle.pick(self.w, self.h)
    }

    pub fn get_mut(&mut self, angle: Angle) -> &mut i32 {
        match angle {
            Angle::Horizontal => &mut self.w,
            Angle::Vertical => &mut self.h,
        }
    }

    /// Builds a size from adjacent/opposite extents along `adjacent`.
    pub fn from_axes(adjacent: Angle, along: i32, across: i32) -> Self {
        let mut d = Dimens::default();
        *d.get_mut(adjacent) = along;
        *d.get_mut(adjacent.flip()) = across;
        d
    }

    pub fn zero_guarded(self) -> Self {
        Dimens::new(zero_guard(self.w), zero_guard(self.h))
    }
}

impl From<Coords> for Dimens {
    fn from(c: Coords) -> Self {
        Dimens::new(c.x, c.y)
    }
}

impl Add for Dimens {
    type Output = Dimens;
    fn add(self, rhs: Dimens) -> Dimens {
        Dimens::new(self.w + rhs.w, self.h + rhs.h)
    }
}

impl AddAssign for Dimens {
    fn add_assign(&mut self, rhs: Dimens) {
        self.w += rhs.w;
        self.h += rhs.h;
    }
}

impl Sub for Dimens {
    type Output = Dimens;
    fn sub(self, rhs: Dimens) -> Dimens {
        Dimens::new(self.w - rhs.w, self.h - rhs.h)
    }
}

impl SubAssign for Dimens {
    fn sub_assign(&mut self, rhs: Dimens) {
        self.w -= rhs.w;
        self.h -= rhs.h;
    }
}

impl fmt::Display for Dimens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w {}, h {}", self.w, self.h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub c: Coords,
    pub d: Dimens,
}

impl Rect {
    pub const fn new(c: Coords, d: Dimens) -> Self {
        Self { c, d }
    }

    pub fn contains(&self, point: Coords) -> bool {
        point.x >= self.c.x
            && point.x < self.c.x + self.d.w
            && point.y >= self.c.y
            && point.y < self.c.y + self.d.h
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.c.x < other.c.x + other.d.w
            && self.c.y < other.c.y + other.d.h
            && other.c.x < self.c.x + self.d.w
            && other.c.y < self.c.y + self.d.h
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.d, self.c)
    }
}

pub fn zero_guard(i: i32) -> i32 {
    i.max(0)
}

/// A proposed size plus per-axis permission to exceed or undercut it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryProposal {
    pub proposed: Dimens,
    expand_horizontal: bool,
    expand_vertical: bool,
    shrink_horizontal: bool,
    shrink_vertical: bool,
}

impl GeometryProposal {
    pub fn new(proposed: Dimens) -> Self {
        Self { proposed, ..Self::default() }
    }

    /// Empty proposal a material may grow out of on both axes, used to ask
    /// for a natural size.
    pub fn expanding() -> Self {
        let mut p = Self::default();
        p.set_expand(Angle::Horizontal, true);
        p.set_expand(Angle::Vertical, true);
        p
    }

    /// Proposal that lets the material pick any size on both axes.
    pub fn unconstrained(proposed: Dimens) -> Self {
        let mut p = Self::new(proposed);
        for angle in [Angle::Horizontal, Angle::Vertical] {
            p.set_expand(angle, true);
            p.set_shrink(angle, true);
        }
        p
    }

    pub fn expand(&self, angle: Angle) -> bool {
        angle.pick(self.expand_horizontal, self.expand_vertical)
    }

    pub fn shrink(&self, angle: Angle) -> bool {
        angle.pick(self.shrink_horizontal, self.shrink_vertical)
    }

    pub fn set_expand(&mut self, angle: Angle, allowed: bool) {
        match angle {
            Angle::Horizontal => self.expand_horizontal = allowed,
            Angle::Vertical => self.expand_vertical = allowed,
        }
    }

    pub fn set_shrink(&mut self, angle: Angle, allowed: bool) {
        match angle {
            Angle::Horizontal => self.shrink_horizontal = allowed,
            Angle::Vertical => self.shrink_vertical = allowed,
        }
    }

    /// Pins `angle` to `extent` with neither expansion nor shrinking.
    pub fn lock(&mut self, angle: Angle, extent: i32) {
        *self.proposed.get_mut(angle) = extent;
        self.set_expand(angle, false);
        self.set_shrink(angle, false);
    }

    pub fn verify_compliance(&self, region: Dimens) -> bool {
        [Angle::Horizontal, Angle::Vertical].into_iter().all(|angle| {
            let used = region.get(angle);
            let proposed = self.proposed.get(angle);
            !(!self.expand(angle) && used > proposed || !self.shrink(angle) && used < proposed)
        })
    }

    /// Snaps any axis that violates the proposal back to the proposed extent.
    pub fn round_conflicts(&self, mut used: Dimens) -> Dimens {
        for angle in [Angle::Horizontal, Angle::Vertical] {
            let proposed = self.proposed.get(angle);
            let value = used.get(angle);
            if (!self.expand(angle) && value > proposed) || (!self.shrink(angle) && value < proposed) {
                *used.get_mut(angle) = proposed;
            }
        }
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_conflicts_respects_permissions() {
        let mut p = GeometryProposal::new(Dimens::new(100, 50));
        p.set_expand(Angle::Horizontal, true);
        assert_eq!(p.round_conflicts(Dimens::new(140, 80)), Dimens::new(140, 50));
        assert_eq!(p.round_conflicts(Dimens::new(20, 10)), Dimens::new(100, 50));
        p.set_shrink(Angle::Vertical, true);
        assert_eq!(p.round_conflicts(Dimens::new(20, 10)), Dimens::new(100, 10));
    }

    #[test]
    fn test_verify_compliance() {
        let p = GeometryProposal::new(Dimens::new(10, 10));
        assert!(p.verify_compliance(Dimens::new(10, 10)));
        assert!(!p.verify_compliance(Dimens::new(11, 10)));
        assert!(GeometryProposal::unconstrained(Dimens::new(10, 10)).verify_compliance(Dimens::new(3, 99)));
    }

    #[test]
    fn test_rect_collision_is_half_open() {
        let r = Rect::new(Coords::new(0, 0), Dimens::new(10, 10));
        assert!(r.contains(Coords::new(9, 9)));
        assert!(!r.contains(Coords::new(10, 0)));
        assert!(r.intersects(&Rect::new(Coords::new(9, 9), Dimens::new(1, 1))));
        assert!(!r.intersects(&Rect::new(Coords::new(10, 0), Dimens::new(1, 1))));
    }
}
