//! Fallback values for attributes an element leaves unset.

use crate::color::Color;
use crate::geometry::{Alignment, Angle};
use crate::keywords::Property;

pub const FONT_FACE: Property = Property::FontSans;
pub const FONT_SIZE: f64 = 12.0;
pub const FONT_COLOR: Color = Color::BLACK;
pub const ALPHA: u8 = 255;
pub const TITLE_TEXT: &str = "IVD Window";
pub const VISIBLE: bool = true;
pub const MODEL_ORDER: bool = true;
pub const ANGLE: Angle = Angle::Horizontal;
pub const ALIGNMENT: Alignment = Alignment::Inner;
pub const WINDOW_SIZE_STRATEGY: Property = Property::TopDown;

/// Position path that places an item at the top of the draw tree.
pub const ENVIRONMENT_PATH: &str = "Environment";

/// Inline flow lays items out left to right in rows stacked downwards.
pub const ITEM_FLOW: Angle = Angle::Horizontal;
pub const ROW_FLOW: Angle = Angle::Vertical;
