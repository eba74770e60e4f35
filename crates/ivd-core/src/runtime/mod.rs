//! Live attribute values of display items.

mod animatable;
mod attribute;
mod set;

pub use animatable::AnimatableAttribute;
pub use attribute::RuntimeAttribute;
pub use set::RuntimeAttributeSet;

use crate::display_item::ItemId;
use crate::keywords::AttributeKey;

/// Notifications an attribute raises during commit and animation.
pub trait AttributeSignals {
    fn signal_change(&mut self, item: ItemId, key: AttributeKey);
    fn request_tick(&mut self, item: ItemId, key: AttributeKey);
    fn cancel_tick(&mut self, item: ItemId, key: AttributeKey);
}
