//! Attribute keys, property values and their textual literals.

use std::fmt;

macro_rules! literal_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident),* $(,)? }
    ) => {
        $(#[$meta])*
        pub enum $name { $($variant),* }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];
            pub const COUNT: usize = [$($name::$variant),*].len();

            pub fn index(self) -> usize {
                self as usize
            }
        }
    };
}

literal_enum! {
    /// Every natural attribute a display item carries. The declaration order
    /// groups the body kinds so that range checks stay cheap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum AttributeKey {
        PositionWithin,
        TitleText,
        Text,
        Font,
        ImagePath,
        FontSize,
        TranslationO,
        TranslationA,
        MarginOppOut,
        MarginOppIn,
        MarginAdjIn,
        MarginAdjOut,
        PaddingOppOut,
        PaddingOppIn,
        PaddingAdjIn,
        PaddingAdjOut,
        SizeO,
        SizeA,
        Orientation,
        WindowState,
        Visibility,
        AlignAdjacent,
        AlignOpposite,
        OverrideFillPrecedenceAdjacent,
        OverrideFillPrecedenceOpposite,
        Justify,
        WindowSizeStrategy,
        ImageSizeProperty,
        Borderless,
        Resizable,
        ModelOrder,
        ElementColor,
        FontColor,
        BorderColor,
        Triggers,
        InduceState,
        BindState,
        ToggleState,
        UnsetState,
        TriggerState,
        RadioState,
        Layout,
        CellNames,
    }
}

literal_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum Property {
        Vbox,
        Hbox,
        Inline,
        FreeLayout,
        StackLayout,
        Standard,
        ImageMaterial,
        AdjacentIsHorizontal,
        AdjacentIsVertical,
        Greedy,
        Shrinky,
        Maximized,
        Minimized,
        Fullscreen,
        FullscreenTrue,
        TopDown,
        BottomUp,
        Inner,
        Center,
        Outer,
        FontSans,
        FontSansBold,
        FontSansItalic,
        FontSansBoldItalic,
        FontSerif,
        FontSerifBold,
        FontSerifItalic,
        FontSerifBoldItalic,
        FontMono,
        FontMonoBold,
        FontMonoItalic,
        FontMonoBoldItalic,
        OneToUnit,
        Native,
        Stretch,
        BestFit,
        Enable,
        Disable,
    }
}

use AttributeKey as A;

/// Literal spellings, first entry per key is the canonical one.
const ATTRIBUTE_LITERALS: &[(&str, AttributeKey)] = &[
    ("position-within", A::PositionWithin),
    ("title-text", A::TitleText),
    ("text", A::Text),
    ("font", A::Font),
    ("image-path", A::ImagePath),
    ("font-size", A::FontSize),
    ("trans-o", A::TranslationO),
    ("trans-a", A::TranslationA),
    ("trans-y", A::TranslationO),
    ("trans-x", A::TranslationA),
    ("margin-o-out", A::MarginOppOut),
    ("margin-o-in", A::MarginOppIn),
    ("margin-a-in", A::MarginAdjIn),
    ("margin-a-out", A::MarginAdjOut),
    ("margin-bottom", A::MarginOppOut),
    ("margin-top", A::MarginOppIn),
    ("margin-left", A::MarginAdjIn),
    ("margin-right", A::MarginAdjOut),
    ("padding-o-out", A::PaddingOppOut),
    ("padding-o-in", A::PaddingOppIn),
    ("padding-a-in", A::PaddingAdjIn),
    ("padding-a-out", A::PaddingAdjOut),
    ("padding-bottom", A::PaddingOppOut),
    ("padding-top", A::PaddingOppIn),
    ("padding-left", A::PaddingAdjIn),
    ("padding-right", A::PaddingAdjOut),
    ("size-o", A::SizeO),
    ("size-a", A::SizeA),
    ("size-y", A::SizeO),
    ("size-x", A::SizeA),
    ("height", A::SizeO),
    ("width", A::SizeA),
    ("orientation", A::Orientation),
    ("window-state", A::WindowState),
    ("visibility", A::Visibility),
    ("align-a", A::AlignAdjacent),
    ("align-o", A::AlignOpposite),
    ("align-x", A::AlignAdjacent),
    ("align-y", A::AlignOpposite),
    ("fill-precedence-adjacent", A::OverrideFillPrecedenceAdjacent),
    ("fill-precedence-opposite", A::OverrideFillPrecedenceOpposite),
    ("fill-precedence-a", A::OverrideFillPrecedenceAdjacent),
    ("fill-precedence-o", A::OverrideFillPrecedenceOpposite),
    ("fill-precedence-x", A::OverrideFillPrecedenceAdjacent),
    ("fill-precedence-y", A::OverrideFillPrecedenceOpposite),
    ("justify", A::Justify),
    ("window-size-strategy", A::WindowSizeStrategy),
    ("image-size", A::ImageSizeProperty),
    ("borderless", A::Borderless),
    ("resizable", A::Resizable),
    ("model-order", A::ModelOrder),
    ("color", A::ElementColor),
    ("font-color", A::FontColor),
    ("border-color", A::BorderColor),
    ("trigger", A::Triggers),
    ("induce-state", A::InduceState),
    ("bind-state", A::BindState),
    ("toggle-state", A::ToggleState),
    ("unset-state", A::UnsetState),
    ("trigger-state", A::TriggerState),
    ("radio-state", A::RadioState),
    ("layout", A::Layout),
    ("cell-names", A::CellNames),
];

const SHORTHANDS: &[(&str, [AttributeKey; 4])] = &[
    ("margin", [A::MarginOppOut, A::MarginOppIn, A::MarginAdjIn, A::MarginAdjOut]),
    ("padding", [A::PaddingOppOut, A::PaddingOppIn, A::PaddingAdjIn, A::PaddingAdjOut]),
];

use Property as P;

const PROPERTY_LITERALS: &[(&str, Property)] = &[
    ("vbox", P::Vbox),
    ("hbox", P::Hbox),
    ("inline", P::Inline),
    ("free-layout", P::FreeLayout),
    ("stack", P::StackLayout),
    ("standard", P::Standard),
    ("image-material", P::ImageMaterial),
    ("adjacent-is-horizontal", P::AdjacentIsHorizontal),
    ("adjacent-is-vertical", P::AdjacentIsVertical),
    ("greedy", P::Greedy),
    ("shrinky", P::Shrinky),
    ("maximize", P::Maximized),
    ("minimize", P::Minimized),
    ("fullscreen", P::Fullscreen),
    ("fullscreen-true", P::FullscreenTrue),
    ("top-down", P::TopDown),
    ("bottom-up", P::BottomUp),
    ("align-inner", P::Inner),
    ("align-center", P::Center),
    ("align-outer", P::Outer),
    ("align-left", P::Inner),
    ("align-right", P::Outer),
    ("align-top", P::Inner),
    ("align-bottom", P::Outer),
    ("sans", P::FontSans),
    ("sans-bold", P::FontSansBold),
    ("sans-italic", P::FontSansItalic),
    ("sans-bold-italic", P::FontSansBoldItalic),
    ("sans-italic-bold", P::FontSansBoldItalic),
    ("serif", P::FontSerif),
    ("serif-bold", P::FontSerifBold),
    ("serif-italic", P::FontSerifItalic),
    ("serif-bold-italic", P::FontSerifBoldItalic),
    ("serif-italic-bold", P::FontSerifBoldItalic),
    ("mono", P::FontMono),
    ("mono-bold", P::FontMonoBold),
    ("mono-italic", P::FontMonoItalic),
    ("mono-bold-italic", P::FontMonoBoldItalic),
    ("mono-italic-bold", P::FontMonoBoldItalic),
    ("one-to-unit", P::OneToUnit),
    ("native", P::Native),
    ("stretch", P::Stretch),
    ("best-fit", P::BestFit),
    ("enable", P::Enable),
    ("disable", P::Disable),
];

const FONTS: &[Property] = &[
    P::FontSans,
    P::FontSansBold,
    P::FontSansItalic,
    P::FontSansBoldItalic,
    P::FontSerif,
    P::FontSerifBold,
    P::FontSerifItalic,
    P::FontSerifBoldItalic,
    P::FontMono,
    P::FontMonoBold,
    P::FontMonoItalic,
    P::FontMonoBoldItalic,
];

impl AttributeKey {
    pub fn from_literal(literal: &str) -> Option<AttributeKey> {
        ATTRIBUTE_LITERALS.iter().find(|(l, _)| *l == literal).map(|(_, k)| *k)
    }

    pub fn literal(self) -> &'static str {
        ATTRIBUTE_LITERALS
            .iter()
            .find(|(_, k)| *k == self)
            .map(|(l, _)| *l)
            .unwrap_or("unknown-attribute")
    }

    /// Compound spellings (`margin`, `padding`) and the keys they fan out to.
    pub fn expand_shorthand(literal: &str) -> Option<&'static [AttributeKey]> {
        SHORTHANDS.iter().find(|(l, _)| *l == literal).map(|(_, keys)| keys.as_slice())
    }

    pub fn is_scalar(self) -> bool {
        (A::FontSize..=A::SizeA).contains(&self)
    }

    pub fn is_property(self) -> bool {
        (A::Orientation..=A::ModelOrder).contains(&self) || matches!(self, A::Font | A::Layout)
    }

    pub fn is_color(self) -> bool {
        (A::ElementColor..=A::BorderColor).contains(&self)
    }

    pub fn is_state_list(self) -> bool {
        (A::Triggers..=A::RadioState).contains(&self)
    }

    /// Keys whose change acceptor mutates states directly.
    pub fn is_state_changer(self) -> bool {
        (A::InduceState..=A::RadioState).contains(&self)
    }

    pub fn takes_string_literal(self) -> bool {
        matches!(self, A::TitleText | A::Text | A::Font | A::ImagePath)
    }

    pub fn takes_single_key(self) -> bool {
        matches!(self, A::TitleText | A::Text)
    }

    pub fn takes_token_list(self) -> bool {
        self == A::CellNames
    }

    pub fn valid_properties(self) -> &'static [Property] {
        match self {
            A::Font => FONTS,
            A::Layout => &[P::Vbox, P::Hbox, P::Inline, P::FreeLayout, P::StackLayout, P::Standard, P::ImageMaterial],
            A::Orientation => &[P::AdjacentIsHorizontal, P::AdjacentIsVertical],
            A::OverrideFillPrecedenceAdjacent | A::OverrideFillPrecedenceOpposite => &[P::Greedy, P::Shrinky],
            A::WindowState => &[P::Maximized, P::Minimized, P::Fullscreen, P::FullscreenTrue],
            A::AlignAdjacent | A::AlignOpposite | A::Justify => &[P::Inner, P::Center, P::Outer],
            A::WindowSizeStrategy => &[P::TopDown, P::BottomUp],
            A::ImageSizeProperty => &[P::OneToUnit, P::Native, P::Stretch, P::BestFit],
            A::Visibility | A::Borderless | A::Resizable | A::ModelOrder => &[P::Enable, P::Disable],
            _ => &[],
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

impl Property {
    pub fn from_literal(literal: &str) -> Option<Property> {
        PROPERTY_LITERALS.iter().find(|(l, _)| *l == literal).map(|(_, p)| *p)
    }

    pub fn literal(self) -> &'static str {
        PROPERTY_LITERALS
            .iter()
            .find(|(_, p)| *p == self)
            .map(|(l, _)| *l)
            .unwrap_or("unknown-property")
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_has_a_literal() {
        for key in AttributeKey::ALL {
            assert_eq!(AttributeKey::from_literal(key.literal()), Some(*key));
        }
        assert_eq!(AttributeKey::COUNT, 43);
    }

    #[test]
    fn test_aliases_resolve_to_same_key() {
        assert_eq!(AttributeKey::from_literal("width"), Some(AttributeKey::SizeA));
        assert_eq!(AttributeKey::from_literal("size-x"), Some(AttributeKey::SizeA));
        assert_eq!(AttributeKey::from_literal("margin-left"), Some(AttributeKey::MarginAdjIn));
        assert_eq!(Property::from_literal("align-right"), Some(Property::Outer));
    }

    #[test]
    fn test_body_kinds() {
        assert!(AttributeKey::SizeO.is_scalar());
        assert!(!AttributeKey::Orientation.is_scalar());
        assert!(AttributeKey::Layout.is_property());
        assert!(AttributeKey::FontColor.is_color());
        assert!(AttributeKey::Triggers.is_state_list());
        assert!(!AttributeKey::Triggers.is_state_changer());
        assert!(AttributeKey::RadioState.is_state_changer());
        assert_eq!(AttributeKey::expand_shorthand("padding").map(|k| k.len()), Some(4));
    }
}
