//! Text measurement and line splitting.

use unicode_segmentation::UnicodeSegmentation;

use crate::canvas::TextStyle;
use crate::geometry::Dimens;

/// Measures runs of text. Splitting never cuts a grapheme cluster.
pub trait TextMeasure {
    fn run_dimensions(&self, text: &str, style: &TextStyle) -> Dimens;

    /// Byte length of the longest prefix of `text` no wider than `space`.
    fn max_prefix_for_space(&self, text: &str, style: &TextStyle, space: i32) -> usize {
        let mut fitted = 0;
        for (start, grapheme) in text.grapheme_indices(true) {
            let end = start + grapheme.len();
            if self.run_dimensions(&text[..end], style).w > space {
                break;
            }
            fitted = end;
        }
        fitted
    }
}

const EPSILON: f64 = 1e-9;

/// Rounds up to whole pixels, ignoring float noise from the ratios.
fn pixels(extent: f64) -> i32 {
    (extent - EPSILON).ceil() as i32
}

/// Fixed-advance measurement: every grapheme is `advance_ratio` of the font
/// size wide and a line is `line_height_ratio` of it tall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceMeasure {
    pub advance_ratio: f64,
    pub line_height_ratio: f64,
}

impl Default for MonospaceMeasure {
    fn default() -> Self {
        Self { advance_ratio: 0.6, line_height_ratio: 1.2 }
    }
}

impl MonospaceMeasure {
    fn advance(&self, style: &TextStyle) -> f64 {
        style.size * self.advance_ratio
    }
}

impl TextMeasure for MonospaceMeasure {
    fn run_dimensions(&self, text: &str, style: &TextStyle) -> Dimens {
        let graphemes = text.graphemes(true).count() as f64;
        let width = pixels(graphemes * self.advance(style));
        let height = pixels(style.size * self.line_height_ratio);
        Dimens::new(width, height)
    }

    fn max_prefix_for_space(&self, text: &str, style: &TextStyle, space: i32) -> usize {
        let advance = self.advance(style);
        if advance <= 0.0 {
            return text.len();
        }
        let fits = ((f64::from(space.max(0)) + EPSILON) / advance).floor() as usize;
        text.grapheme_indices(true).nth(fits).map_or(text.len(), |(idx, _)| idx)
    }
}

/// Splits `text` into what fits in `space` and what overflows.
pub fn extract_excess<'t>(
    measure: &dyn TextMeasure,
    style: &TextStyle,
    text: &'t str,
    space: i32,
) -> (&'t str, &'t str) {
    text.split_at(measure.max_prefix_for_space(text, style, space))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::keywords::Property;

    fn style(size: f64) -> TextStyle {
        TextStyle { font: Property::FontMono, size, color: Color::BLACK, alpha: 255 }
    }

    #[test]
    fn test_monospace_dimensions() {
        let m = MonospaceMeasure::default();
        assert_eq!(m.run_dimensions("hello", &style(10.0)), Dimens::new(30, 12));
        assert_eq!(m.run_dimensions("", &style(10.0)), Dimens::new(0, 12));
    }

    #[test]
    fn test_split_keeps_graphemes_whole() {
        let m = MonospaceMeasure::default();
        let text = "e\u{301}e\u{301}e\u{301}";
        let (fits, rest) = extract_excess(&m, &style(10.0), text, 13);
        assert_eq!(fits, "e\u{301}e\u{301}");
        assert_eq!(rest, "e\u{301}");
    }

    #[test]
    fn test_default_prefix_search_matches_fast_path() {
        struct Slow(MonospaceMeasure);
        impl TextMeasure for Slow {
            fn run_dimensions(&self, text: &str, style: &TextStyle) -> Dimens {
                self.0.run_dimensions(text, style)
            }
        }
        let fast = MonospaceMeasure::default();
        let slow = Slow(fast);
        for space in [0, 5, 6, 17, 100] {
            assert_eq!(
                slow.max_prefix_for_space("wrap me please", &style(10.0), space),
                fast.max_prefix_for_space("wrap me please", &style(10.0), space),
            );
        }
    }
}
