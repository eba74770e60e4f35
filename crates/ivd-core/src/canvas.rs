//! Drawing surface used by materials.

use std::rc::Rc;

use tracing::warn;

use crate::color::Color;
use crate::geometry::{Angle, Coords, Dimens, Rect};
use crate::keywords::Property;

/// Decoded pixels, row-major, `channels` bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

/// Everything needed to render or measure one run of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: Property,
    pub size: f64,
    pub color: Color,
    pub alpha: u8,
}

/// A backend the materials draw into.
///
/// Clips nest: each `push_clip` must be matched by a `pop_clip`, and children
/// never see the clips of their parents.
pub trait Canvas {
    fn set_size(&mut self, size: Dimens);
    fn size(&self) -> Dimens;
    fn clear(&mut self);

    fn fill_rect(&mut self, rect: Rect, color: Color, alpha: u8);
    fn stroke_rect(&mut self, rect: Rect, width: i32, color: Color, alpha: u8);
    fn draw_line(&mut self, start: Coords, end: Coords, width: i32, color: Color, alpha: u8);
    #[allow(clippy::too_many_arguments)]
    fn draw_gradient(&mut self, rect: Rect, from: Color, from_alpha: u8, to: Color, to_alpha: u8, angle: Angle);
    fn draw_drop_shadow(&mut self, rect: Rect, size: i32, color: Color, alpha: u8);
    fn draw_bitmap(&mut self, dest: Rect, bitmap: &Bitmap);
    fn draw_text(&mut self, origin: Coords, text: &str, style: &TextStyle);

    fn push_clip(&mut self, clip: Rect);
    fn pop_clip(&mut self);

    fn flush(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect { rect: Rect, color: Color, alpha: u8 },
    StrokeRect { rect: Rect, width: i32, color: Color, alpha: u8 },
    Line { start: Coords, end: Coords, width: i32, color: Color, alpha: u8 },
    Gradient { rect: Rect, from: Color, to: Color, angle: Angle },
    DropShadow { rect: Rect, size: i32, color: Color },
    Bitmap { dest: Rect, width: u32, height: u32 },
    Text { origin: Coords, text: String, style: TextStyle },
    PushClip(Rect),
    PopClip,
}

/// Canvas that keeps a display list instead of pixels.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    size: Dimens,
    clips: Vec<Rect>,
    commands: Vec<DrawCommand>,
}

impl RecordingCanvas {
    pub fn new(size: Dimens) -> Self {
        Self { size, ..Self::default() }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn clip_depth(&self) -> usize {
        self.clips.len()
    }

    pub fn texts(&self) -> impl Iterator<Item = (Coords, &str)> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { origin, text, .. } => Some((*origin, text.as_str())),
            _ => None,
        })
    }

    pub fn fills(&self) -> impl Iterator<Item = (Rect, Color)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::FillRect { rect, color, .. } => Some((*rect, *color)),
            _ => None,
        })
    }

    fn record(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}

impl Canvas for RecordingCanvas {
    fn set_size(&mut self, size: Dimens) {
        self.size = size;
    }

    fn size(&self) -> Dimens {
        self.size
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.clips.clear();
    }

    fn fill_rect(&mut self, rect: Rect, color: Color, alpha: u8) {
        self.record(DrawCommand::FillRect { rect, color, alpha });
    }

    fn stroke_rect(&mut self, rect: Rect, width: i32, color: Color, alpha: u8) {
        self.record(DrawCommand::StrokeRect { rect, width, color, alpha });
    }

    fn draw_line(&mut self, start: Coords, end: Coords, width: i32, color: Color, alpha: u8) {
        self.record(DrawCommand::Line { start, end, width, color, alpha });
    }

    fn draw_gradient(&mut self, rect: Rect, from: Color, _: u8, to: Color, _: u8, angle: Angle) {
        self.record(DrawCommand::Gradient { rect, from, to, angle });
    }

    fn draw_drop_shadow(&mut self, rect: Rect, size: i32, color: Color, _: u8) {
        self.record(DrawCommand::DropShadow { rect, size, color });
    }

    fn draw_bitmap(&mut self, dest: Rect, bitmap: &Bitmap) {
        self.record(DrawCommand::Bitmap { dest, width: bitmap.width, height: bitmap.height });
    }

    fn draw_text(&mut self, origin: Coords, text: &str, style: &TextStyle) {
        self.record(DrawCommand::Text { origin, text: text.to_string(), style: style.clone() });
    }

    fn push_clip(&mut self, clip: Rect) {
        self.clips.push(clip);
        self.record(DrawCommand::PushClip(clip));
    }

    fn pop_clip(&mut self) {
        if self.clips.pop().is_none() {
            warn!("pop_clip without a matching push_clip");
            return;
        }
        self.record(DrawCommand::PopClip);
    }
}

/// Shared decoded image, handed out by the image cache.
pub type SharedBitmap = Rc<Bitmap>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_stack_is_balanced() {
        let mut canvas = RecordingCanvas::new(Dimens::new(100, 100));
        let r = Rect::new(Coords::new(0, 0), Dimens::new(10, 10));
        canvas.push_clip(r);
        canvas.fill_rect(r, Color::WHITE, 255);
        canvas.pop_clip();
        canvas.pop_clip();
        assert_eq!(canvas.clip_depth(), 0);
        assert_eq!(canvas.commands().len(), 3);
        assert_eq!(canvas.fills().count(), 1);
    }
}
