use std::path::Path;

use crate::display_item::DisplayItem;
use crate::geometry::{Dimens, GeometryProposal};
use crate::keywords::{AttributeKey, Property};

use super::{Frame, LayoutCx, PaintCx, draw_basic};

/// Scales the natural size of the image by the image-size property. An
/// image that cannot be read takes whatever it is offered.
pub(super) fn shape(cx: &mut LayoutCx<'_>, item: &DisplayItem, proposal: GeometryProposal) -> Dimens {
    let Some(path) = item.image_path() else {
        return proposal.proposed;
    };
    let Some(natural) = cx.images.dimensions(Path::new(path)) else {
        return proposal.proposed;
    };
    let scaled = match item.property(AttributeKey::ImageSizeProperty) {
        Some(Property::Stretch) => proposal.proposed,
        Some(Property::BestFit) => best_fit(natural, proposal.proposed),
        _ => natural,
    };
    proposal.round_conflicts(scaled)
}

/// Largest size with the aspect ratio of `natural` that fits `bounds`.
fn best_fit(natural: Dimens, bounds: Dimens) -> Dimens {
    if natural.w <= 0 || natural.h <= 0 {
        return natural;
    }
    let scale = (f64::from(bounds.w) / f64::from(natural.w)).min(f64::from(bounds.h) / f64::from(natural.h));
    Dimens::new((f64::from(natural.w) * scale).round() as i32, (f64::from(natural.h) * scale).round() as i32)
}

pub(super) fn draw(cx: &mut PaintCx<'_>, item: &DisplayItem, frame: &Frame) {
    let source = cx.tree.values();
    draw_basic(cx.canvas, item, source, frame);
    let Some(path) = item.image_path() else { return };
    if let Some(bitmap) = cx.images.bitmap(Path::new(path)) {
        cx.canvas.draw_bitmap(frame.drawing_area(), &bitmap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{DrawCommand, RecordingCanvas};
    use crate::geometry::{Coords, Rect};
    use crate::image_cache::ImageSizeCache;
    use crate::material::draw;
    use crate::material::tests::{TestTree, fixed, literal, property};

    fn png(dir: &tempfile::TempDir, w: u32, h: u32) -> String {
        let path = dir.path().join("picture.png");
        ::image::RgbaImage::new(w, h).save(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_best_fit_keeps_aspect() {
        assert_eq!(best_fit(Dimens::new(40, 20), Dimens::new(100, 100)), Dimens::new(100, 50));
        assert_eq!(best_fit(Dimens::new(40, 20), Dimens::new(20, 100)), Dimens::new(20, 10));
        assert_eq!(best_fit(Dimens::new(0, 20), Dimens::new(20, 100)), Dimens::new(0, 20));
    }

    #[test]
    fn test_native_size_and_bitmap_draw() {
        let dir = tempfile::tempdir().unwrap();
        let path = png(&dir, 8, 6);
        let mut tree = TestTree::default();
        let id = tree.add(None, &[(AttributeKey::ImagePath, literal(&path))]);
        let mut proposal = fixed(50, 50);
        proposal.set_shrink(crate::geometry::Angle::Horizontal, true);
        proposal.set_shrink(crate::geometry::Angle::Vertical, true);
        assert_eq!(tree.layout(id, proposal), Dimens::new(8, 6));

        let mut canvas = RecordingCanvas::new(Dimens::new(50, 50));
        let mut images = ImageSizeCache::new();
        let mut cx = PaintCx { tree: &tree, materials: &tree.materials, images: &mut images, canvas: &mut canvas };
        draw(&mut cx, id);
        let bitmaps: Vec<_> = canvas
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Bitmap { dest, width, height } => Some((*dest, *width, *height)),
                _ => None,
            })
            .collect();
        assert_eq!(bitmaps, vec![(Rect::new(Coords::new(0, 0), Dimens::new(8, 6)), 8, 6)]);
    }

    #[test]
    fn test_stretch_takes_proposal_and_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = png(&dir, 8, 6);
        let mut tree = TestTree::default();
        let stretched = tree.add(
            None,
            &[(AttributeKey::ImagePath, literal(&path)), (AttributeKey::ImageSizeProperty, property(Property::Stretch))],
        );
        let missing = tree.add(None, &[(AttributeKey::ImagePath, literal("/no/such/picture.png"))]);
        assert_eq!(tree.layout(stretched, fixed(30, 20)), Dimens::new(30, 20));
        assert_eq!(tree.materials[&stretched].frame().drawing_area().d, Dimens::new(30, 20));
        assert_eq!(tree.layout(missing, fixed(30, 20)), Dimens::new(30, 20));
    }
}
