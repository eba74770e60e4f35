use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::warn;

use crate::canvas::{Bitmap, SharedBitmap};
use crate::geometry::Dimens;

#[derive(Debug, Clone)]
enum CacheEntry {
    /// Size is known from the header; pixels are decoded on first draw.
    Probed { size: Dimens, pixels: Option<SharedBitmap> },
    Failed,
}

/// Image sizes and decoded pixels keyed by path. A failed read is
/// remembered so a broken file is only reported once.
#[derive(Debug, Default)]
pub struct ImageSizeCache {
    map: HashMap<PathBuf, CacheEntry>,
}

impl ImageSizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn entry(&mut self, path: &Path) -> &mut CacheEntry {
        self.map.entry(path.to_path_buf()).or_insert_with(|| match image::image_dimensions(path) {
            Ok((w, h)) => CacheEntry::Probed {
                size: Dimens::new(clamp_extent(w), clamp_extent(h)),
                pixels: None,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read image header");
                CacheEntry::Failed
            }
        })
    }

    pub fn dimensions(&mut self, path: &Path) -> Option<Dimens> {
        match self.entry(path) {
            CacheEntry::Probed { size, .. } => Some(*size),
            CacheEntry::Failed => None,
        }
    }

    /// Decoded RGBA pixels of the image at `path`.
    pub fn bitmap(&mut self, path: &Path) -> Option<SharedBitmap> {
        let size = match self.entry(path) {
            CacheEntry::Failed => return None,
            CacheEntry::Probed { pixels: Some(bitmap), .. } => return Some(Rc::clone(bitmap)),
            CacheEntry::Probed { size, pixels: None } => *size,
        };
        let decoded = match image::open(path) {
            Ok(img) => {
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                Rc::new(Bitmap { width, height, channels: 4, data: rgba.into_raw() })
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not decode image");
                self.map.insert(path.to_path_buf(), CacheEntry::Failed);
                return None;
            }
        };
        self.map.insert(path.to_path_buf(), CacheEntry::Probed { size, pixels: Some(Rc::clone(&decoded)) });
        Some(decoded)
    }
}

fn clamp_extent(extent: u32) -> i32 {
    i32::try_from(extent).unwrap_or(i32::MAX)
}
