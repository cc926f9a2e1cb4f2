use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError};
use std::path::Path;

use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Whether images are rescaled to fill the box or only shrunk to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    Fill,
    #[default]
    ShrinkOnly,
}

// ---------------------------------------------------------------------------
// Decoded payload
// ---------------------------------------------------------------------------

/// Pixels sized for one target box, plus where to put them and which
/// margins around them must be cleared.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 0x00RRGGBB, row-major, `placement.width * placement.height` entries.
    pub pixels: Vec<u32>,
    pub placement: Rect,
    pub cleared: Vec<Rect>,
    pub source_size: Size,
}

/// Image codec service: decode, orient and size a file for a target box.
pub trait Codec: Send + Sync {
    fn decode(
        &self,
        path: &Path,
        target: Size,
        fit: FitMode,
        orientation: u8,
    ) -> Result<Frame, LoadError>;
}

/// Where an image of `image` size lands inside `target`, after scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub scaled: Size,
    pub placement: Rect,
    pub cleared: Vec<Rect>,
}

pub fn layout(image: Size, target: Size, fit: FitMode) -> Layout {
    let (w, h) = (target.width as i64, target.height as i64);
    let (iw, ih) = (image.width.max(1), image.height.max(1));
    let x_ratio = target.width as f64 / iw as f64;
    let y_ratio = target.height as f64 / ih as f64;

    let rescale = match fit {
        FitMode::Fill => x_ratio != 1.0 || y_ratio != 1.0,
        FitMode::ShrinkOnly => x_ratio < 1.0 || y_ratio < 1.0,
    };

    // Keep the aspect ratio; blank space ends up on one axis only.
    let (sw, sh) = if rescale {
        let ratio = x_ratio.min(y_ratio);
        (
            ((iw as f64 * ratio).round() as i64).max(1),
            ((ih as f64 * ratio).round() as i64).max(1),
        )
    } else {
        (iw as i64, ih as i64)
    };
    let x = ((w - sw) / 2).max(0);
    let y = ((h - sh) / 2).max(0);

    let placement = Rect::new(x as u32, y as u32, sw as u32, sh as u32);
    let (right, bottom) = (placement.right(), placement.bottom());
    let mut cleared = Vec::new();
    if placement.y != 0 {
        cleared.push(Rect::new(0, 0, target.width, placement.y));
    }
    if bottom < target.height {
        cleared.push(Rect::new(0, bottom, target.width, target.height - bottom));
    }
    if placement.x != 0 {
        cleared.push(Rect::new(0, placement.y, placement.x, sh as u32));
    }
    if right < target.width {
        cleared.push(Rect::new(right, placement.y, target.width - right, sh as u32));
    }

    Layout {
        scaled: Size::new(sw as u32, sh as u32),
        placement,
        cleared,
    }
}

/// Apply an EXIF orientation (1..=8): rotate first, then mirror.
pub fn apply_orientation(img: DynamicImage, orientation: u8) -> DynamicImage {
    let (rotated, flip) = match orientation {
        2 => (img, true),
        3 => (img.rotate180(), false),
        4 => (img.rotate180(), true),
        5 => (img.rotate90(), true),
        6 => (img.rotate90(), false),
        7 => (img.rotate270(), true),
        8 => (img.rotate270(), false),
        _ => (img, false),
    };
    if flip { rotated.fliph() } else { rotated }
}

/// Pack RGBA over a black background into softbuffer's 0x00RRGGBB.
fn pack_pixels(img: &DynamicImage) -> Vec<u32> {
    img.to_rgba8()
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            let a = a as u32;
            let r = r as u32 * a / 255;
            let g = g as u32 * a / 255;
            let b = b as u32 * a / 255;
            r << 16 | g << 8 | b
        })
        .collect()
}

/// `Codec` backed by the `image` crate.
#[derive(Debug, Default)]
pub struct ImageCodec;

impl Codec for ImageCodec {
    fn decode(
        &self,
        path: &Path,
        target: Size,
        fit: FitMode,
        orientation: u8,
    ) -> Result<Frame, LoadError> {
        let img = image::open(path).map_err(|e| match e {
            ImageError::IoError(io) => LoadError::io(path, io),
            other => LoadError::decode(path, other),
        })?;
        let img = apply_orientation(img, orientation);
        let (iw, ih) = img.dimensions();
        let lay = layout(Size::new(iw, ih), target, fit);

        let img = if lay.scaled != Size::new(iw, ih) {
            img.resize_exact(lay.scaled.width, lay.scaled.height, FilterType::Triangle)
        } else {
            img
        };
        log::debug!(
            "{}: canvas {}x{}, loaded {}x{}, resized to {}x{} at {},{}",
            path.display(),
            target.width,
            target.height,
            iw,
            ih,
            lay.scaled.width,
            lay.scaled.height,
            lay.placement.x,
            lay.placement.y,
        );

        Ok(Frame {
            pixels: pack_pixels(&img),
            placement: lay.placement,
            cleared: lay.cleared,
            source_size: Size::new(iw, ih),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        let img = RgbaImage::from_fn(w, h, |x, _| {
            if x == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) }
        });
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn shrink_only_centers_small_image() {
        let lay = layout(Size::new(4, 2), Size::new(8, 8), FitMode::ShrinkOnly);
        assert_eq!(lay.scaled, Size::new(4, 2));
        assert_eq!(lay.placement, Rect::new(2, 3, 4, 2));
        assert_eq!(
            lay.cleared,
            vec![
                Rect::new(0, 0, 8, 3),
                Rect::new(0, 5, 8, 3),
                Rect::new(0, 3, 2, 2),
                Rect::new(6, 3, 2, 2),
            ]
        );
    }

    #[test]
    fn fill_scales_up_to_width() {
        let lay = layout(Size::new(4, 2), Size::new(8, 8), FitMode::Fill);
        assert_eq!(lay.placement, Rect::new(0, 2, 8, 4));
        assert_eq!(lay.cleared, vec![Rect::new(0, 0, 8, 2), Rect::new(0, 6, 8, 2)]);
    }

    #[test]
    fn shrink_only_scales_down_large_image() {
        let lay = layout(Size::new(200, 400), Size::new(100, 100), FitMode::ShrinkOnly);
        assert_eq!(lay.placement, Rect::new(25, 0, 50, 100));
        assert_eq!(lay.cleared, vec![Rect::new(0, 0, 25, 100), Rect::new(75, 0, 25, 100)]);
    }

    #[test]
    fn exact_fit_has_no_margins() {
        let lay = layout(Size::new(50, 50), Size::new(50, 50), FitMode::Fill);
        assert_eq!(lay.placement, Rect::new(0, 0, 50, 50));
        assert!(lay.cleared.is_empty());
    }

    #[test]
    fn orientation_six_swaps_axes() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(4, 2));
        assert_eq!(apply_orientation(img.clone(), 6).dimensions(), (2, 4));
        assert_eq!(apply_orientation(img.clone(), 3).dimensions(), (4, 2));
        assert_eq!(apply_orientation(img, 1).dimensions(), (4, 2));
    }

    #[test]
    fn mirror_moves_left_column_right() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) }
        }));
        let flipped = apply_orientation(img, 2);
        assert_eq!(pack_pixels(&flipped), vec![0x0000ff, 0xff0000]);
    }

    #[test]
    fn decodes_png_into_box() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 4, 2);
        let frame = ImageCodec
            .decode(&path, Size::new(8, 8), FitMode::ShrinkOnly, 1)
            .unwrap();
        assert_eq!(frame.placement, Rect::new(2, 3, 4, 2));
        assert_eq!(frame.pixels.len(), 8);
        assert_eq!(frame.pixels[0], 0xff0000);
        assert_eq!(frame.source_size, Size::new(4, 2));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageCodec
            .decode(&dir.path().join("nope.png"), Size::new(8, 8), FitMode::Fill, 1)
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xyz");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = ImageCodec
            .decode(&path, Size::new(8, 8), FitMode::Fill, 1)
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }
}
