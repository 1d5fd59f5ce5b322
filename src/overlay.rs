//! Draws region outlines on a copy of a page image.

use crate::region::Region;
use anyhow::{Context, Result};
use image::{DynamicImage, ImageOutputFormat, Rgb, Rgba};
use imageproc::drawing::{draw_line_segment_mut, Canvas};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, warn};

/// Stroke color and width for polygon outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub color: [u8; 3],
    pub width: u32,
}

impl OverlayStyle {
    pub const RED: [u8; 3] = [255, 0, 0];

    /// Style used for single-image uploads.
    pub const fn image_default() -> Self {
        Self { color: Self::RED, width: 2 }
    }

    /// Style used for rasterized PDF pages.
    pub const fn pdf_default() -> Self {
        Self { color: Self::RED, width: 3 }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width.max(1);
        self
    }
}

/// Render `regions` onto a copy of `base`. The base image is left untouched.
///
/// 8-bit RGB and RGBA images keep their pixel layout. Other layouts are
/// promoted to RGBA only when there is something to draw, so a call with no
/// drawable region returns an exact copy.
pub fn overlay(base: &DynamicImage, regions: &[Region], style: &OverlayStyle) -> DynamicImage {
    let drawable: Vec<&Region> = regions
        .iter()
        .filter(|region| {
            if region.points.len() < 3 {
                warn!(
                    "Skipping region with {} point(s): {:?}",
                    region.points.len(),
                    region.text
                );
                return false;
            }
            true
        })
        .collect();

    if drawable.is_empty() {
        debug!("Overlay: nothing to draw ({} region(s) given)", regions.len());
        return base.clone();
    }

    let [r, g, b] = style.color;
    let rendered = match base {
        DynamicImage::ImageRgb8(rgb) => {
            let mut canvas = rgb.clone();
            stroke(&mut canvas, &drawable, Rgb([r, g, b]), style.width);
            DynamicImage::ImageRgb8(canvas)
        }
        other => {
            let mut canvas = other.to_rgba8();
            stroke(&mut canvas, &drawable, Rgba([r, g, b, 255]), style.width);
            DynamicImage::ImageRgba8(canvas)
        }
    };

    debug!("Overlay: drew {} of {} region(s)", drawable.len(), regions.len());
    rendered
}

/// Draw each closed outline, widened by repeated offset passes.
fn stroke<C>(canvas: &mut C, regions: &[&Region], color: C::Pixel, width: u32)
where
    C: Canvas,
    C::Pixel: 'static,
{
    let offsets = stroke_offsets(width);
    for region in regions {
        let n = region.points.len();
        for i in 0..n {
            let a = region.points[i];
            let b = region.points[(i + 1) % n];
            for &dx in &offsets {
                for &dy in &offsets {
                    draw_line_segment_mut(
                        &mut *canvas,
                        (a.x as f32 + dx, a.y as f32 + dy),
                        (b.x as f32 + dx, b.y as f32 + dy),
                        color,
                    );
                }
            }
        }
    }
}

/// Pixel offsets that widen a 1px line to `width` px, centred on the edge.
fn stroke_offsets(width: u32) -> Vec<f32> {
    let width = width.max(1) as i32;
    let start = -(width - 1) / 2;
    (start..start + width).map(|o| o as f32).collect()
}

/// PNG-encode an image for transport.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Point;
    use image::{GrayAlphaImage, LumaA, RgbImage, RgbaImage};

    fn white(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
    }

    #[test]
    fn test_no_regions_is_identical_copy() {
        let rgb = DynamicImage::ImageRgb8(white(16, 12));
        assert_eq!(overlay(&rgb, &[], &OverlayStyle::image_default()), rgb);

        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0])));
        let out = overlay(&transparent, &[], &OverlayStyle::image_default());
        assert_eq!(out, transparent);
        assert_eq!(*out.to_rgba8().get_pixel(0, 0), Rgba([10, 20, 30, 0]));

        let gray = DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(3, 3, LumaA([7, 100])));
        assert_eq!(overlay(&gray, &[], &OverlayStyle::pdf_default()), gray);
    }

    #[test]
    fn test_polygon_outline_drawn_and_base_untouched() {
        let img = white(20, 20);
        let base = DynamicImage::ImageRgb8(img.clone());
        let region = Region::from_rect(2, 2, 10, 10, "hi", None).unwrap();

        let out = overlay(&base, &[region], &OverlayStyle::image_default());
        let out = out.as_rgb8().expect("RGB input stays RGB");

        assert_eq!(*out.get_pixel(2, 2), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(12, 7), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(7, 7), Rgb([255, 255, 255]));
        assert_eq!(base.to_rgb8(), img);
    }

    #[test]
    fn test_rgba_outline_keeps_untouched_alpha() {
        let base = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 40])));
        let region = Region::from_rect(2, 2, 10, 10, "hi", None).unwrap();

        let out = overlay(&base, &[region], &OverlayStyle::pdf_default());
        let out = out.as_rgba8().expect("RGBA input stays RGBA");

        assert_eq!(*out.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(7, 7), Rgba([0, 0, 255, 40]));
    }

    #[test]
    fn test_short_polygons_are_skipped() {
        let base = DynamicImage::ImageRgb8(white(10, 10));
        let line = Region {
            points: vec![Point::new(0, 0), Point::new(9, 9)],
            text: "line".to_string(),
            confidence: None,
        };
        let out = overlay(&base, &[line], &OverlayStyle::pdf_default());
        assert_eq!(out, base);
    }

    #[test]
    fn test_stroke_offsets() {
        assert_eq!(stroke_offsets(1), vec![0.0]);
        assert_eq!(stroke_offsets(2), vec![0.0, 1.0]);
        assert_eq!(stroke_offsets(3), vec![-1.0, 0.0, 1.0]);
        assert_eq!(stroke_offsets(0), vec![0.0]);
    }

    #[test]
    fn test_encode_png_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 4])));
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgba8(), img.to_rgba8());
    }
}
