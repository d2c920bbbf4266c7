//! Programmatic screen fixtures.
//!
//! [`MockFramebuffer`] draws synthetic UI screens (filled regions, text
//! rendered with font8x8 glyphs, checkerboards) and encodes them as PNG. The
//! mock driver captures its screenshots from one, and the hashing tests use
//! it to build near-identical and clearly different screens.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

use crate::error::DriverError;

/// A virtual RGB framebuffer
#[derive(Debug, Clone, PartialEq)]
pub struct MockFramebuffer {
    image: RgbImage,
}

impl MockFramebuffer {
    /// Create a new framebuffer initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    /// Create a framebuffer filled with one color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(color)),
        }
    }

    /// Alternate two colors in square cells of `cell` pixels
    pub fn checkerboard(width: u32, height: u32, cell: u32, a: [u8; 3], b: [u8; 3]) -> Self {
        let cell = cell.max(1);
        Self {
            image: RgbImage::from_fn(width, height, |x, y| {
                if (x / cell + y / cell) % 2 == 0 { Rgb(a) } else { Rgb(b) }
            }),
        }
    }

    /// Load a framebuffer from encoded image bytes
    pub fn from_png_bytes(data: &[u8]) -> Result<Self, DriverError> {
        let image = image::load_from_memory(data)
            .map_err(|e| DriverError::Capture(format!("Failed to load PNG: {}", e)))?;
        Ok(Self { image: image.to_rgb8() })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn fill(&mut self, color: [u8; 3]) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgb(color);
        }
    }

    /// Draw a filled rectangle, clipped to the framebuffer
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        let x_end = x.saturating_add(w).min(self.width());
        let y_end = y.saturating_add(h).min(self.height());
        for py in y..y_end {
            for px in x..x_end {
                self.image.put_pixel(px, py, Rgb(color));
            }
        }
    }

    /// Draw a single line of 8x8 glyphs. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        for (i, ch) in text.chars().enumerate() {
            let origin = x + i as u32 * 8;
            if origin >= self.width() {
                break;
            }
            let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..8u32 {
                    // font8x8 stores the leftmost pixel in the lowest bit
                    let color = if (bits >> col) & 1 == 1 { fg } else { bg };
                    self.set_pixel(origin + col, y + row as u32, color);
                }
            }
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width() || y >= self.height() {
            return [0, 0, 0];
        }
        self.image.get_pixel(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x < self.width() && y < self.height() {
            self.image.put_pixel(x, y, Rgb(color));
        }
    }

    pub fn to_image(&self) -> RgbImage {
        self.image.clone()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, DriverError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| DriverError::Capture(format!("Failed to encode PNG: {}", e)))?;
        Ok(bytes)
    }

    pub fn save_png(&self, path: &Path) -> Result<(), DriverError> {
        std::fs::write(path, self.to_png()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_framebuffer_new_is_black() {
        let fb = MockFramebuffer::new(100, 50);
        assert_eq!(fb.width(), 100);
        assert_eq!(fb.height(), 50);
        assert_eq!(fb.get_pixel(99, 49), [0, 0, 0]);
    }

    #[test]
    fn test_draw_rect_is_clipped() {
        let mut fb = MockFramebuffer::new(20, 20);
        fb.draw_rect(15, 15, 10, 10, [255, 0, 0]);
        assert_eq!(fb.get_pixel(14, 14), [0, 0, 0]);
        assert_eq!(fb.get_pixel(15, 15), [255, 0, 0]);
        assert_eq!(fb.get_pixel(19, 19), [255, 0, 0]);
    }

    #[test]
    fn test_draw_text_sets_foreground() {
        let mut fb = MockFramebuffer::new(80, 16);
        fb.draw_text(0, 0, "Hi", [255, 255, 255], [0, 0, 0]);
        let lit = (0..8).flat_map(|y| (0..8).map(move |x| (x, y)))
            .filter(|(x, y)| fb.get_pixel(*x, *y) == [255, 255, 255])
            .count();
        assert!(lit > 0, "glyph 'H' should have foreground pixels");
    }

    #[test]
    fn test_checkerboard_alternates() {
        let fb = MockFramebuffer::checkerboard(8, 8, 2, [0, 0, 0], [255, 255, 255]);
        assert_eq!(fb.get_pixel(0, 0), [0, 0, 0]);
        assert_eq!(fb.get_pixel(2, 0), [255, 255, 255]);
        assert_eq!(fb.get_pixel(2, 2), [0, 0, 0]);
    }

    #[test]
    fn test_png_roundtrip_keeps_pixels() {
        let mut fb = MockFramebuffer::with_color(32, 32, [100, 150, 200]);
        fb.draw_rect(8, 8, 16, 16, [255, 0, 0]);
        let png = fb.to_png().unwrap();
        assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);
        let decoded = MockFramebuffer::from_png_bytes(&png).unwrap();
        assert_eq!(decoded, fb);
    }
}
