//! The rendering surface and the draw operations executed on it.
//!
//! Frame sources never touch pixels directly. They describe a frame as a
//! list of [`DrawOp`]s and the [`Surface`] executes them, so the surface
//! has exactly one owner (the frame renderer).

use std::path::Path;
use std::sync::Arc;

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size, Blend};
use reelcraft_common::error::ReelResult;
use reelcraft_project_model::{Color, Rect, Size};

use crate::fonts::{self, FontBook};

/// One drawing step.
#[derive(Debug, Clone)]
pub enum DrawOp {
    /// Fill the whole surface.
    Clear(Color),
    /// Draw a bitmap scaled into `dest` (which may overflow the surface).
    Image {
        image: Arc<RgbaImage>,
        dest: Rect,
        opacity: f64,
    },
    /// Alpha-blend a solid rectangle.
    FillRect { rect: Rect, color: Color },
    /// Draw a line of text centered on `(center_x, center_y)`. `family`
    /// names a font family or file; `None` uses the default face.
    Text {
        text: String,
        family: Option<String>,
        center_x: f64,
        center_y: f64,
        size_px: f32,
        color: Color,
    },
}

/// RGBA canvas owned by the frame renderer.
pub struct Surface {
    image: RgbaImage,
    fonts: FontBook,
    skipped_text_ops: u64,
}

impl Surface {
    /// Create a black surface.
    pub fn new(size: Size) -> Self {
        Self {
            image: RgbaImage::from_pixel(size.width.max(1), size.height.max(1), Rgba([0, 0, 0, 255])),
            fonts: FontBook::system(),
            skipped_text_ops: 0,
        }
    }

    /// Use `font` as the default face for text operations.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.fonts = self.fonts.with_default_face(font);
        self
    }

    /// Replace the font lookup.
    pub fn with_fonts(mut self, fonts: FontBook) -> Self {
        self.fonts = fonts;
        self
    }

    /// Load a TTF/OTF font from disk.
    pub fn load_font(path: &Path) -> ReelResult<FontArc> {
        fonts::load_font_file(path)
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    /// Read-only view of the pixels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether a default face resolves.
    pub fn has_font(&self) -> bool {
        self.fonts.resolve(None).is_some()
    }

    /// Text operations dropped because no font face resolved.
    pub fn skipped_text_ops(&self) -> u64 {
        self.skipped_text_ops
    }

    /// Pixel extent of `text` at `size_px` in `family`. Without a font the
    /// extent is estimated from the character count.
    pub fn measure_text(&self, text: &str, size_px: f32, family: Option<&str>) -> (f64, f64) {
        match self.fonts.resolve(family) {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(size_px), &font, text);
                (w as f64, h as f64)
            }
            None => (
                text.chars().count() as f64 * size_px as f64 * 0.55,
                size_px as f64,
            ),
        }
    }

    /// Execute `ops` in order.
    pub fn execute(&mut self, ops: &[DrawOp]) {
        for op in ops {
            match op {
                DrawOp::Clear(color) => self.clear(*color),
                DrawOp::Image {
                    image,
                    dest,
                    opacity,
                } => self.draw_image(image, *dest, *opacity),
                DrawOp::FillRect { rect, color } => self.fill_rect(*rect, *color),
                DrawOp::Text {
                    text,
                    family,
                    center_x,
                    center_y,
                    size_px,
                    color,
                } => {
                    let Some(font) = self.fonts.resolve(family.as_deref()) else {
                        if self.skipped_text_ops == 0 {
                            tracing::warn!("No font face available; text will not be drawn");
                        }
                        self.skipped_text_ops += 1;
                        continue;
                    };
                    self.draw_text(&font, text, *center_x, *center_y, *size_px, *color)
                }
            }
        }
    }

    fn clear(&mut self, color: Color) {
        let px = Rgba(color.to_array());
        for pixel in self.image.pixels_mut() {
            *pixel = px;
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let rect = imageproc::rect::Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0);
        let mut canvas = Blend(std::mem::take(&mut self.image));
        draw_filled_rect_mut(&mut canvas, rect, Rgba(color.to_array()));
        self.image = canvas.0;
    }

    /// Nearest-neighbour scaled blit with alpha blending.
    fn draw_image(&mut self, src: &RgbaImage, dest: Rect, opacity: f64) {
        let opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        if opacity <= 0.0 || src.width() == 0 || src.height() == 0 {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip(dest) else {
            return;
        };

        let sx_scale = src.width() as f64 / dest.w;
        let sy_scale = src.height() as f64 / dest.h;
        let columns: Vec<u32> = (x0..x1)
            .map(|x| source_index(x, dest.x, sx_scale, src.width()))
            .collect();

        for y in y0..y1 {
            let sy = source_index(y, dest.y, sy_scale, src.height());
            for (x, sx) in (x0..x1).zip(&columns) {
                let s = src.get_pixel(*sx, sy);
                let alpha = s[3] as f64 / 255.0 * opacity;
                if alpha >= 1.0 {
                    self.image.put_pixel(x, y, Rgba([s[0], s[1], s[2], 255]));
                } else if alpha > 0.0 {
                    let d = self.image.get_pixel_mut(x, y);
                    for c in 0..3 {
                        d[c] = (s[c] as f64 * alpha + d[c] as f64 * (1.0 - alpha)).round() as u8;
                    }
                    d[3] = 255;
                }
            }
        }
    }

    fn draw_text(
        &mut self,
        font: &FontArc,
        text: &str,
        center_x: f64,
        center_y: f64,
        size_px: f32,
        color: Color,
    ) {
        if text.is_empty() || color.a == 0 {
            return;
        }

        let scale = PxScale::from(size_px);
        let (w, h) = text_size(scale, font, text);
        let x = (center_x - w as f64 / 2.0).round() as i32;
        let y = (center_y - h as f64 / 2.0).round() as i32;
        let opaque = Rgba([color.r, color.g, color.b, 255]);

        if color.a == 255 {
            draw_text_mut(&mut self.image, opaque, x, y, scale, font, text);
            return;
        }

        // Draw opaque into a copy, then mix the text box back at the
        // requested alpha.
        let mut layer = self.image.clone();
        draw_text_mut(&mut layer, opaque, x, y, scale, font, text);
        let alpha = color.a as f64 / 255.0;
        let bounds = Rect::new(x as f64, y as f64, w as f64 + 1.0, h as f64 + 1.0);
        if let Some((x0, y0, x1, y1)) = self.clip(bounds) {
            for yy in y0..y1 {
                for xx in x0..x1 {
                    let top = *layer.get_pixel(xx, yy);
                    let d = self.image.get_pixel_mut(xx, yy);
                    for c in 0..3 {
                        d[c] = (top[c] as f64 * alpha + d[c] as f64 * (1.0 - alpha)).round() as u8;
                    }
                }
            }
        }
    }

    /// Intersect `rect` with the surface; `None` when nothing is visible.
    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        if !(rect.w > 0.0 && rect.h > 0.0) {
            return None;
        }
        let (w, h) = (self.image.width() as f64, self.image.height() as f64);
        let x0 = rect.x.max(0.0).floor();
        let y0 = rect.y.max(0.0).floor();
        let x1 = rect.right().min(w).ceil();
        let y1 = rect.bottom().min(h).ceil();
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("size", &self.size())
            .field("fonts", &self.fonts)
            .finish()
    }
}

fn source_index(dest_px: u32, dest_origin: f64, scale: f64, len: u32) -> u32 {
    let s = ((dest_px as f64 + 0.5 - dest_origin) * scale).floor();
    s.clamp(0.0, (len - 1) as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(w, h, Rgba(rgba)))
    }

    #[test]
    fn test_clear_fills_every_pixel() {
        let mut surface = Surface::new(Size::new(8, 4));
        surface.execute(&[DrawOp::Clear(Color::rgb(10, 20, 30))]);
        assert!(surface
            .image()
            .pixels()
            .all(|p| p.0 == [10, 20, 30, 255]));
    }

    #[test]
    fn test_image_scaled_into_overflowing_rect() {
        let mut surface = Surface::new(Size::new(10, 10));
        // Left half red, right half green, drawn twice as wide as the surface
        // and shifted so only the left half is visible.
        let mut src = RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 255]));
        src.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        surface.execute(&[DrawOp::Image {
            image: Arc::new(src),
            dest: Rect::new(0.0, 0.0, 20.0, 10.0),
            opacity: 1.0,
        }]);
        assert_eq!(surface.image().get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(9, 9).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_image_opacity_blends() {
        let mut surface = Surface::new(Size::new(4, 4));
        surface.execute(&[
            DrawOp::Clear(Color::BLACK),
            DrawOp::Image {
                image: solid(1, 1, [200, 200, 200, 255]),
                dest: Rect::new(0.0, 0.0, 4.0, 4.0),
                opacity: 0.5,
            },
        ]);
        assert_eq!(surface.image().get_pixel(2, 2).0, [100, 100, 100, 255]);
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut surface = Surface::new(Size::new(4, 4));
        surface.execute(&[DrawOp::FillRect {
            rect: Rect::new(2.0, 2.0, 10.0, 10.0),
            color: Color::WHITE,
        }]);
        assert_eq!(surface.image().get_pixel(3, 3).0, [255, 255, 255, 255]);
        assert_eq!(surface.image().get_pixel(1, 1).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_offscreen_ops_are_ignored() {
        let mut surface = Surface::new(Size::new(4, 4));
        surface.execute(&[
            DrawOp::FillRect {
                rect: Rect::new(10.0, 10.0, 5.0, 5.0),
                color: Color::WHITE,
            },
            DrawOp::Image {
                image: solid(1, 1, [255, 255, 255, 255]),
                dest: Rect::new(-10.0, 0.0, 5.0, 4.0),
                opacity: 1.0,
            },
        ]);
        assert!(surface.image().pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn test_text_without_font_is_counted_and_skipped() {
        let mut surface = Surface::new(Size::new(64, 32)).with_fonts(FontBook::empty());
        let op = DrawOp::Text {
            text: "Hello".into(),
            family: None,
            center_x: 32.0,
            center_y: 16.0,
            size_px: 12.0,
            color: Color::WHITE,
        };
        surface.execute(&[op.clone(), op]);
        assert_eq!(surface.skipped_text_ops(), 2);
        assert!(surface.image().pixels().all(|p| p.0 == [0, 0, 0, 255]));
        let (w, h) = surface.measure_text("Hello", 12.0, None);
        assert!(w > 0.0 && h > 0.0);
    }

    #[test]
    fn test_text_uses_system_font_by_default() {
        if !fonts::system_fonts_available() {
            eprintln!("no system fonts installed; skipping");
            return;
        }
        let mut surface = Surface::new(Size::new(160, 60));
        let ops: Vec<DrawOp> = [None, Some("serif".to_string())]
            .into_iter()
            .map(|family| DrawOp::Text {
                text: "Hello".into(),
                family,
                center_x: 80.0,
                center_y: 30.0,
                size_px: 32.0,
                color: Color::WHITE,
            })
            .collect();
        surface.execute(&ops);
        assert_eq!(surface.skipped_text_ops(), 0);
        let lit = surface
            .image()
            .pixels()
            .filter(|p| p.0[0] > 128)
            .count();
        assert!(lit > 50, "only {lit} text pixels");
    }
}
