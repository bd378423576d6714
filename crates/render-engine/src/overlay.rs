//! Text overlays drawn after the base frame.

use reelcraft_project_model::{Rect, Size, TextOverlay};

use crate::surface::{DrawOp, Surface};

/// Canvas height at which overlay font sizes are specified.
pub const REFERENCE_HEIGHT: f64 = 720.0;

/// Background box padding, relative to the font size.
const BOX_PADDING: f64 = 0.3;

/// Turns an item's overlays into draw operations.
#[derive(Debug, Clone, Default)]
pub struct TextOverlayCompositor;

impl TextOverlayCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Font size in surface pixels for an overlay.
    pub fn font_px(overlay: &TextOverlay, canvas: Size) -> f32 {
        (overlay.font_size * canvas.height as f64 / REFERENCE_HEIGHT).max(1.0) as f32
    }

    /// Draw operations for `overlays`, in order, measured against `surface`.
    pub fn ops(&self, overlays: &[TextOverlay], surface: &Surface) -> Vec<DrawOp> {
        let canvas = surface.size();
        let mut ops = Vec::with_capacity(overlays.len() * 2);
        for overlay in overlays {
            let overlay = overlay.clone().normalized();
            if overlay.text.trim().is_empty() || overlay.opacity <= 0.0 {
                continue;
            }
            let size_px = Self::font_px(&overlay, canvas);
            let cx = overlay.x / 100.0 * canvas.width as f64;
            let cy = overlay.y / 100.0 * canvas.height as f64;
            let family = Some(overlay.font_family.trim())
                .filter(|f| !f.is_empty())
                .map(str::to_string);

            if let Some(background) = overlay.background {
                let (w, h) = surface.measure_text(&overlay.text, size_px, family.as_deref());
                let pad = size_px as f64 * BOX_PADDING;
                ops.push(DrawOp::FillRect {
                    rect: Rect::centered(cx, cy, w + pad * 2.0, h + pad * 2.0),
                    color: background.with_opacity(overlay.opacity),
                });
            }
            ops.push(DrawOp::Text {
                text: overlay.text.clone(),
                family,
                center_x: cx,
                center_y: cy,
                size_px,
                color: overlay.color.with_opacity(overlay.opacity),
            });
        }
        ops
    }

    /// Draw `overlays` onto `surface`.
    pub fn draw(&self, overlays: &[TextOverlay], surface: &mut Surface) {
        let ops = self.ops(overlays, surface);
        surface.execute(&ops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontBook;
    use reelcraft_project_model::Color;

    #[test]
    fn test_overlay_positions_scale_to_canvas() {
        let surface = Surface::new(Size::new(1280, 720));
        let overlay = TextOverlay::new("Day one", 25.0, 10.0);
        let ops = TextOverlayCompositor::new().ops(&[overlay], &surface);
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            DrawOp::Text {
                center_x,
                center_y,
                size_px,
                ..
            } => {
                assert!((center_x - 320.0).abs() < 1e-9);
                assert!((center_y - 72.0).abs() < 1e-9);
                assert!((size_px - 36.0).abs() < 1e-6);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_background_box_precedes_text_with_opacity() {
        let surface = Surface::new(Size::new(640, 360));
        let mut overlay = TextOverlay::new("Caption", 50.0, 50.0);
        overlay.background = Some(Color::BLACK);
        overlay.opacity = 0.5;
        let ops = TextOverlayCompositor::new().ops(&[overlay], &surface);
        assert_eq!(ops.len(), 2);
        match &ops[0] {
            DrawOp::FillRect { rect, color } => {
                assert_eq!(color.a, 128);
                assert_eq!(rect.center(), (320.0, 180.0));
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(matches!(&ops[1], DrawOp::Text { color, .. } if color.a == 128));
    }

    #[test]
    fn test_blank_and_invisible_overlays_are_skipped() {
        let surface = Surface::new(Size::new(100, 100));
        let mut hidden = TextOverlay::new("hidden", 50.0, 50.0);
        hidden.opacity = 0.0;
        let blank = TextOverlay::new("   ", 50.0, 50.0);
        assert!(TextOverlayCompositor::new()
            .ops(&[hidden, blank], &surface)
            .is_empty());
    }

    #[test]
    fn test_background_is_painted_even_without_font() {
        let mut surface = Surface::new(Size::new(200, 100)).with_fonts(FontBook::empty());
        let mut overlay = TextOverlay::new("Hi", 50.0, 50.0);
        overlay.background = Some(Color::WHITE);
        TextOverlayCompositor::new().draw(&[overlay], &mut surface);
        assert_eq!(surface.image().get_pixel(100, 50).0, [255, 255, 255, 255]);
        assert_eq!(surface.skipped_text_ops(), 1);
    }

    #[test]
    fn test_font_family_reaches_the_text_op() {
        let surface = Surface::new(Size::new(640, 360)).with_fonts(FontBook::empty());
        let mut serif = TextOverlay::new("Serif", 50.0, 50.0);
        serif.font_family = "serif".into();
        let mut blank = TextOverlay::new("Default", 50.0, 80.0);
        blank.font_family = "  ".into();
        let ops = TextOverlayCompositor::new().ops(&[serif, blank], &surface);
        assert!(matches!(&ops[0], DrawOp::Text { family: Some(f), .. } if f == "serif"));
        assert!(matches!(&ops[1], DrawOp::Text { family: None, .. }));
    }
}
