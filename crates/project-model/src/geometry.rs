//! Canvas geometry: sizes, rectangles and points in pixel space.

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a canvas or bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A rectangle in canvas pixel coordinates.
///
/// `(x, y)` is the top-left corner; the rectangle may extend past the
/// canvas (a zoomed image overflows the visible area).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle covering the whole canvas.
    pub fn full(canvas: Size) -> Self {
        Self::new(0.0, 0.0, canvas.width as f64, canvas.height as f64)
    }

    /// Create a rectangle of the given size centered at `(cx, cy)`.
    pub fn centered(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    /// The center point of this rectangle.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Check if a point is within this rectangle.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// Whether this rectangle fully covers `other`.
    pub fn covers(&self, other: &Rect) -> bool {
        const EPS: f64 = 1e-6;
        self.x <= other.x + EPS
            && self.y <= other.y + EPS
            && self.right() >= other.right() - EPS
            && self.bottom() >= other.bottom() - EPS
    }

    /// Linearly interpolate between two rectangles.
    pub fn lerp(a: &Rect, b: &Rect, t: f64) -> Rect {
        let t = t.clamp(0.0, 1.0);
        Rect {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            w: a.w + (b.w - a.w) * t,
            h: a.h + (b.h - a.h) * t,
        }
    }

    /// Area of the rectangle.
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Scale the rectangle around its own center.
    pub fn scaled_about_center(&self, factor: f64) -> Rect {
        let (cx, cy) = self.center();
        Rect::centered(cx, cy, self.w * factor, self.h * factor)
    }
}

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Linear interpolation between two points.
    pub fn lerp(a: &Point2D, b: &Point2D, t: f64) -> Point2D {
        let t = t.clamp(0.0, 1.0);
        Point2D {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }
}

/// Largest rectangle with the source aspect ratio that covers the canvas,
/// centered on it ("cover" fit).
pub fn cover_rect(source: Size, canvas: Size) -> Rect {
    let cw = canvas.width as f64;
    let ch = canvas.height as f64;
    if source.is_empty() {
        return Rect::full(canvas);
    }
    let scale = (cw / source.width as f64).max(ch / source.height as f64);
    let w = source.width as f64 * scale;
    let h = source.height as f64 * scale;
    Rect::centered(cw / 2.0, ch / 2.0, w, h)
}

/// Largest rectangle with the source aspect ratio that fits inside `bounds`,
/// centered in it ("contain" fit).
pub fn contain_rect(source: Size, bounds: Rect) -> Rect {
    if source.is_empty() || bounds.w <= 0.0 || bounds.h <= 0.0 {
        return bounds;
    }
    let scale = (bounds.w / source.width as f64).min(bounds.h / source.height as f64);
    let (cx, cy) = bounds.center();
    Rect::centered(
        cx,
        cy,
        source.width as f64 * scale,
        source.height as f64 * scale,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rect() {
        let rect = Rect::full(Size::new(1280, 720));
        assert!(rect.contains(640.0, 360.0));
        assert!(rect.contains(0.0, 0.0));
        assert!(rect.contains(1280.0, 720.0));
        assert!((rect.area() - 1280.0 * 720.0).abs() < 1e-9);
    }

    #[test]
    fn test_lerp() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 200.0, 200.0);
        let mid = Rect::lerp(&a, &b, 0.5);
        assert!((mid.x - 25.0).abs() < 1e-9);
        assert!((mid.w - 150.0).abs() < 1e-9);
        assert_eq!(Rect::lerp(&a, &b, 2.0), b);
    }

    #[test]
    fn test_cover_rect_landscape_source_on_landscape_canvas() {
        let rect = cover_rect(Size::new(4000, 2000), Size::new(1280, 720));
        assert!((rect.h - 720.0).abs() < 1e-9);
        assert!((rect.w - 1440.0).abs() < 1e-9);
        assert!((rect.x + 80.0).abs() < 1e-9);
        assert!(rect.covers(&Rect::full(Size::new(1280, 720))));
    }

    #[test]
    fn test_cover_rect_portrait_source() {
        let rect = cover_rect(Size::new(1000, 2000), Size::new(1280, 720));
        assert!((rect.w - 1280.0).abs() < 1e-9);
        assert!((rect.h - 2560.0).abs() < 1e-9);
        assert_eq!(rect.center(), (640.0, 360.0));
    }

    #[test]
    fn test_contain_rect_letterboxes() {
        let bounds = Rect::new(0.0, 0.0, 400.0, 400.0);
        let rect = contain_rect(Size::new(200, 100), bounds);
        assert!((rect.w - 400.0).abs() < 1e-9);
        assert!((rect.h - 200.0).abs() < 1e-9);
        assert!((rect.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaled_about_center_keeps_center() {
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        let scaled = rect.scaled_about_center(2.0);
        assert_eq!(scaled.center(), rect.center());
        assert!((scaled.w - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_point2d_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
    }
}
