//! Ken Burns framing: pan/zoom of a still image over its display time.
//!
//! The framing is a pure function of the item's local offset, so seeking or
//! looping restarts the motion from the same place every time.
//!
//! - **zoom_in:** scale `1 -> target`, centered framing -> focal framing
//! - **zoom_out:** scale `target -> 1`, focal framing -> centered framing
//! - **pan_left / pan_right:** scale held at 1, horizontal offset only,
//!   travelling across whatever width the cover fit leaves outside the
//!   canvas (static when there is none)

use reelcraft_project_model::{
    cover_rect, FocalPoint, KenBurns, KenBurnsVariant, MediaItem, MediaKind, Rect, Size,
};

/// Default end scale of a zoom.
pub const DEFAULT_TARGET_SCALE: f64 = 1.25;

/// Horizontal overhang (canvas pixels) below which a pan stays static.
const PAN_SLACK_EPSILON: f64 = 1e-6;

/// Where and how large to draw the source bitmap, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    /// Zoom factor relative to the base (cover-fit) size.
    pub scale: f64,
    /// Top-left corner of the drawn bitmap.
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Framing {
    fn from_rect(scale: f64, rect: Rect) -> Self {
        Self {
            scale,
            offset_x: rect.x,
            offset_y: rect.y,
            width: rect.w,
            height: rect.h,
        }
    }

    /// Destination rectangle of the bitmap.
    pub fn rect(&self) -> Rect {
        Rect::new(self.offset_x, self.offset_y, self.width, self.height)
    }

    /// Whether the bitmap fully covers the canvas (no letterbox gaps).
    pub fn covers(&self, canvas: Size) -> bool {
        self.rect().covers(&Rect::full(canvas))
    }

    /// Image-space fraction shown at the canvas center.
    pub fn visible_center(&self, canvas: Size) -> (f64, f64) {
        let cx = canvas.width as f64 / 2.0;
        let cy = canvas.height as f64 / 2.0;
        (
            (cx - self.offset_x) / self.width.max(f64::EPSILON),
            (cy - self.offset_y) / self.height.max(f64::EPSILON),
        )
    }
}

/// Inputs of one framing computation.
#[derive(Debug, Clone, Copy)]
pub struct EffectParams<'a> {
    pub ken_burns: KenBurns,
    pub focal_points: &'a [FocalPoint],
    /// Decoded bitmap size.
    pub image: Size,
    pub canvas: Size,
    pub local_offset: f64,
    pub duration: f64,
}

/// Ease-out cubic: `1 - (1 - p)^3` with `p` clamped to `[0, 1]`.
pub fn ease(p: f64) -> f64 {
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    1.0 - (1.0 - p).powi(3)
}

/// Fraction of an item elapsed, in `[0, 1]`.
pub fn progress(local_offset: f64, duration: f64) -> f64 {
    if !(duration.is_finite() && duration > 0.0) {
        return 0.0;
    }
    let p = local_offset / duration;
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Computes framings for still images.
#[derive(Debug, Clone)]
pub struct EffectEngine {
    target_scale: f64,
}

impl Default for EffectEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SCALE)
    }
}

impl EffectEngine {
    /// Create an engine zooming to `target_scale` (at least 1).
    pub fn new(target_scale: f64) -> Self {
        let target_scale = if target_scale.is_finite() {
            target_scale.max(1.0)
        } else {
            DEFAULT_TARGET_SCALE
        };
        Self { target_scale }
    }

    pub fn target_scale(&self) -> f64 {
        self.target_scale
    }

    /// Zoom factor at progress `p` for a variant.
    pub fn scale_at(&self, variant: KenBurnsVariant, p: f64) -> f64 {
        let (start, end) = match variant {
            KenBurnsVariant::ZoomIn => (1.0, self.target_scale),
            KenBurnsVariant::ZoomOut => (self.target_scale, 1.0),
            KenBurnsVariant::PanLeft | KenBurnsVariant::PanRight => return 1.0,
        };
        if p.is_nan() || p <= 0.0 {
            start
        } else if p >= 1.0 {
            end
        } else {
            lerp(start, end, ease(p))
        }
    }

    /// Static framing: cover-fit, centered, no zoom.
    pub fn centered_framing(&self, image: Size, canvas: Size) -> Framing {
        Framing::from_rect(1.0, cover_rect(image, canvas))
    }

    /// Framing at `scale` that puts `focal` as close to the canvas center as
    /// possible while still covering the canvas.
    pub fn focal_framing(&self, image: Size, canvas: Size, focal: FocalPoint, scale: f64) -> Framing {
        let rect = scaled_base(image, canvas, scale);
        let (fx, fy) = focal.as_fraction();
        let x = canvas.width as f64 / 2.0 - fx * rect.w;
        let y = canvas.height as f64 / 2.0 - fy * rect.h;
        Framing::from_rect(
            scale,
            clamp_to_cover(Rect::new(x, y, rect.w, rect.h), canvas),
        )
    }

    /// Framing for an item at a local offset. Cards and videos are always
    /// centered-static.
    pub fn framing_for_item(
        &self,
        item: &MediaItem,
        image: Size,
        canvas: Size,
        local_offset: f64,
    ) -> Framing {
        if item.kind != MediaKind::Image {
            return self.centered_framing(image, canvas);
        }
        self.framing(&EffectParams {
            ken_burns: item.ken_burns,
            focal_points: &item.focal_points,
            image,
            canvas,
            local_offset,
            duration: item.effective_duration(),
        })
    }

    /// Framing for the given parameters.
    pub fn framing(&self, params: &EffectParams<'_>) -> Framing {
        if !params.ken_burns.enabled {
            return self.centered_framing(params.image, params.canvas);
        }
        let p = progress(params.local_offset, params.duration);
        match params.ken_burns.variant {
            KenBurnsVariant::ZoomIn | KenBurnsVariant::ZoomOut => self.zoom_framing(params, p),
            KenBurnsVariant::PanLeft | KenBurnsVariant::PanRight => self.pan_framing(params, p),
        }
    }

    fn zoom_framing(&self, params: &EffectParams<'_>, p: f64) -> Framing {
        let focal = params.focal_points.first().copied().unwrap_or_default();
        let variant = params.ken_burns.variant;
        let (image, canvas) = (params.image, params.canvas);
        let zoom_in = variant == KenBurnsVariant::ZoomIn;

        let endpoint = |scale: f64, at_focal: bool| {
            if at_focal {
                self.focal_framing(image, canvas, focal, scale)
            } else {
                Framing::from_rect(scale, scaled_base(image, canvas, scale))
            }
        };
        if p <= 0.0 {
            return endpoint(self.scale_at(variant, 0.0), !zoom_in);
        }
        if p >= 1.0 {
            return endpoint(self.scale_at(variant, 1.0), zoom_in);
        }

        let scale = self.scale_at(variant, p);
        let centered = scaled_base(image, canvas, scale);
        let focused = self.focal_framing(image, canvas, focal, scale).rect();
        let (from, to) = if zoom_in {
            (centered, focused)
        } else {
            (focused, centered)
        };
        let e = ease(p);
        Framing {
            scale,
            offset_x: lerp(from.x, to.x, e),
            offset_y: lerp(from.y, to.y, e),
            width: centered.w,
            height: centered.h,
        }
    }

    fn pan_framing(&self, params: &EffectParams<'_>, p: f64) -> Framing {
        let (image, canvas) = (params.image, params.canvas);
        let base = scaled_base(image, canvas, 1.0);
        let min_x = canvas.width as f64 - base.w;
        if min_x > -PAN_SLACK_EPSILON {
            // Nothing outside the canvas horizontally.
            return self.centered_framing(image, canvas);
        }
        let focal_y = params.focal_points.first().copied().unwrap_or_default();
        let y = self.focal_framing(image, canvas, focal_y, 1.0).offset_y;

        let (start_x, end_x) = match params.focal_points {
            [first, second, ..] => (
                self.focal_framing(image, canvas, *first, 1.0).offset_x,
                self.focal_framing(image, canvas, *second, 1.0).offset_x,
            ),
            _ if params.ken_burns.variant == KenBurnsVariant::PanLeft => (0.0, min_x),
            _ => (min_x, 0.0),
        };

        let x = if p <= 0.0 {
            start_x
        } else if p >= 1.0 {
            end_x
        } else {
            lerp(start_x, end_x, ease(p))
        };
        Framing {
            scale: 1.0,
            offset_x: x,
            offset_y: y,
            width: base.w,
            height: base.h,
        }
    }
}

/// Cover-fit rectangle scaled about the canvas center.
fn scaled_base(image: Size, canvas: Size, scale: f64) -> Rect {
    let base = cover_rect(image, canvas);
    if scale == 1.0 {
        base
    } else {
        base.scaled_about_center(scale)
    }
}

/// Shift a rectangle (never resize it) so it covers the canvas.
fn clamp_to_cover(rect: Rect, canvas: Size) -> Rect {
    let cw = canvas.width as f64;
    let ch = canvas.height as f64;
    let clamp_axis = |pos: f64, len: f64, extent: f64| {
        let min = extent - len;
        if min >= 0.0 {
            // Smaller than the canvas on this axis; center it.
            min / 2.0
        } else {
            pos.clamp(min, 0.0)
        }
    };
    Rect::new(
        clamp_axis(rect.x, rect.w, cw),
        clamp_axis(rect.y, rect.h, ch),
        rect.w,
        rect.h,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANVAS: Size = Size::new(1280, 720);
    const PHOTO: Size = Size::new(4000, 3000);

    fn params(variant: KenBurnsVariant, focal: &[FocalPoint], offset: f64) -> EffectParams<'_> {
        EffectParams {
            ken_burns: KenBurns::enabled(variant),
            focal_points: focal,
            image: PHOTO,
            canvas: CANVAS,
            local_offset: offset,
            duration: 3.0,
        }
    }

    #[test]
    fn test_ease_endpoints() {
        assert_eq!(ease(0.0), 0.0);
        assert_eq!(ease(1.0), 1.0);
        assert!((ease(0.5) - 0.875).abs() < 1e-12);
        assert_eq!(ease(-3.0), 0.0);
    }

    #[test]
    fn test_scale_endpoints_are_exact() {
        let engine = EffectEngine::new(1.3);
        assert_eq!(engine.scale_at(KenBurnsVariant::ZoomIn, 0.0), 1.0);
        assert_eq!(engine.scale_at(KenBurnsVariant::ZoomIn, 1.0), 1.3);
        assert_eq!(engine.scale_at(KenBurnsVariant::ZoomOut, 0.0), 1.3);
        assert_eq!(engine.scale_at(KenBurnsVariant::ZoomOut, 1.0), 1.0);
        assert_eq!(engine.scale_at(KenBurnsVariant::PanLeft, 0.5), 1.0);
    }

    #[test]
    fn test_disabled_is_static_centered() {
        let engine = EffectEngine::default();
        let centered = engine.centered_framing(PHOTO, CANVAS);
        for offset in [0.0, 1.0, 2.9, 3.0] {
            let mut p = params(KenBurnsVariant::ZoomIn, &[], offset);
            p.ken_burns.enabled = false;
            assert_eq!(engine.framing(&p), centered);
        }
    }

    #[test]
    fn test_zoom_in_starts_centered() {
        let engine = EffectEngine::default();
        let focal = [FocalPoint::new(80.0, 20.0)];
        let start = engine.framing(&params(KenBurnsVariant::ZoomIn, &focal, 0.0));
        assert_eq!(start, engine.centered_framing(PHOTO, CANVAS));
    }

    #[test]
    fn test_zoom_in_moves_toward_focal_point() {
        let engine = EffectEngine::default();
        let focal = [FocalPoint::new(80.0, 20.0)];
        let end = engine.framing(&params(KenBurnsVariant::ZoomIn, &focal, 3.0));
        assert_eq!(end.scale, DEFAULT_TARGET_SCALE);

        let (u, v) = end.visible_center(CANVAS);
        assert!(u > 0.5, "pan should move right toward x=80, got {u}");
        assert!(v < 0.5, "pan should move up toward y=20, got {v}");
        assert!(end.covers(CANVAS));
    }

    #[test]
    fn test_zoom_out_ends_centered() {
        let engine = EffectEngine::default();
        let focal = [FocalPoint::new(10.0, 90.0)];
        let end = engine.framing(&params(KenBurnsVariant::ZoomOut, &focal, 3.0));
        assert_eq!(end, engine.centered_framing(PHOTO, CANVAS));
    }

    #[test]
    fn test_pan_left_travels_horizontally() {
        let engine = EffectEngine::default();
        let wide = Size::new(1920, 1080);
        let canvas = Size::new(1280, 720);
        let at = |offset: f64| {
            let mut p = params(KenBurnsVariant::PanLeft, &[], offset);
            p.image = wide;
            p.canvas = canvas;
            engine.framing(&p)
        };
        // 16:9 onto 16:9 leaves no room to travel.
        assert_eq!(at(1.0), engine.centered_framing(wide, canvas));

        let panorama = Size::new(3600, 1080);
        let at = |offset: f64| {
            let mut p = params(KenBurnsVariant::PanLeft, &[], offset);
            p.image = panorama;
            p.canvas = canvas;
            engine.framing(&p)
        };
        let (start, mid, end) = (at(0.0), at(1.0), at(3.0));
        for f in [start, mid, end] {
            assert_eq!(f.scale, 1.0);
            // Drawn at the cover-fit size, never overscanned.
            assert!((f.width - 2400.0).abs() < 1e-6 && (f.height - 720.0).abs() < 1e-6);
            assert!(f.offset_y.abs() < 1e-6);
            assert!(f.covers(canvas));
        }
        assert!(start.offset_x.abs() < 1e-9);
        assert!(start.offset_x > mid.offset_x && mid.offset_x > end.offset_x);
        assert!((end.offset_x - (1280.0 - 2400.0)).abs() < 1e-6);
    }

    #[test]
    fn test_pan_without_slack_is_static() {
        let engine = EffectEngine::default();
        // 4:3 onto 16:9 covers on width; the spare height is vertical only.
        for offset in [0.0, 1.5, 3.0] {
            let f = engine.framing(&params(KenBurnsVariant::PanRight, &[], offset));
            assert_eq!(f, engine.centered_framing(PHOTO, CANVAS));
            assert_eq!(f.scale, 1.0);
        }
    }

    #[test]
    fn test_pan_between_two_focal_points() {
        let engine = EffectEngine::default();
        let focal = [FocalPoint::new(20.0, 50.0), FocalPoint::new(80.0, 50.0)];
        let at = |offset: f64| {
            let mut p = params(KenBurnsVariant::PanRight, &focal, offset);
            p.image = Size::new(4000, 1500);
            engine.framing(&p)
        };
        let (start, end) = (at(0.0), at(3.0));
        assert_eq!(start.scale, 1.0);
        assert!(start.visible_center(CANVAS).0 < end.visible_center(CANVAS).0);
    }

    #[test]
    fn test_cards_ignore_ken_burns() {
        let engine = EffectEngine::default();
        let mut card = MediaItem::title_card("Hi", 3.0);
        card.ken_burns = KenBurns::enabled(KenBurnsVariant::ZoomIn);
        let framing = engine.framing_for_item(&card, CANVAS, CANVAS, 2.0);
        assert_eq!(framing, engine.centered_framing(CANVAS, CANVAS));
    }
}
