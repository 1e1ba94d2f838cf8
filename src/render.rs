//! Overlay rendering for detection results.
//!
//! Rendering is split in two:
//! - `layout`: pure geometry/color/label resolution into `OverlayBox`es.
//! - `OverlayRenderer::render`: rasterizes those boxes over a fresh copy of
//!   the frame with rounded outlines and translucent label chips.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut, text_size};
use std::path::Path;

use crate::detection::{Detection, Geometry};
use crate::frame::Frame;
use crate::palette::{Color, Palette};

pub const CORNER_RADIUS: f32 = 12.0;
pub const LINE_WIDTH: u32 = 3;
pub const CHIP_HEIGHT: u32 = 28;
/// Chip top edge sits this far above the box.
pub const CHIP_OFFSET: i64 = 30;
pub const CHIP_PADDING: u32 = 16;
pub const CHIP_ALPHA: f32 = 0.7;
pub const FONT_PX: f32 = 16.0;
/// Chip width estimate per character when no font is loaded.
pub const FALLBACK_CHAR_WIDTH: u32 = 9;
/// Size of the centered fallback box, as a fraction of each canvas axis.
pub const FALLBACK_BOX_FRACTION: f64 = 0.3;

const CURVE_SEGMENTS: usize = 8;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Box in canvas pixel coordinates. Width/height are not normalized, so
/// inverted corners produce negative extents exactly as reported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub rect: BoxRect,
    pub color: Color,
    pub label: String,
}

pub fn resolve_box(geometry: &Geometry, canvas_width: u32, canvas_height: u32) -> BoxRect {
    match *geometry {
        Geometry::Corners { x1, y1, x2, y2 } => BoxRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        },
        Geometry::Sized {
            x,
            y,
            width,
            height,
        } => BoxRect {
            x,
            y,
            width,
            height,
        },
        Geometry::Unplaced => {
            let (cw, ch) = (canvas_width as f64, canvas_height as f64);
            let width = cw * FALLBACK_BOX_FRACTION;
            let height = ch * FALLBACK_BOX_FRACTION;
            BoxRect {
                x: (cw - width) / 2.0,
                y: (ch - height) / 2.0,
                width,
                height,
            }
        }
    }
}

/// `"person (coco): 92%"`; the model tag is omitted when absent.
pub fn label_text(detection: &Detection) -> String {
    let model = detection
        .model
        .as_deref()
        .map(|m| format!(" ({})", m))
        .unwrap_or_default();
    format!(
        "{}{}: {}%",
        detection.label,
        model,
        (detection.confidence * 100.0).round() as i64
    )
}

pub fn layout(
    detections: &[Detection],
    canvas_width: u32,
    canvas_height: u32,
    palette: &Palette,
) -> Vec<OverlayBox> {
    detections
        .iter()
        .map(|d| OverlayBox {
            rect: resolve_box(&d.geometry, canvas_width, canvas_height),
            color: palette.color_for(&d.label, d.model.as_deref()),
            label: label_text(d),
        })
        .collect()
}

/// Rasterizes overlay boxes. Holds the optional label font.
pub struct OverlayRenderer {
    font: Option<FontVec>,
}

impl OverlayRenderer {
    /// Renderer without text rasterization; chips are still drawn.
    pub fn without_font() -> Self {
        Self { font: None }
    }

    pub fn load(font_path: Option<&Path>) -> Result<Self> {
        let Some(path) = font_path else {
            return Ok(Self::without_font());
        };
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Pixel width of `text` at the label size.
    pub fn text_width(&self, text: &str) -> u32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(FONT_PX), font, text).0,
            None => text.chars().count() as u32 * FALLBACK_CHAR_WIDTH,
        }
    }

    /// Redraw `frame` and draw every box over it. The frame itself is untouched.
    pub fn render(&self, frame: &Frame, boxes: &[OverlayBox]) -> RgbImage {
        let mut canvas = frame.image().clone();
        for overlay in boxes {
            self.draw_box(&mut canvas, overlay);
        }
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, overlay: &OverlayBox) {
        let (canvas_width, canvas_height) = canvas.dimensions();
        let Some(clipped) = clip_rect(overlay.rect, canvas_width, canvas_height) else {
            log::debug!("skipping box with non-finite geometry: {}", overlay.label);
            return;
        };
        let color = Rgb(overlay.color.rgb());

        let (x, y) = (clipped.x as f32, clipped.y as f32);
        let (w, h) = (clipped.width as f32, clipped.height as f32);
        for i in 0..LINE_WIDTH {
            // Stroke is centered on the outline.
            let inset = i as f32 - (LINE_WIDTH / 2) as f32;
            stroke_rounded_rect(
                canvas,
                x + inset,
                y + inset,
                w - 2.0 * inset,
                h - 2.0 * inset,
                CORNER_RADIUS - inset,
                color,
            );
        }

        // Chip anchors on the reported origin, not the normalized one.
        let chip_width = self.text_width(&overlay.label).saturating_add(CHIP_PADDING);
        let chip_x = clip_coord(overlay.rect.x, canvas_width).round() as i64;
        let chip_y = (clip_coord(overlay.rect.y, canvas_height).round() as i64)
            .saturating_sub(CHIP_OFFSET);
        blend_rect(
            canvas,
            chip_x,
            chip_y,
            chip_width,
            CHIP_HEIGHT,
            overlay.color.rgb(),
            CHIP_ALPHA,
        );

        if let Some(font) = &self.font {
            let text_x = chip_x.saturating_add((CHIP_PADDING / 2) as i64);
            let text_y = chip_y.saturating_add(((CHIP_HEIGHT as f32 - FONT_PX) / 2.0) as i64);
            draw_text_mut(
                canvas,
                TEXT_COLOR,
                to_i32(text_x),
                to_i32(text_y),
                PxScale::from(FONT_PX),
                font,
                &overlay.label,
            );
        }
    }
}

/// Normalize `rect` to positive extents and clip it to one canvas size of
/// margin on every side. `None` if any coordinate is NaN or infinite.
fn clip_rect(rect: BoxRect, canvas_width: u32, canvas_height: u32) -> Option<BoxRect> {
    let (x, width) = clip_span(rect.x, rect.width, canvas_width)?;
    let (y, height) = clip_span(rect.y, rect.height, canvas_height)?;
    Some(BoxRect {
        x,
        y,
        width,
        height,
    })
}

fn clip_span(origin: f64, extent: f64, limit: u32) -> Option<(f64, f64)> {
    if !origin.is_finite() || !extent.is_finite() {
        return None;
    }
    let (start, end) = if extent < 0.0 {
        (origin + extent, origin)
    } else {
        (origin, origin + extent)
    };
    let start = clip_coord(start, limit);
    let end = clip_coord(end, limit);
    Some((start, end - start))
}

fn clip_coord(value: f64, limit: u32) -> f64 {
    let limit = limit as f64;
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-limit, 2.0 * limit)
}

fn to_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Outline with quadratic corners, control point on the corner itself.
fn stroke_rounded_rect(
    canvas: &mut RgbImage,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    radius: f32,
    color: Rgb<u8>,
) {
    if w <= 0.0 || h <= 0.0 {
        return;
    }
    let r = radius.max(0.0).min(w / 2.0).min(h / 2.0);
    let path = rounded_rect_path(x, y, w, h, r);
    for pair in path.windows(2) {
        draw_line_segment_mut(canvas, pair[0], pair[1], color);
    }
}

fn rounded_rect_path(x: f32, y: f32, w: f32, h: f32, r: f32) -> Vec<(f32, f32)> {
    let corners = [
        ((x + w - r, y), (x + w, y), (x + w, y + r)),
        ((x + w, y + h - r), (x + w, y + h), (x + w - r, y + h)),
        ((x + r, y + h), (x, y + h), (x, y + h - r)),
        ((x, y + r), (x, y), (x + r, y)),
    ];
    let mut path = vec![(x + r, y)];
    for (start, control, end) in corners {
        path.push(start);
        for step in 1..=CURVE_SEGMENTS {
            let t = step as f32 / CURVE_SEGMENTS as f32;
            path.push(quadratic_point(start, control, end, t));
        }
    }
    path
}

fn quadratic_point(p0: (f32, f32), p1: (f32, f32), p2: (f32, f32), t: f32) -> (f32, f32) {
    let u = 1.0 - t;
    (
        u * u * p0.0 + 2.0 * u * t * p1.0 + t * t * p2.0,
        u * u * p0.1 + 2.0 * u * t * p1.1 + t * t * p2.1,
    )
}

/// Alpha-blend a filled rectangle, clipped to the canvas.
fn blend_rect(
    canvas: &mut RgbImage,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    color: [u8; 3],
    alpha: f32,
) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = x.saturating_add(width as i64).min(canvas.width() as i64);
    let y1 = y.saturating_add(height as i64).min(canvas.height() as i64);
    for py in y0..y1 {
        for px in x0..x1 {
            let pixel = canvas.get_pixel_mut(px as u32, py as u32);
            for (channel, fill) in pixel.0.iter_mut().zip(color) {
                *channel = (fill as f32 * alpha + *channel as f32 * (1.0 - alpha)).round() as u8;
            }
        }
    }
}
