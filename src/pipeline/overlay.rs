use crossbeam_channel::Sender;
use image::{Rgba, RgbaImage};

use crate::{
    labels,
    types::{BoundingBox, BoxSpace, Detection},
};

pub const STROKE_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);
pub const LINE_WIDTH: u32 = 2;
pub const LABEL_FONT_PX: f32 = 16.0;

const LABEL_GAP: f32 = 5.0;
const LABEL_MIN_Y: f32 = 10.0;

/// Rectangle in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Text drawn on the surface; `y` is the baseline.
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasText {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// 2D drawing target of the overlay.
pub trait Surface {
    /// Resizing always drops whatever was drawn before.
    fn resize(&mut self, width: u32, height: u32);
    fn stroke_rect(&mut self, rect: CanvasRect);
    fn fill_text(&mut self, text: &str, x: f32, y: f32);
    /// Called once a full overlay has been painted.
    fn present(&mut self) {}
}

#[derive(Clone, Copy, Debug)]
pub struct OverlayRenderer {
    space: BoxSpace,
}

impl OverlayRenderer {
    pub fn new(space: BoxSpace) -> Self {
        Self { space }
    }

    pub fn render<S: Surface + ?Sized>(
        &self,
        detections: &[Detection],
        frame_width: u32,
        frame_height: u32,
        surface: &mut S,
    ) {
        surface.resize(frame_width, frame_height);

        for detection in detections {
            let rect = self.project(&detection.bbox, frame_width, frame_height);
            surface.stroke_rect(rect);
            let (x, y) = label_anchor(&rect);
            surface.fill_text(&label_text(detection), x, y);
        }
    }

    pub fn project(&self, bbox: &BoundingBox, width: u32, height: u32) -> CanvasRect {
        let (sx, sy) = match self.space {
            BoxSpace::Normalized => (width as f32, height as f32),
            BoxSpace::Pixel => (1.0, 1.0),
        };
        CanvasRect {
            left: bbox.x * sx,
            top: bbox.y * sy,
            right: (bbox.x + bbox.width) * sx,
            bottom: (bbox.y + bbox.height) * sy,
        }
    }
}

pub fn label_text(detection: &Detection) -> String {
    // Ties round up: 0.5625 shows as 56.3%.
    let percent = (f64::from(detection.score) * 1000.0).round() / 10.0;
    format!("{} ({percent:.1}%)", labels::translate(&detection.class_id))
}

/// Labels sit just above the box, but never above y = 10 so boxes touching
/// the top edge keep a readable label.
pub fn label_anchor(rect: &CanvasRect) -> (f32, f32) {
    if rect.top < LABEL_MIN_Y {
        (rect.left, LABEL_MIN_Y)
    } else {
        (rect.left, rect.top - LABEL_GAP)
    }
}

/// Snapshot of the canvas handed to the window.
#[derive(Clone, Debug)]
pub struct OverlayFrame {
    pub image: RgbaImage,
    pub labels: Vec<CanvasText>,
}

/// Transparent RGBA canvas. Boxes are rasterized, labels are kept as text so
/// the window can draw them with its own fonts.
pub struct Canvas {
    image: RgbaImage,
    labels: Vec<CanvasText>,
    present_tx: Option<Sender<OverlayFrame>>,
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            labels: Vec::new(),
            present_tx: None,
        }
    }

    pub fn with_presenter(present_tx: Sender<OverlayFrame>) -> Self {
        Self {
            present_tx: Some(present_tx),
            ..Self::new()
        }
    }

    #[cfg(test)]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[cfg(test)]
    pub fn labels(&self) -> &[CanvasText] {
        &self.labels
    }
}

impl Surface for Canvas {
    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
        self.labels.clear();
    }

    fn stroke_rect(&mut self, rect: CanvasRect) {
        draw_rect(&mut self.image, rect, STROKE_COLOR, LINE_WIDTH);
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) {
        self.labels.push(CanvasText {
            text: text.to_string(),
            x,
            y,
        });
    }

    fn present(&mut self) {
        if let Some(tx) = &self.present_tx {
            let frame = OverlayFrame {
                image: self.image.clone(),
                labels: self.labels.clone(),
            };
            // Drop if the window has not picked up the previous overlay yet.
            let _ = tx.try_send(frame);
        }
    }
}

/// Strokes the outline of `rect`, growing inwards by `thickness`. Parts
/// outside the image are clipped.
fn draw_rect(img: &mut RgbaImage, rect: CanvasRect, color: Rgba<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    let x0 = rect.left.round() as i64;
    let y0 = rect.top.round() as i64;
    let x1 = rect.right.round() as i64 - 1;
    let y1 = rect.bottom.round() as i64 - 1;
    if x1 < x0 || y1 < y0 {
        return;
    }

    let mut plot = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < w as i64 && y < h as i64 {
            img.put_pixel(x as u32, y as u32, color);
        }
    };

    for t in 0..thickness as i64 {
        let (xx0, yy0, xx1, yy1) = (x0 + t, y0 + t, x1 - t, y1 - t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0.max(0)..=xx1.min(w as i64 - 1) {
            plot(x, yy0);
            plot(x, yy1);
        }
        for y in yy0.max(0)..=yy1.min(h as i64 - 1) {
            plot(xx0, y);
            plot(xx1, y);
        }
    }
}
