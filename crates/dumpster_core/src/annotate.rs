//! Image decoding and detection overlays.
//!
//! - `decode_rgb`: turn uploaded bytes (PNG/JPEG) into an RGB buffer.
//! - `draw_detections`: outline every detection that carries a box.
//! - `encode_png`: serialize the annotated buffer for the image store.

use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use crate::domain::{BoundingBox, Detection};
use crate::ports::{PortError, PortResult};

const STROKE: u32 = 3;

const PALETTE: [[u8; 3]; 6] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
];

pub fn decode_rgb(bytes: &[u8]) -> PortResult<RgbImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PortError::InvalidInput(format!("image could not be decoded: {e}")))?;
    Ok(decoded.to_rgb8())
}

pub fn encode_png(image: &RgbImage) -> PortResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PortError::StorageUnavailable(format!("failed to encode PNG: {e}")))?;
    Ok(out.into_inner())
}

/// Draws a rectangle outline per boxed detection. The color is stable per label.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        if let Some(bbox) = detection.bbox {
            draw_box(image, bbox, label_color(&detection.label));
        }
    }
}

fn label_color(label: &str) -> Rgb<u8> {
    let idx = label
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    Rgb(PALETTE[idx % PALETTE.len()])
}

fn draw_box(image: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let to_px = |v: f32, extent: u32| -> u32 {
        ((v.clamp(0.0, 1.0) * extent as f32) as u32).min(extent - 1)
    };
    let (x0, x1) = ordered(to_px(bbox.x_min, w), to_px(bbox.x_max, w));
    let (y0, y1) = ordered(to_px(bbox.y_min, h), to_px(bbox.y_max, h));

    for t in 0..STROKE {
        for x in x0..=x1 {
            put(image, x, y0.saturating_add(t).min(y1), color);
            put(image, x, y1.saturating_sub(t).max(y0), color);
        }
        for y in y0..=y1 {
            put(image, x0.saturating_add(t).min(x1), y, color);
            put(image, x1.saturating_sub(t).max(x0), y, color);
        }
    }
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn put(image: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, color);
    }
}
