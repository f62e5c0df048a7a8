// Annotated copy of the input: dot and cell markers

use image::{ColorType, DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::core::types::{Cell, Dot};

const DOT_COLOR: Rgba<u8> = Rgba([0, 200, 0, 255]);
const CELL_COLOR: Rgba<u8> = Rgba([30, 90, 230, 255]);
const SPACE_COLOR: Rgba<u8> = Rgba([230, 170, 0, 255]);

/// Draw a circle around every dot and a box around every cell
///
/// The result keeps the dimensions and color type of `source`.
pub fn draw_detections(
    source: &DynamicImage,
    dots: &[Dot],
    cells: &[Cell],
    spacing: Option<f32>,
) -> DynamicImage {
    let mut canvas = source.to_rgba8();

    for dot in dots {
        let radius = (dot.radius().ceil() as i32 + 1).max(2);
        let center = (dot.x.round() as i32, dot.y.round() as i32);
        draw_hollow_circle_mut(&mut canvas, center, radius, DOT_COLOR);
    }

    if let Some(spacing) = spacing {
        let bounds = (canvas.width() as f32, canvas.height() as f32);
        for cell in cells {
            let Some(rect) = cell_box(cell, spacing, bounds) else {
                continue;
            };
            let color = if cell.inserted { SPACE_COLOR } else { CELL_COLOR };
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    restore_color_type(canvas, source.color())
}

/// Box around a cell's six positions with half a pitch of margin, clipped to
/// one pixel outside the canvas
fn cell_box(cell: &Cell, spacing: f32, (width, height): (f32, f32)) -> Option<Rect> {
    let pad = spacing * 0.5;
    let left = (cell.x - pad).clamp(-1.0, width);
    let top = (cell.y - pad).clamp(-1.0, height);
    let right = (cell.x + spacing + pad).clamp(-1.0, width);
    let bottom = (cell.y + 2.0 * spacing + pad).clamp(-1.0, height);
    if !(right > left && bottom > top) {
        return None;
    }

    let rect = Rect::at(left.round() as i32, top.round() as i32).of_size(
        (right - left).round().max(1.0) as u32,
        (bottom - top).round().max(1.0) as u32,
    );
    Some(rect)
}

fn restore_color_type(canvas: RgbaImage, color: ColorType) -> DynamicImage {
    let rgba = DynamicImage::ImageRgba8(canvas);
    match color {
        ColorType::L8 => DynamicImage::ImageLuma8(rgba.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(rgba.to_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(rgba.to_rgb8()),
        ColorType::L16 => DynamicImage::ImageLuma16(rgba.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(rgba.to_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(rgba.to_rgb16()),
        ColorType::Rgba16 => DynamicImage::ImageRgba16(rgba.to_rgba16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(rgba.to_rgb32f()),
        ColorType::Rgba32F => DynamicImage::ImageRgba32F(rgba.to_rgba32f()),
        _ => rgba,
    }
}
