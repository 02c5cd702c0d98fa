//! Burns a `YYYY-MM-DD HH:MM:SS` stamp into the top-left corner of a frame.
//!
//! Glyphs come from a built-in 5x7 bitmap set, so no font files are needed on
//! the capture host. Each lit cell is drawn white over a black halo one cell
//! wide, which keeps the text legible on any background.

use chrono::{DateTime, Local};
use image::Rgb;

use crate::camera::Frame;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const FILL: Rgb<u8> = Rgb([255, 255, 255]);
const OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);

/// Rows top to bottom, bit 4 is the leftmost column.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

pub fn timestamp_label(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Cell size in pixels: roughly 1/40th of the frame height, at least 1.
fn cell_size(frame: &Frame) -> u32 {
    (frame.height() / (GLYPH_H * 6)).max(1)
}

pub fn stamp_timestamp(frame: &mut Frame, timestamp: &DateTime<Local>) {
    draw_text(frame, &timestamp_label(timestamp));
}

pub fn draw_text(frame: &mut Frame, text: &str) {
    let scale = cell_size(frame);
    let margin = scale * 2;

    // Collect lit cells first so the halo pass never paints over text.
    let mut cells = Vec::new();
    for (index, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let origin_x = margin + index as u32 * (GLYPH_W + 1) * scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) != 0 {
                    cells.push((origin_x + col * scale, margin + row as u32 * scale));
                }
            }
        }
    }

    for &(x, y) in &cells {
        fill_rect(
            frame,
            x.saturating_sub(scale),
            y.saturating_sub(scale),
            scale * 3,
            OUTLINE,
        );
    }
    for &(x, y) in &cells {
        fill_rect(frame, x, y, scale, FILL);
    }
}

fn fill_rect(frame: &mut Frame, x: u32, y: u32, size: u32, color: Rgb<u8>) {
    let x_end = (x + size).min(frame.width());
    let y_end = (y + size).min(frame.height());
    for py in y..y_end {
        for px in x..x_end {
            frame.put_pixel(px, py, color);
        }
    }
}
