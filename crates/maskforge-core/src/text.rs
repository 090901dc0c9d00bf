use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::error::{require_positive, Result};
use crate::geometry::Polygon;
use crate::layer::GdsLayer;
use crate::layout::Layout;

/// Horizontal anchoring of each text line relative to x = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Justify {
    #[default]
    Left,
    Center,
    Right,
}

const GLYPH_COLUMNS: usize = 5;
const GLYPH_ROWS: usize = 7;
/// Horizontal advance per character, in pixels.
const ADVANCE: usize = 6;
/// Baseline-to-baseline distance, in pixels.
const LINE_PITCH: usize = 9;

/// 5x7 bitmap rows, top row first; bit 4 is the leftmost column.
fn glyph(c: char) -> Option<[u8; GLYPH_ROWS]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
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
        ' ' => [0x00; GLYPH_ROWS],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '=' => [0x00, 0x00, 0x1F, 0x00, 0x1F, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '"' => [0x0A, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00],
        '<' => [0x02, 0x04, 0x08, 0x10, 0x08, 0x04, 0x02],
        '>' => [0x08, 0x04, 0x02, 0x01, 0x02, 0x04, 0x08],
        _ => return None,
    };
    Some(rows)
}

/// Runs of lit pixels in one glyph row as `(first column, length)`.
fn runs(row: u8) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = None;
    for col in 0..=GLYPH_COLUMNS {
        let lit = col < GLYPH_COLUMNS && row & (0x10 >> col) != 0;
        match (lit, start) {
            (true, None) => start = Some(col),
            (false, Some(s)) => {
                out.push((s, col - s));
                start = None;
            }
            _ => {}
        }
    }
    out
}

/// Render `text` as rectangles. `size` is the cap height; the first line's
/// baseline is y = 0 and lines stack downward.
pub fn text_polygons(text: &str, size: f64, justify: Justify, layer: GdsLayer) -> Result<Vec<Polygon>> {
    let size = require_positive("text.size", size)?;
    let px = size / GLYPH_ROWS as f64;
    let mut polygons = Vec::new();
    for (line_no, line) in text.split('\n').enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let width = match chars.len() {
            0 => 0.0,
            n => (n * ADVANCE - 1) as f64 * px,
        };
        let x0 = match justify {
            Justify::Left => 0.0,
            Justify::Center => -width / 2.0,
            Justify::Right => -width,
        };
        let baseline = -((line_no * LINE_PITCH) as f64) * px;
        for (i, c) in chars.iter().enumerate() {
            let rows = match glyph(*c) {
                Some(rows) => rows,
                None => {
                    log::warn!("No glyph for {:?}; leaving the cell empty", c);
                    continue;
                }
            };
            let cell_x = x0 + (i * ADVANCE) as f64 * px;
            for (r, row) in rows.iter().enumerate() {
                let y = baseline + (GLYPH_ROWS - 1 - r) as f64 * px;
                for (col, len) in runs(*row) {
                    let x = cell_x + col as f64 * px;
                    polygons.push(Polygon::rectangle(layer, x, y, x + len as f64 * px, y + px));
                }
            }
        }
    }
    Ok(polygons)
}

impl Layout {
    /// Create a detached device holding `text` rendered in the bitmap font.
    pub fn text(&mut self, text: &str, size: f64, justify: Justify, layer: GdsLayer) -> Result<DeviceId> {
        let polygons = text_polygons(text, size, justify, layer)?;
        let id = self.new_device("text");
        for polygon in polygons {
            self.add_polygon(id, polygon)?;
        }
        Ok(id)
    }
}
