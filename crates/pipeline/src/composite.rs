//! Composite preview grids.
//!
//! Tiles are laid out row-major on a light grey canvas:
//!
//! ```text
//! pad | tile 370x320 | pad | tile | ... | pad
//!     | label 30     |     | label|
//! ```
//!
//! Each tile gets a dark label strip carrying its two-digit ordinal.
//! Missing or undecodable artifacts are drawn as a grey placeholder so one
//! bad file never prevents the preview.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::error::WorkflowError;

pub const TILE_WIDTH: u32 = 370;
pub const TILE_HEIGHT: u32 = 320;
pub const PADDING: u32 = 10;
pub const LABEL_HEIGHT: u32 = 30;

/// Columns in the sample preview.
pub const SAMPLE_COLUMNS: u32 = 5;

/// Columns in the full preview.
pub const FULL_COLUMNS: u32 = 8;

const BACKGROUND: Rgba<u8> = Rgba([240, 240, 240, 255]);
const PLACEHOLDER: Rgba<u8> = Rgba([200, 200, 200, 255]);
const LABEL_FILL: Rgba<u8> = Rgba([50, 50, 50, 255]);
const LABEL_INK: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// One tile of the grid.
#[derive(Debug, Clone)]
pub struct GridEntry {
    pub number: i64,
    pub image_path: Option<PathBuf>,
}

/// Canvas size for `count` tiles in `columns` columns.
pub fn canvas_size(count: usize, columns: u32) -> (u32, u32) {
    let columns = columns.max(1);
    let rows = (count as u32).div_ceil(columns).max(1);
    let width = columns * (TILE_WIDTH + PADDING) + PADDING;
    let height = rows * (TILE_HEIGHT + LABEL_HEIGHT + PADDING) + PADDING;
    (width, height)
}

/// Render the grid and write it to `out` as PNG.
///
/// CPU-bound; call from a blocking task.
pub fn render_grid(entries: &[GridEntry], columns: u32, out: &Path) -> Result<(), WorkflowError> {
    let columns = columns.max(1);
    let (width, height) = canvas_size(entries.len(), columns);
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);

    for (i, entry) in entries.iter().enumerate() {
        let col = i as u32 % columns;
        let row = i as u32 / columns;
        let x = PADDING + col * (TILE_WIDTH + PADDING);
        let y = PADDING + row * (TILE_HEIGHT + LABEL_HEIGHT + PADDING);

        match entry.image_path.as_deref().and_then(load_tile) {
            Some(tile) => imageops::overlay(&mut canvas, &tile, x.into(), y.into()),
            None => fill_rect(&mut canvas, x, y, TILE_WIDTH, TILE_HEIGHT, PLACEHOLDER),
        }

        let label_y = y + TILE_HEIGHT;
        fill_rect(&mut canvas, x, label_y, TILE_WIDTH, LABEL_HEIGHT, LABEL_FILL);
        draw_number(&mut canvas, entry.number, x, label_y);
    }

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save_with_format(out, image::ImageFormat::Png)?;
    Ok(())
}

fn load_tile(path: &Path) -> Option<RgbaImage> {
    match image::open(path) {
        Ok(img) => Some(imageops::resize(
            &img.to_rgba8(),
            TILE_WIDTH,
            TILE_HEIGHT,
            FilterType::Lanczos3,
        )),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable tile, using placeholder");
            None
        }
    }
}

fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    let x_end = (x + w).min(canvas.width());
    let y_end = (y + h).min(canvas.height());
    for py in y..y_end {
        for px in x..x_end {
            canvas.put_pixel(px, py, color);
        }
    }
}

// 3x5 digit glyphs, one row per byte, low three bits used.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

const GLYPH_SCALE: u32 = 4;

/// Draw `number` (at least two digits) centred in the label strip.
fn draw_number(canvas: &mut RgbaImage, number: i64, x: u32, label_y: u32) {
    let text = format!("{:02}", number.max(0));
    let glyph_w = 3 * GLYPH_SCALE;
    let glyph_h = 5 * GLYPH_SCALE;
    let gap = GLYPH_SCALE;
    let text_w = text.len() as u32 * (glyph_w + gap) - gap;
    let start_x = x + TILE_WIDTH.saturating_sub(text_w) / 2;
    let start_y = label_y + LABEL_HEIGHT.saturating_sub(glyph_h) / 2;

    for (i, ch) in text.chars().enumerate() {
        let Some(d) = ch.to_digit(10) else { continue };
        let gx = start_x + i as u32 * (glyph_w + gap);
        for (row, bits) in DIGITS[d as usize].iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) != 0 {
                    fill_rect(
                        canvas,
                        gx + col * GLYPH_SCALE,
                        start_y + row as u32 * GLYPH_SCALE,
                        GLYPH_SCALE,
                        GLYPH_SCALE,
                        LABEL_INK,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_matches_layout() {
        assert_eq!(canvas_size(5, SAMPLE_COLUMNS), (1910, 370));
        // 30 stamps over 8 columns is 4 rows.
        assert_eq!(canvas_size(30, FULL_COLUMNS), (3050, 1450));
        assert_eq!(canvas_size(0, FULL_COLUMNS).1, 370);
    }

    #[test]
    fn missing_and_corrupt_tiles_become_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("stamp_01.png");
        RgbaImage::from_pixel(50, 50, Rgba([255, 0, 0, 255]))
            .save(&good)
            .unwrap();
        let corrupt = dir.path().join("stamp_02.png");
        std::fs::write(&corrupt, b"not an image").unwrap();

        let entries = vec![
            GridEntry { number: 1, image_path: Some(good) },
            GridEntry { number: 2, image_path: Some(corrupt) },
            GridEntry { number: 3, image_path: None },
        ];
        let out = dir.path().join("nested").join("sample_grid.png");
        render_grid(&entries, SAMPLE_COLUMNS, &out).unwrap();

        let grid = image::open(&out).unwrap().to_rgba8();
        assert_eq!(grid.dimensions(), canvas_size(3, SAMPLE_COLUMNS));
        // Centre of tile 1 is the red source image.
        let red = grid.get_pixel(PADDING + TILE_WIDTH / 2, PADDING + TILE_HEIGHT / 2);
        assert!(red.0[0] >= 250 && red.0[1] <= 5);
        // Tile 2 and 3 are placeholders.
        let x2 = PADDING + (TILE_WIDTH + PADDING) + 5;
        assert_eq!(*grid.get_pixel(x2, PADDING + 5), PLACEHOLDER);
        let x3 = PADDING + 2 * (TILE_WIDTH + PADDING) + 5;
        assert_eq!(*grid.get_pixel(x3, PADDING + 5), PLACEHOLDER);
        // Label strip is dark at its left edge.
        assert_eq!(*grid.get_pixel(PADDING + 1, PADDING + TILE_HEIGHT + 1), LABEL_FILL);
    }
}
