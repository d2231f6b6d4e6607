use ab_glyph::{FontVec, PxScale};
use image::RgbaImage;
use imageproc::{
    drawing::{Blend, Canvas, draw_filled_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Largest font size in pixels; larger sizes are clamped.
pub const MAX_FONT_SIZE: f32 = 1000.0;

/// Directories searched when a relative font path does not exist as given.
const FONT_DIRS: &[&str] = &[
    "C:/Windows/Fonts",
    "/usr/share/fonts/truetype/msttcorefonts",
    "/usr/share/fonts/TTF",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts",
    "/Library/Fonts",
    "/System/Library/Fonts/Supplemental",
];

/// Classic 5x7 glyphs for ASCII 0x20..=0x7E, one byte per column, bit 0 is the top row.
#[rustfmt::skip]
const BITMAP_GLYPHS: [[u8; 5];

const BITMAP_CELL_WIDTH: u32 = 6;

const BITMAP_CELL_HEIGHT: u32 = 8;

/// Canvas the watermark is drawn on; every pixel is alpha blended over the tile.
pub type WatermarkCanvas = Blend<RgbaImage>;

pub enum WatermarkFont {
    Outline { font: FontVec, scale: PxScale },
    /// Built-in 5x7 font magnified by an integer factor, used when no font file can be loaded.
    Bitmap { magnification: u32 },
}

fn clamp_size(size: f32) -> f32 {
    if size > MAX_FONT_SIZE {
        warn!("Font size {size} exceeds {MAX_FONT_SIZE}. Clamping.");
    }

    // NaN becomes the maximum
    size.min(MAX_FONT_SIZE).max(1.0)
}

impl WatermarkFont {
    /// Loads `path` at `size` pixels, substituting the built-in font when it cannot be used.
    pub fn load(path: &Path, size: f32) -> Self {
        let size = clamp_size(size);

        let Some(resolved) = resolve_font_path(path) else {
            warn!(
                "Font {} not found. Fallback to default font.",
                path.display()
            );

            return Self::builtin(size);
        };

        let font = fs::read(&resolved)
            .map_err(|err| err.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|err| err.to_string()));

        match font {
            Ok(font) => {
                debug!("Loaded font {}", resolved.display());

                Self::Outline {
                    font,
                    scale: PxScale::from(size),
                }
            }
            Err(err) => {
                warn!(
                    "Cannot load font {}: {err}. Fallback to default font.",
                    resolved.display()
                );

                Self::builtin(size)
            }
        }
    }

    pub fn builtin(size: f32) -> Self {
        Self::Bitmap {
            magnification: ((clamp_size(size) / BITMAP_CELL_HEIGHT as f32).round() as u32).max(1),
        }
    }

    #[cfg(test)]
    pub const fn is_builtin(&self) -> bool {
        matches!(self, Self::Bitmap { .. })
    }

    /// Width and height of the text line in pixels.
    pub fn text_size(&self, text: &str) -> (u32, u32) {
        match self {
            Self::Outline { font, scale } => text_size(*scale, font, text),
            Self::Bitmap { magnification } => {
                let cell = BITMAP_CELL_WIDTH * magnification;

                let count = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);

                (
                    count.saturating_mul(cell),
                    BITMAP_CELL_HEIGHT * magnification,
                )
            }
        }
    }

    /// Draws `text` with the top-left corner of its line at `(x, y)`, clipped to the canvas.
    pub fn draw(
        &self,
        canvas: &mut WatermarkCanvas,
        color: image::Rgba<u8>,
        x: i32,
        y: i32,
        text: &str,
    ) {
        match self {
            Self::Outline { font, scale } => draw_text_mut(canvas, color, x, y, *scale, font, text),
            Self::Bitmap { magnification } => {
                draw_bitmap(canvas, color, *magnification, x, y, text)
            }
        }
    }
}

fn resolve_font_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    if path.is_absolute() {
        return None;
    }

    FONT_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(path))
        .find(|candidate| candidate.is_file())
}

fn draw_bitmap(
    canvas: &mut WatermarkCanvas,
    color: image::Rgba<u8>,
    magnification: u32,
    x: i32,
    y: i32,
    text: &str,
) {
    let width = i64::from(canvas.dimensions().0);

    let m = i64::from(magnification);

    let cell = i64::from(BITMAP_CELL_WIDTH) * m;

    for (i, c) in text.chars().enumerate() {
        let origin_x = i64::from(x) + i as i64 * cell;

        if origin_x >= width {
            break;
        }

        let code = c as u32;

        // unknown characters render as a filled box
        let columns = if (0x20..=0x7E).contains(&code) {
            BITMAP_GLYPHS[(code - 0x20) as usize]
        } else {
            [0x7F; 5]
        };

        for (column, bits) in columns.iter().enumerate() {
            for row in 0..7 {
                if bits & (1 << row) == 0 {
                    continue;
                }

                let left = i32::try_from(origin_x + column as i64 * m);

                let top = i32::try_from(i64::from(y) + row * m);

                if let (Ok(left), Ok(top)) = (left, top) {
                    draw_filled_rect_mut(
                        canvas,
                        Rect::at(left, top).of_size(magnification, magnification),
                        color,
                    );
                }
            }
        }
    }
}
