use crate::{
    color::Rgba,
    error::{Error, IoContext, Result},
    font::WatermarkFont,
    walk::walk_files,
};
use image::{
    DynamicImage, ImageFormat, ImageReader,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use imageproc::drawing::Blend;
use std::{
    ffi::OsString,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct WatermarkConfig {
    pub directory: PathBuf,
    pub text: String,
    pub zoom_levels: Vec<u8>,
    pub font_path: PathBuf,
    pub font_size: f32,
    pub text_color: Rgba,
    pub margin_left: u32,
    pub margin_bottom: u32,
    /// Every Nth file of a directory is watermarked, starting with the first.
    pub frequency: usize,
    pub stroke_width: u32,
    pub stroke_color: Rgba,
    pub jpeg_quality: u8,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct WatermarkReport {
    pub visited: usize,
    pub watermarked: usize,
    pub failures: usize,
    pub skipped_levels: Vec<u8>,
}

/// Largest outline width in pixels; wider outlines are clamped.
pub const MAX_STROKE_WIDTH: i32 = 64;

/// Font and outline offsets, prepared once per run.
struct Stamp {
    font: WatermarkFont,
    stroke_offsets: Vec<(i32, i32)>,
}

/// Offsets within `radius` of the origin; the text is drawn once at each to form its outline.
fn stroke_offsets(radius: u32) -> Vec<(i32, i32)> {
    let r = i32::try_from(radius).unwrap_or(i32::MAX).min(MAX_STROKE_WIDTH);

    (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| (dx, dy) != (0, 0) && dx * dx + dy * dy <= r * r)
        .collect()
}

pub fn watermark(config: &WatermarkConfig) -> WatermarkReport {
    let mut report = WatermarkReport::default();

    let font = WatermarkFont::load(&config.font_path, config.font_size);

    let (text_width, text_height) = font.text_size(&config.text);

    debug!("Watermark text spans {text_width}x{text_height} px");

    let stamp = Stamp {
        font,
        stroke_offsets: stroke_offsets(config.stroke_width),
    };

    let frequency = config.frequency.max(1);

    for &level in &config.zoom_levels {
        let level_path = config.directory.join(level.to_string());

        if !level_path.is_dir() {
            info!("Zoom level {level} directory does not exist. Skipping...");

            report.skipped_levels.push(level);

            continue;
        }

        info!("Processing zoom level {level}...");

        for file in walk_files(&level_path) {
            let file = match file {
                Ok(file) => file,
                Err(err) => {
                    warn!("Cannot visit entry in zoom level {level}: {err}");

                    report.failures += 1;

                    continue;
                }
            };

            report.visited += 1;

            if !file.is_image() || file.index_in_dir % frequency != 0 {
                continue;
            }

            match watermark_file(&file.path, &stamp, config) {
                Ok(()) => {
                    debug!("Watermark added to {}", file.path.display());

                    report.watermarked += 1;
                }
                Err(err) => {
                    warn!("Cannot watermark tile: {err}");

                    report.failures += 1;
                }
            }
        }
    }

    info!(
        watermarked = report.watermarked,
        visited = report.visited,
        "Watermarking process completed."
    );

    report
}

fn watermark_file(path: &Path, stamp: &Stamp, config: &WatermarkConfig) -> Result<()> {
    let image_error = |source| Error::Image {
        path: path.to_path_buf(),
        source,
    };

    let format = ImageFormat::from_path(path).map_err(image_error)?;

    let image = ImageReader::open(path)
        .at(path)?
        .with_guessed_format()
        .at(path)?
        .decode()
        .map_err(image_error)?;

    let has_alpha = image.color().has_alpha();

    let mut canvas = Blend(image.to_rgba8());

    let x = i32::try_from(config.margin_left).unwrap_or(i32::MAX);

    let y = i32::try_from(i64::from(canvas.0.height()) - i64::from(config.margin_bottom))
        .unwrap_or(i32::MIN);

    for &(dx, dy) in &stamp.stroke_offsets {
        stamp.font.draw(
            &mut canvas,
            config.stroke_color.0,
            x.saturating_add(dx),
            y.saturating_add(dy),
            &config.text,
        );
    }

    stamp
        .font
        .draw(&mut canvas, config.text_color.0, x, y, &config.text);

    let Blend(canvas) = canvas;

    let output = if has_alpha {
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
    };

    replace_file(path, |writer| match format {
        ImageFormat::Jpeg => output
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(writer, config.jpeg_quality)),
        _ => output.write_with_encoder(PngEncoder::new(writer)),
    })
}

/// Encodes into a sibling temporary file, then renames it over `path`.
fn replace_file<F>(path: &Path, encode: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> image::ImageResult<()>,
{
    let mut temp_name = path.file_name().map(OsString::from).unwrap_or_default();

    temp_name.push(".part");

    let temp_path = path.with_file_name(temp_name);

    let result = File::create(&temp_path)
        .at(&temp_path)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);

            encode(&mut writer).map_err(|source| Error::Image {
                path: path.to_path_buf(),
                source,
            })?;

            writer
                .into_inner()
                .map_err(|err| err.into_error())
                .and_then(|file| file.sync_all())
                .at(&temp_path)
        })
        .and_then(|()| fs::rename(&temp_path, path).at(path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}
