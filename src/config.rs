//! Optional TOML run configuration.
//!
//! Every key may be omitted; the defaults are the values the forge has always
//! shipped with. Command line flags are applied on top in [`crate::pipeline`].

use crate::{
    color::Rgba,
    engine::EngineConfig,
    error::{Error, IoContext, Result},
    generator::TileFormat,
};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    pub tiler: TilerSection,
    pub cleaner: CleanerSection,
    pub watermark: WatermarkSection,
    pub archive: ArchiveSection,
    pub engine: EngineConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TilerSection {
    pub zoom_min: u8,
    pub zoom_max: u8,
    pub tile_format: TileFormat,
    pub dpi: u32,
    pub background_color: Rgba,
    pub quality: u8,
    pub meta_tile_size: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tms_convention: bool,
    pub html_title: String,
    pub html_attribution: String,
    pub html_osm: bool,
}

impl Default for TilerSection {
    fn default() -> Self {
        Self {
            zoom_min: 1,
            zoom_max: 20,
            tile_format: TileFormat::Png,
            dpi: 96,
            background_color: Rgba::new(255, 255, 255, 0),
            quality: 74,
            meta_tile_size: 4,
            tile_width: 256,
            tile_height: 256,
            tms_convention: false,
            html_title: String::new(),
            html_attribution: String::new(),
            html_osm: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CleanerSection {
    pub zoom_min: u8,
    pub zoom_max: u8,
    /// Enables cleaning when set; 1711 suits JPEG and 5169 PNG tiles at zoom 19.
    pub size_min: Option<i64>,
}

impl Default for CleanerSection {
    fn default() -> Self {
        Self {
            zoom_min: 1,
            zoom_max: 25,
            size_min: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkSection {
    /// Enables watermarking when set.
    pub text: Option<String>,
    pub zoom_levels: Vec<u8>,
    pub font_path: PathBuf,
    pub font_size: f32,
    pub text_color: Rgba,
    pub margin_left: u32,
    pub margin_bottom: u32,
    pub frequency: usize,
    pub stroke_width: u32,
    pub stroke_color: Rgba,
    pub jpeg_quality: u8,
}

impl Default for WatermarkSection {
    fn default() -> Self {
        Self {
            text: None,
            zoom_levels: vec![14, 15, 17],
            font_path: PathBuf::from("arial.ttf"),
            font_size: 10.0,
            text_color: Rgba::new(255, 255, 255, 255),
            margin_left: 10,
            margin_bottom: 10,
            frequency: 5,
            stroke_width: 0,
            stroke_color: Rgba::new(0, 0, 0, 255),
            jpeg_quality: 75,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSection {
    /// Relative paths are resolved against the output directory.
    pub file_name: PathBuf,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            file_name: PathBuf::from("tiles.zip"),
        }
    }
}

impl ForgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).at(path)?;

        toml::from_str(&content)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }
}
