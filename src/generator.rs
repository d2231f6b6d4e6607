use crate::{
    color::Rgba,
    engine::{RenderEngine, RenderOutput, RenderRequest},
    error::{Error, IoContext, Result},
    raster::RasterInspector,
};
use clap::ValueEnum;
use serde::Deserialize;
use std::{
    fmt::{self, Display, Formatter},
    fs,
    path::PathBuf,
};
use tracing::info;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Png,
    Jpg,
}

impl TileFormat {
    /// Value of the engine's `TILE_FORMAT` enumeration.
    pub const fn code(self) -> u8 {
        match self {
            Self::Png => 0,
            Self::Jpg => 1,
        }
    }
}

impl Display for TileFormat {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Png => "png",
                Self::Jpg => "jpg",
            }
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TilerConfig {
    pub raster_path: PathBuf,
    pub output_path: PathBuf,
    pub zoom_min: u8,
    pub zoom_max: u8,
    pub tile_format: TileFormat,
    pub dpi: u32,
    pub background_color: Rgba,
    /// JPEG quality, 0 to 100; ignored for PNG.
    pub quality: u8,
    pub meta_tile_size: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tms_convention: bool,
    pub html_title: String,
    pub html_attribution: String,
    pub html_osm: bool,
}

/// Validates the raster, reprojects its extent to WGS84 and has the engine render the pyramid.
pub fn generate(
    engine: &dyn RenderEngine,
    inspector: &dyn RasterInspector,
    config: &TilerConfig,
) -> Result<RenderOutput> {
    if config.zoom_min > config.zoom_max {
        return Err(Error::Config(format!(
            "zoom_min {} is greater than zoom_max {}",
            config.zoom_min, config.zoom_max
        )));
    }

    let extent = inspector.wgs84_extent(&config.raster_path)?;

    fs::create_dir_all(&config.output_path).at(&config.output_path)?;

    info!(
        "Rendering {} zoom {}..={} as {}",
        config.raster_path.display(),
        config.zoom_min,
        config.zoom_max,
        config.tile_format
    );

    let output = engine.render(&RenderRequest { extent, config })?;

    info!("XYZ Tile generation process completed. All layers have been successfully created :)");

    Ok(output)
}
