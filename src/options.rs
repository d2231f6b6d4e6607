use crate::generator::TileFormat;
use clap::Parser;
use std::path::PathBuf;

/// XYZ Tile Forge: generates, cleans, watermarks, lists and archives XYZ tiles.
///
/// Stages whose options are missing are skipped.
#[derive(Clone, Debug, Parser, PartialEq)]
#[command(version)]
pub struct Options {
    /// Output directory for XYZ tiles
    #[arg(short, long)]
    pub output: PathBuf,

    /// Input raster file; tiles are generated only when given
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Minimum zoom level to generate and clean
    #[arg(long)]
    pub zoom_min: Option<u8>,

    /// Maximum zoom level to generate and clean
    #[arg(long)]
    pub zoom_max: Option<u8>,

    /// Tile image format
    #[arg(long, value_enum)]
    pub format: Option<TileFormat>,

    /// Delete tiles smaller than this many bytes (e.g. 5169 for PNG, 1711 for JPEG)
    #[arg(long)]
    pub clear_size: Option<i64>,

    /// Watermark text stamped on selected zoom levels
    #[arg(long)]
    pub watermark_text: Option<String>,

    /// Zoom levels to watermark, comma separated
    #[arg(long, value_delimiter = ',')]
    pub watermark_levels: Option<Vec<u8>>,

    /// Pack the output directory into a zip archive
    #[arg(long, default_value_t = false)]
    pub archive: bool,

    /// Write relative tile paths to tile_paths.txt
    #[arg(long, default_value_t = false)]
    pub path_log: bool,

    /// TOML run configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// QGIS installation root used to locate the qgis_process runner
    #[arg(long)]
    pub qgis_root: Option<PathBuf>,

    /// Explicit qgis_process runner
    #[arg(long)]
    pub qgis_process: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Options::command().debug_assert();
    }

    #[test]
    fn only_output_is_required() {
        let options = Options::try_parse_from(["tile-forge", "-o", "out"]).unwrap();

        assert_eq!(options.output, PathBuf::from("out"));
        assert_eq!(options.input, None);
        assert!(!options.archive);
        assert!(!options.path_log);

        assert!(Options::try_parse_from(["tile-forge"]).is_err());
    }

    #[test]
    fn parses_all_stage_flags() {
        let options = Options::try_parse_from([
            "tile-forge",
            "-i",
            "ortho.ecw",
            "-o",
            "out",
            "--zoom-min",
            "3",
            "--zoom-max",
            "19",
            "--format",
            "jpg",
            "--clear-size",
            "1711",
            "--watermark-text",
            "@2024",
            "--watermark-levels",
            "14,15,17",
            "--archive",
            "--path-log",
        ])
        .unwrap();

        assert_eq!(options.input, Some(PathBuf::from("ortho.ecw")));
        assert_eq!(options.zoom_min, Some(3));
        assert_eq!(options.zoom_max, Some(19));
        assert_eq!(options.format, Some(TileFormat::Jpg));
        assert_eq!(options.clear_size, Some(1711));
        assert_eq!(options.watermark_text.as_deref(), Some("@2024"));
        assert_eq!(options.watermark_levels, Some(vec![14, 15, 17]));
        assert!(options.archive);
        assert!(options.path_log);
    }
}
