use crate::{
    archiver::{ArchiveReport, ArchiverConfig, archive},
    cleaner::{CleanReport, CleanerConfig, clean},
    config::ForgeConfig,
    engine::{EngineConfig, RenderEngine, RenderOutput},
    error::{Error, Result},
    font::MAX_FONT_SIZE,
    generator::{TilerConfig, generate},
    options::Options,
    path_saver::{PathReport, save_paths},
    raster::RasterInspector,
    watermarker::{WatermarkConfig, WatermarkReport, watermark},
};
use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
};
use tracing::{info, info_span, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Generate,
    Clean,
    Watermark,
    SavePaths,
    Archive,
}

impl StageKind {
    pub const ORDER: [StageKind; 5] = [
        Self::Generate,
        Self::Clean,
        Self::Watermark,
        Self::SavePaths,
        Self::Archive,
    ];

    /// Option that enables the stage, for skip notices.
    const fn enabled_by(self) -> &'static str {
        match self {
            Self::Generate => "-i/--input",
            Self::Clean => "--clear-size",
            Self::Watermark => "--watermark-text",
            Self::SavePaths => "--path-log",
            Self::Archive => "--archive",
        }
    }
}

impl Display for StageKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Generate => "tile generation",
                Self::Clean => "tile cleaning",
                Self::Watermark => "watermarking",
                Self::SavePaths => "path logging",
                Self::Archive => "archiving",
            }
        )
    }
}

/// Fully resolved run: every stage is either configured (enabled) or absent.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub output: PathBuf,
    pub generate: Option<TilerConfig>,
    pub clean: Option<CleanerConfig>,
    pub watermark: Option<WatermarkConfig>,
    pub save_paths: bool,
    pub archive: Option<ArchiverConfig>,
    pub engine: EngineConfig,
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Config(message()))
    }
}

impl Plan {
    /// Merges command line options over the file configuration and validates the result.
    pub fn new(options: &Options, config: ForgeConfig) -> Result<Self> {
        let ForgeConfig {
            tiler,
            cleaner,
            watermark,
            archive,
            mut engine,
        } = config;

        let output = options.output.clone();

        let generate = options.input.as_ref().map(|raster_path| TilerConfig {
            raster_path: raster_path.clone(),
            output_path: output.clone(),
            zoom_min: options.zoom_min.unwrap_or(tiler.zoom_min),
            zoom_max: options.zoom_max.unwrap_or(tiler.zoom_max),
            tile_format: options.format.unwrap_or(tiler.tile_format),
            dpi: tiler.dpi,
            background_color: tiler.background_color,
            quality: tiler.quality,
            meta_tile_size: tiler.meta_tile_size,
            tile_width: tiler.tile_width,
            tile_height: tiler.tile_height,
            tms_convention: tiler.tms_convention,
            html_title: tiler.html_title.clone(),
            html_attribution: tiler.html_attribution.clone(),
            html_osm: tiler.html_osm,
        });

        let clean = options
            .clear_size
            .or(cleaner.size_min)
            .map(|size_min| CleanerConfig {
                path: output.clone(),
                size_min,
                zoom_min: options.zoom_min.unwrap_or(cleaner.zoom_min),
                zoom_max: options.zoom_max.unwrap_or(cleaner.zoom_max),
            });

        let watermark = options
            .watermark_text
            .clone()
            .or(watermark.text.clone())
            .map(|text| WatermarkConfig {
                directory: output.clone(),
                text,
                zoom_levels: options
                    .watermark_levels
                    .clone()
                    .unwrap_or(watermark.zoom_levels.clone()),
                font_path: watermark.font_path.clone(),
                font_size: watermark.font_size,
                text_color: watermark.text_color,
                margin_left: watermark.margin_left,
                margin_bottom: watermark.margin_bottom,
                frequency: watermark.frequency,
                stroke_width: watermark.stroke_width,
                stroke_color: watermark.stroke_color,
                jpeg_quality: watermark.jpeg_quality,
            });

        let archive = options.archive.then(|| ArchiverConfig {
            source_path: output.clone(),
            destination: output.join(&archive.file_name),
        });

        if options.qgis_root.is_some() {
            engine.install_root = options.qgis_root.clone();
        }

        if options.qgis_process.is_some() {
            engine.program = options.qgis_process.clone();
        }

        let plan = Self {
            output,
            generate,
            clean,
            watermark,
            save_paths: options.path_log,
            archive,
            engine,
        };

        plan.validate()?;

        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        if let Some(tiler) = &self.generate {
            check(tiler.zoom_min <= tiler.zoom_max, || {
                format!(
                    "tiler zoom_min {} exceeds zoom_max {}",
                    tiler.zoom_min, tiler.zoom_max
                )
            })?;

            check(tiler.quality <= 100, || {
                format!("tiler quality {} is not within 0..=100", tiler.quality)
            })?;
        }

        if let Some(cleaner) = &self.clean {
            check(cleaner.zoom_min <= cleaner.zoom_max, || {
                format!(
                    "cleaner zoom_min {} exceeds zoom_max {}",
                    cleaner.zoom_min, cleaner.zoom_max
                )
            })?;
        }

        if let Some(watermark) = &self.watermark {
            check(!watermark.text.is_empty(), || {
                "watermark text must not be empty".to_owned()
            })?;

            check(watermark.frequency >= 1, || {
                "watermark frequency must be at least 1".to_owned()
            })?;

            check(
                watermark.font_size > 0.0 && watermark.font_size <= MAX_FONT_SIZE,
                || {
                    format!(
                        "watermark font size {} is not within 0..={MAX_FONT_SIZE}",
                        watermark.font_size
                    )
                },
            )?;

            check(watermark.jpeg_quality <= 100, || {
                format!(
                    "watermark jpeg_quality {} is not within 0..=100",
                    watermark.jpeg_quality
                )
            })?;
        }

        Ok(())
    }

    pub fn is_enabled(&self, stage: StageKind) -> bool {
        match stage {
            StageKind::Generate => self.generate.is_some(),
            StageKind::Clean => self.clean.is_some(),
            StageKind::Watermark => self.watermark.is_some(),
            StageKind::SavePaths => self.save_paths,
            StageKind::Archive => self.archive.is_some(),
        }
    }

    /// Stages in execution order with their enabled flags.
    pub fn stages(&self) -> [(StageKind, bool); 5] {
        StageKind::ORDER.map(|stage| (stage, self.is_enabled(stage)))
    }
}

pub struct Services<'a> {
    /// Absent when generation is disabled.
    pub engine: Option<&'a dyn RenderEngine>,
    pub inspector: &'a dyn RasterInspector,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub rendered: Option<RenderOutput>,
    pub cleaned: Option<CleanReport>,
    pub watermarked: Option<WatermarkReport>,
    pub paths: Option<PathReport>,
    pub archived: Option<ArchiveReport>,
    pub failed_stages: Vec<StageKind>,
}

impl RunSummary {
    /// Files that could not be visited, read, modified or archived.
    pub fn file_failures(&self) -> usize {
        self.cleaned.as_ref().map_or(0, |report| report.failures)
            + self.watermarked.as_ref().map_or(0, |report| report.failures)
            + self.paths.as_ref().map_or(0, |report| report.failures)
            + self.archived.as_ref().map_or(0, |report| report.failures)
    }

    fn log(&self) {
        if let Some(output) = &self.rendered {
            info!(
                "Tiles written to {}, preview at {}",
                output.tile_dir.display(),
                output.preview_html.display()
            );
        }

        if let Some(paths) = &self.paths {
            info!(listed = paths.listed, "Tile manifest at {}", paths.manifest.display());
        }

        let skipped_levels: Vec<u8> = self
            .cleaned
            .iter()
            .flat_map(|report| report.skipped_levels.iter())
            .chain(
                self.watermarked
                    .iter()
                    .flat_map(|report| report.skipped_levels.iter()),
            )
            .copied()
            .collect();

        if !skipped_levels.is_empty() {
            info!(?skipped_levels, "Some zoom levels had no directory.");
        }

        let file_failures = self.file_failures();

        if file_failures > 0 || !self.failed_stages.is_empty() {
            warn!(
                file_failures,
                failed_stages = ?self.failed_stages,
                "Run finished with problems."
            );
        }
    }
}

/// Runs the enabled stages in order.
///
/// A generation failure ends the run; failures of later stages are logged and the
/// remaining stages still run.
pub fn run(plan: &Plan, services: &Services) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for (stage, enabled) in plan.stages() {
        if !enabled {
            info!("Skipping {stage}: {} not given.", stage.enabled_by());

            continue;
        }

        let _span = info_span!("stage", %stage).entered();

        match stage {
            StageKind::Generate => {
                if let Some(tiler) = &plan.generate {
                    let engine = services.engine.ok_or_else(|| {
                        Error::EngineMissing("no rendering engine configured".to_owned())
                    })?;

                    summary.rendered = Some(generate(engine, services.inspector, tiler)?);
                }
            }
            StageKind::Clean => {
                summary.cleaned = plan.clean.as_ref().map(clean);
            }
            StageKind::Watermark => {
                summary.watermarked = plan.watermark.as_ref().map(watermark);
            }
            StageKind::SavePaths => match save_paths(&plan.output) {
                Ok(report) => summary.paths = Some(report),
                Err(err) => {
                    warn!("Path logging failed: {err}");

                    summary.failed_stages.push(stage);
                }
            },
            StageKind::Archive => {
                if let Some(archiver) = &plan.archive {
                    match archive(archiver) {
                        Ok(report) => summary.archived = Some(report),
                        Err(err) => {
                            warn!("Archiving failed: {err}");

                            summary.failed_stages.push(stage);
                        }
                    }
                }
            }
        }
    }

    summary.log();

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        generator::tests::{FakeEngine, FakeInspector},
        path_saver::MANIFEST_FILE_NAME,
        raster::Extent,
    };
    use clap::Parser;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    fn options(args: &[&str]) -> Options {
        Options::try_parse_from(["tile-forge"].iter().chain(args)).unwrap()
    }

    fn extent() -> Extent {
        Extent::new(26.97, 39.45, 27.0, 39.47)
    }

    #[test]
    fn stages_without_options_are_disabled() {
        let plan = Plan::new(&options(&["-o", "out"]), ForgeConfig::default()).unwrap();

        assert!(plan.stages().iter().all(|(_, enabled)| !enabled));
    }

    #[test]
    fn flags_enable_stages_in_fixed_order() {
        let plan = Plan::new(
            &options(&[
                "-o",
                "out",
                "-i",
                "in.tif",
                "--clear-size",
                "5169",
                "--watermark-text",
                "@2024",
                "--path-log",
                "--archive",
            ]),
            ForgeConfig::default(),
        )
        .unwrap();

        assert_eq!(
            plan.stages(),
            StageKind::ORDER.map(|stage| (stage, true))
        );
        assert_eq!(
            plan.archive.unwrap().destination,
            Path::new("out").join("tiles.zip")
        );
    }

    #[test]
    fn command_line_zoom_overrides_tiler_and_cleaner() {
        let plan = Plan::new(
            &options(&[
                "-o", "out", "-i", "in.tif", "--clear-size", "10", "--zoom-min", "5", "--zoom-max",
                "9",
            ]),
            ForgeConfig::default(),
        )
        .unwrap();

        let tiler = plan.generate.unwrap();
        let cleaner = plan.clean.unwrap();

        assert_eq!((tiler.zoom_min, tiler.zoom_max), (5, 9));
        assert_eq!((cleaner.zoom_min, cleaner.zoom_max), (5, 9));
    }

    #[test]
    fn file_configuration_can_enable_stages() {
        let config: ForgeConfig = toml::from_str(
            "[cleaner]\nsize_min = 1711\n[watermark]\ntext = \"(c)\"\nfrequency = 3\n",
        )
        .unwrap();

        let plan = Plan::new(&options(&["-o", "out"]), config).unwrap();

        assert_eq!(plan.clean.unwrap().size_min, 1711);
        assert_eq!(plan.watermark.unwrap().frequency, 3);
    }

    #[test]
    fn invalid_values_are_rejected_up_front() {
        let zero_frequency: ForgeConfig =
            toml::from_str("[watermark]\ntext = \"x\"\nfrequency = 0\n").unwrap();

        assert!(matches!(
            Plan::new(&options(&["-o", "out"]), zero_frequency),
            Err(Error::Config(_))
        ));

        assert!(matches!(
            Plan::new(
                &options(&["-o", "out", "-i", "a.tif", "--zoom-min", "9", "--zoom-max", "3"]),
                ForgeConfig::default()
            ),
            Err(Error::Config(_))
        ));

        let huge_font: ForgeConfig =
            toml::from_str("[watermark]\ntext = \"x\"\nfont_size = 1000000.0\n").unwrap();

        assert!(matches!(
            Plan::new(&options(&["-o", "out"]), huge_font),
            Err(Error::Config(_))
        ));

        assert!(matches!(
            Plan::new(
                &options(&["-o", "out", "--watermark-text", ""]),
                ForgeConfig::default()
            ),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn full_run_generates_cleans_watermarks_lists_and_archives() {
        let dir = tempdir().unwrap();

        let output = dir.path().join("out");

        let output_arg = output.to_str().unwrap();

        let plan = Plan::new(
            &options(&[
                "-o",
                output_arg,
                "-i",
                "in.tif",
                "--zoom-min",
                "14",
                "--zoom-max",
                "15",
                "--clear-size",
                "1",
                "--watermark-text",
                "@2024",
                "--watermark-levels",
                "14",
                "--path-log",
                "--archive",
            ]),
            ForgeConfig::default(),
        )
        .unwrap();

        let engine = FakeEngine::default();

        let summary = run(
            &plan,
            &Services {
                engine: Some(&engine),
                inspector: &FakeInspector(Some(extent())),
            },
        )
        .unwrap();

        assert_eq!(summary.cleaned.unwrap().deleted, 0);
        assert_eq!(summary.watermarked.unwrap().watermarked, 1);
        assert_eq!(summary.paths.unwrap().listed, 2);
        assert_eq!(summary.archived.unwrap().archived, 4);
        assert!(summary.failed_stages.is_empty());

        assert_eq!(
            fs::read_to_string(output.join(MANIFEST_FILE_NAME)).unwrap(),
            "14/0/0.png\n15/0/0.png\n"
        );
        assert!(output.join("tiles.zip").is_file());
    }

    #[test]
    fn invalid_raster_halts_the_run() {
        let dir = tempdir().unwrap();

        let output = dir.path().join("out");

        let plan = Plan::new(
            &options(&["-o", output.to_str().unwrap(), "-i", "broken.tif", "--path-log"]),
            ForgeConfig::default(),
        )
        .unwrap();

        let result = run(
            &plan,
            &Services {
                engine: Some(&FakeEngine::default()),
                inspector: &FakeInspector(None),
            },
        );

        assert!(matches!(result, Err(Error::RasterOpen { .. })));
        assert!(!output.join(MANIFEST_FILE_NAME).exists());
    }

    #[test]
    fn later_stages_run_on_existing_tree_without_generation() {
        let dir = tempdir().unwrap();

        let root = dir.path();

        for (path, size) in [
            ("14/1/1.png", 100),
            ("14/1/2.png", 6000),
            ("14/1/3.png", 200),
            ("15/1/1.png", 9000),
        ] {
            let path = root.join(path);

            fs::create_dir_all(path.parent().unwrap()).unwrap();

            fs::write(path, vec![1u8; size]).unwrap();
        }

        let plan = Plan::new(
            &options(&[
                "-o",
                root.to_str().unwrap(),
                "--clear-size",
                "5000",
                "--zoom-min",
                "14",
                "--zoom-max",
                "15",
                "--path-log",
            ]),
            ForgeConfig::default(),
        )
        .unwrap();

        let summary = run(
            &plan,
            &Services {
                engine: None,
                inspector: &FakeInspector(None),
            },
        )
        .unwrap();

        assert!(summary.rendered.is_none());
        assert_eq!(summary.cleaned.unwrap().deleted, 2);
        assert_eq!(
            fs::read_to_string(root.join(MANIFEST_FILE_NAME)).unwrap(),
            "14/1/2.png\n15/1/1.png\n"
        );
    }

    #[test]
    fn failing_stage_does_not_stop_later_stages() {
        let dir = tempdir().unwrap();

        let root = dir.path();

        fs::create_dir_all(root.join("3/0")).unwrap();

        fs::write(root.join("3/0/0.png"), b"tile").unwrap();

        // a directory where the manifest should go makes path logging fail
        fs::create_dir_all(root.join(MANIFEST_FILE_NAME)).unwrap();

        let plan = Plan::new(
            &options(&["-o", root.to_str().unwrap(), "--path-log", "--archive"]),
            ForgeConfig::default(),
        )
        .unwrap();

        let summary = run(
            &plan,
            &Services {
                engine: None,
                inspector: &FakeInspector(None),
            },
        )
        .unwrap();

        assert_eq!(summary.failed_stages, vec![StageKind::SavePaths]);
        assert_eq!(summary.archived.unwrap().archived, 1);
    }
}
