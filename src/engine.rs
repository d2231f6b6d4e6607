//! Client for the external tile rendering engine.
//!
//! The engine is the QGIS processing framework driven through its `qgis_process`
//! command line runner. Everything the runner needs from its installation (search
//! paths, Qt plugins, Python home) is resolved once into an [`QgisProcessEngine`]
//! and applied to the child process only.

use crate::{
    error::{Error, IoContext, Result},
    generator::TilerConfig,
    raster::Extent,
};
use serde::Deserialize;
use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info};

pub const DEFAULT_ALGORITHM: &str = "native:tilesxyzdirectory";

pub const PREVIEW_FILE_NAME: &str = "preview.html";

/// One render job: a validated raster, its WGS84 extent and the tiler parameters.
pub struct RenderRequest<'a> {
    pub extent: Extent,
    pub config: &'a TilerConfig,
}

impl RenderRequest<'_> {
    pub fn preview_html(&self) -> PathBuf {
        self.config.output_path.join(PREVIEW_FILE_NAME)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RenderOutput {
    pub tile_dir: PathBuf,
    pub preview_html: PathBuf,
}

pub trait RenderEngine {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput>;
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// QGIS installation root, e.g. `C:/Program Files/QGIS 3.34.3`.
    pub install_root: Option<PathBuf>,
    /// Explicit path of the `qgis_process` runner; skips installation discovery.
    pub program: Option<PathBuf>,
    pub algorithm: Option<String>,
}

pub struct QgisProcessEngine {
    program: PathBuf,
    algorithm: String,
    env: Vec<(OsString, OsString)>,
}

/// Resolves `apps/qgis-ltr/<sub>`, falling back to `apps/qgis/<sub>`.
pub fn qgis_component(install_root: &Path, sub_path: &str) -> Result<PathBuf> {
    ["qgis-ltr", "qgis"]
        .iter()
        .map(|flavour| install_root.join("apps").join(flavour).join(sub_path))
        .find(|path| path.exists())
        .ok_or_else(|| {
            Error::EngineMissing(format!(
                "neither qgis-ltr nor qgis {sub_path} directory found in {}",
                install_root.display()
            ))
        })
}

fn runner_in(bin_dir: &Path) -> Option<PathBuf> {
    [
        "qgis_process",
        "qgis_process.exe",
        "qgis_process-qgis-ltr.bat",
        "qgis_process-qgis.bat",
    ]
    .iter()
    .map(|name| bin_dir.join(name))
    .find(|path| path.is_file())
}

impl QgisProcessEngine {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let algorithm = config
            .algorithm
            .clone()
            .unwrap_or_else(|| DEFAULT_ALGORITHM.to_owned());

        let Some(root) = &config.install_root else {
            return Ok(Self {
                program: config
                    .program
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("qgis_process")),
                algorithm,
                env: Vec::new(),
            });
        };

        let qgis_bin = qgis_component(root, "bin")?;

        let qt_bin = root.join("apps").join("qt5").join("bin");

        let python_home = root.join("apps").join("Python39");

        let mut search_path: Vec<PathBuf> = vec![root.join("bin"), qgis_bin.clone(), qt_bin];

        if let Some(inherited) = env::var_os("PATH") {
            search_path.extend(env::split_paths(&inherited));
        }

        let search_path = env::join_paths(search_path)
            .map_err(|err| Error::EngineMissing(format!("unusable PATH entry: {err}")))?;

        let program = match &config.program {
            Some(program) => program.clone(),
            None => runner_in(&root.join("bin"))
                .or_else(|| runner_in(&qgis_bin))
                .ok_or_else(|| {
                    Error::EngineMissing(format!(
                        "qgis_process runner not found under {}",
                        root.display()
                    ))
                })?,
        };

        let env = vec![
            (
                OsString::from("QT_QPA_PLATFORM_PLUGIN_PATH"),
                root.join("apps").join("qt5").join("plugins").into_os_string(),
            ),
            (OsString::from("PATH"), search_path),
            (
                OsString::from("PYTHONHOME"),
                python_home.clone().into_os_string(),
            ),
            (
                OsString::from("PYTHONPATH"),
                python_home.join("lib").join("site-packages").into_os_string(),
            ),
        ];

        Ok(Self {
            program,
            algorithm,
            env,
        })
    }

    #[cfg(test)]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[cfg(test)]
    pub fn env(&self) -> &[(OsString, OsString)] {
        &self.env
    }
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// `KEY=VALUE` parameters of the tiling algorithm.
pub fn algorithm_parameters(request: &RenderRequest) -> Vec<String> {
    let config = request.config;

    [
        ("LAYERS", config.raster_path.display().to_string()),
        ("EXTENT", format!("{} [EPSG:4326]", request.extent)),
        ("ZOOM_MIN", config.zoom_min.to_string()),
        ("ZOOM_MAX", config.zoom_max.to_string()),
        ("DPI", config.dpi.to_string()),
        ("BACKGROUND_COLOR", config.background_color.to_string()),
        ("TILE_FORMAT", config.tile_format.code().to_string()),
        ("QUALITY", config.quality.to_string()),
        ("METATILESIZE", config.meta_tile_size.to_string()),
        ("TILE_WIDTH", config.tile_width.to_string()),
        ("TILE_HEIGHT", config.tile_height.to_string()),
        ("TMS_CONVENTION", flag(config.tms_convention).to_owned()),
        ("HTML_TITLE", config.html_title.clone()),
        ("HTML_ATTRIBUTION", config.html_attribution.clone()),
        ("HTML_OSM", flag(config.html_osm).to_owned()),
        ("OUTPUT_DIRECTORY", config.output_path.display().to_string()),
        ("OUTPUT_HTML", request.preview_html().display().to_string()),
    ]
    .into_iter()
    .map(|(key, value)| format!("{key}={value}"))
    .collect()
}

impl RenderEngine for QgisProcessEngine {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput> {
        let mut command = Command::new(&self.program);

        command
            .arg("run")
            .arg(&self.algorithm)
            .arg("--")
            .args(algorithm_parameters(request))
            .envs(self.env.iter().map(|(key, value)| (key, value)));

        debug!("Running {command:?}");

        info!(
            "The XYZ Tile generation process is started. This may take some time, please be patient..."
        );

        let output = command.output().at(&self.program)?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(target: "qgis_process", "{line}");
        }

        if !output.status.success() {
            return Err(Error::EngineFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(RenderOutput {
            tile_dir: request.config.output_path.clone(),
            preview_html: request.preview_html(),
        })
    }
}
