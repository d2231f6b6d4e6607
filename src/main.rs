mod archiver;
mod cleaner;
mod color;
mod config;
mod engine;
mod error;
mod font;
mod generator;
mod logging;
mod options;
mod path_saver;
mod pipeline;
mod raster;
mod walk;
mod watermarker;

use clap::Parser;
use config::ForgeConfig;
use engine::{QgisProcessEngine, RenderEngine};
use error::Result;
use logging::init_logging;
use options::Options;
use pipeline::{Plan, Services, run};
use std::{
    process::ExitCode,
    time::{Duration, Instant},
};
use tracing::error;

fn main() -> ExitCode {
    let options = Options::parse();

    let _logging = match init_logging(&options.output) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Cannot set up logging: {err}");

            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();

    match forge(&options) {
        Ok(()) => {
            let (hours, minutes, seconds) = hms(start.elapsed());

            println!(
                "All processes have been successfully completed in '{hours} hour {minutes} min {seconds} sec'."
            );

            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");

            ExitCode::FAILURE
        }
    }
}

fn forge(options: &Options) -> Result<()> {
    let config = match &options.config {
        Some(path) => ForgeConfig::load(path)?,
        None => ForgeConfig::default(),
    };

    let plan = Plan::new(options, config)?;

    // Discovery fails fast when generation is requested but QGIS is not found.
    let engine = plan
        .generate
        .as_ref()
        .map(|_| QgisProcessEngine::from_config(&plan.engine))
        .transpose()?;

    #[cfg(feature = "georef")]
    let inspector = raster::GdalInspector;

    #[cfg(not(feature = "georef"))]
    let inspector = raster::UnsupportedInspector;

    run(
        &plan,
        &Services {
            engine: engine.as_ref().map(|engine| engine as &dyn RenderEngine),
            inspector: &inspector,
        },
    )?;

    Ok(())
}

fn hms(elapsed: Duration) -> (u64, u64, u64) {
    let total = elapsed.as_secs();

    (total / 3600, total % 3600 / 60, total % 60)
}
