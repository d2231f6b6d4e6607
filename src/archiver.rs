use crate::{
    error::{IoContext, Result},
    walk::{relative_slash_path, walk_files},
};
use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

const ARCHIVE_EXTENSION: &str = ".zip";

#[derive(Clone, Debug, PartialEq)]
pub struct ArchiverConfig {
    pub source_path: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub archived: usize,
    pub excluded: usize,
    pub failures: usize,
}

fn is_top_level_archive(depth: usize, path: &Path) -> bool {
    depth == 1
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(ARCHIVE_EXTENSION))
}

/// Deflates every file under the source directory into the destination archive.
pub fn archive(config: &ArchiverConfig) -> Result<ArchiveReport> {
    let ArchiverConfig {
        source_path,
        destination,
    } = config;

    info!(
        "Archiving tiles from {} to {}...",
        source_path.display(),
        destination.display()
    );

    if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).at(parent)?;
    }

    let mut zip = ZipWriter::new(BufWriter::new(
        File::create(destination).at(destination)?,
    ));

    let destination = fs::canonicalize(destination).at(destination)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut report = ArchiveReport::default();

    for file in walk_files(source_path) {
        let file = match file {
            Ok(file) => file,
            Err(err) => {
                warn!("Cannot visit entry: {err}");

                report.failures += 1;

                continue;
            }
        };

        if is_top_level_archive(file.depth, &file.path)
            || fs::canonicalize(&file.path).is_ok_and(|path| path == destination)
        {
            report.excluded += 1;

            continue;
        }

        let Some(name) = relative_slash_path(source_path, &file.path) else {
            warn!("Cannot express {} as relative path", file.path.display());

            report.failures += 1;

            continue;
        };

        let mut reader = match File::open(&file.path) {
            Ok(reader) => BufReader::new(reader),
            Err(err) => {
                warn!("Cannot read {}: {err}", file.path.display());

                report.failures += 1;

                continue;
            }
        };

        zip.start_file(name, options)?;

        // a failed copy leaves a truncated entry behind
        if let Err(err) = io::copy(&mut reader, &mut zip) {
            warn!("Cannot archive {}: {err}", file.path.display());

            report.failures += 1;

            continue;
        }

        report.archived += 1;
    }

    zip.finish()?.flush().at(&destination)?;

    info!(
        archived = report.archived,
        excluded = report.excluded,
        "Archiving process completed."
    );

    Ok(report)
}
