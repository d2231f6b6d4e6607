use crate::{
    error::{IoContext, Result},
    walk::{relative_slash_path, walk_files},
};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const MANIFEST_FILE_NAME: &str = "tile_paths.txt";

#[derive(Debug, PartialEq, Eq)]
pub struct PathReport {
    pub manifest: PathBuf,
    pub listed: usize,
    pub failures: usize,
}

/// Writes the relative path of every image tile under `scan_path` to `tile_paths.txt`.
pub fn save_paths(scan_path: &Path) -> Result<PathReport> {
    let manifest = scan_path.join(MANIFEST_FILE_NAME);

    let mut paths = Vec::new();

    let mut failures = 0;

    for file in walk_files(scan_path) {
        match file {
            Ok(file) if file.is_image() => match relative_slash_path(scan_path, &file.path) {
                Some(path) => paths.push(path),
                None => {
                    warn!("Cannot express {} as relative path", file.path.display());

                    failures += 1;
                }
            },
            Ok(_) => {}
            Err(err) => {
                warn!("Cannot visit entry: {err}");

                failures += 1;
            }
        }
    }

    let mut writer = BufWriter::new(File::create(&manifest).at(&manifest)?);

    for path in &paths {
        writeln!(writer, "{path}").at(&manifest)?;
    }

    writer.flush().at(&manifest)?;

    info!(
        "Paths of XYZ tiles have been saved to {}",
        manifest.display()
    );

    Ok(PathReport {
        manifest,
        listed: paths.len(),
        failures,
    })
}
