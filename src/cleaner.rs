use crate::walk::walk_files;
use std::{fs, path::PathBuf};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct CleanerConfig {
    pub path: PathBuf,
    /// Files strictly smaller than this many bytes are deleted.
    pub size_min: i64,
    pub zoom_min: u8,
    pub zoom_max: u8,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub visited: usize,
    pub deleted: usize,
    pub failures: usize,
    pub skipped_levels: Vec<u8>,
}

/// Deletes near-empty tiles from every existing zoom directory in the inclusive range.
pub fn clean(config: &CleanerConfig) -> CleanReport {
    let mut report = CleanReport::default();

    for zoom in config.zoom_min..=config.zoom_max {
        let level_path = config.path.join(zoom.to_string());

        if !level_path.is_dir() {
            info!("Zoom level {zoom} directory does not exist. Skipping...");

            report.skipped_levels.push(zoom);

            continue;
        }

        info!("Cleaning tiles in zoom level {zoom}...");

        for file in walk_files(&level_path) {
            let file = match file {
                Ok(file) => file,
                Err(err) => {
                    warn!("Cannot visit entry in zoom level {zoom}: {err}");

                    report.failures += 1;

                    continue;
                }
            };

            report.visited += 1;

            let size = match fs::metadata(&file.path) {
                Ok(metadata) => metadata.len(),
                Err(err) => {
                    warn!("Cannot read size of {}: {err}", file.path.display());

                    report.failures += 1;

                    continue;
                }
            };

            if i64::try_from(size).is_ok_and(|size| size >= config.size_min) {
                continue;
            }

            match fs::remove_file(&file.path) {
                Ok(()) => {
                    debug!("Deleted {} ({size} B)", file.path.display());

                    report.deleted += 1;
                }
                Err(err) => {
                    warn!("Cannot delete {}: {err}", file.path.display());

                    report.failures += 1;
                }
            }
        }
    }

    info!(
        deleted = report.deleted,
        visited = report.visited,
        "Tile cleaning process completed."
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_sized(path: &Path, size: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        fs::write(path, vec![7u8; size]).unwrap();
    }

    fn config(path: &Path, size_min: i64, zoom_min: u8, zoom_max: u8) -> CleanerConfig {
        CleanerConfig {
            path: path.to_path_buf(),
            size_min,
            zoom_min,
            zoom_max,
        }
    }

    #[test]
    fn removes_only_tiles_below_threshold() {
        let dir = tempdir().unwrap();

        let root = dir.path();

        write_sized(&root.join("14/1/1.png"), 100);
        write_sized(&root.join("14/1/2.png"), 6000);
        write_sized(&root.join("14/2/1.png"), 200);
        write_sized(&root.join("15/3/3.png"), 9000);

        let report = clean(&config(root, 5000, 14, 15));

        assert!(!root.join("14/1/1.png").exists());
        assert!(!root.join("14/2/1.png").exists());
        assert_eq!(fs::read(root.join("14/1/2.png")).unwrap(), vec![7u8; 6000]);
        assert_eq!(fs::read(root.join("15/3/3.png")).unwrap(), vec![7u8; 9000]);
        assert!(root.join("14/2").is_dir(), "emptied directories stay");

        assert_eq!(report.deleted, 2);
        assert_eq!(report.visited, 4);
        assert_eq!(report.failures, 0);
    }

    #[test]
    fn threshold_equal_to_size_keeps_the_file() {
        let dir = tempdir().unwrap();

        write_sized(&dir.path().join("3/0/0.png"), 5169);

        clean(&config(dir.path(), 5169, 3, 3));

        assert!(dir.path().join("3/0/0.png").exists());
    }

    #[test]
    fn zero_or_negative_threshold_deletes_nothing() {
        let dir = tempdir().unwrap();

        write_sized(&dir.path().join("1/0/0.png"), 0);

        assert_eq!(clean(&config(dir.path(), 0, 1, 1)).deleted, 0);
        assert_eq!(clean(&config(dir.path(), -10, 1, 1)).deleted, 0);
        assert!(dir.path().join("1/0/0.png").exists());
    }

    #[test]
    fn levels_outside_range_are_untouched_and_missing_levels_skipped() {
        let dir = tempdir().unwrap();

        write_sized(&dir.path().join("5/0/0.png"), 1);
        write_sized(&dir.path().join("7/0/0.png"), 1);

        let report = clean(&config(dir.path(), 10, 6, 7));

        assert!(dir.path().join("5/0/0.png").exists());
        assert!(!dir.path().join("7/0/0.png").exists());
        assert_eq!(report.skipped_levels, vec![6]);
    }

    #[test]
    fn running_twice_leaves_the_same_survivors() {
        let dir = tempdir().unwrap();

        write_sized(&dir.path().join("2/0/0.png"), 10);
        write_sized(&dir.path().join("2/0/1.png"), 50);

        let first = clean(&config(dir.path(), 20, 2, 2));

        let second = clean(&config(dir.path(), 20, 2, 2));

        assert_eq!(first.deleted, 1);
        assert_eq!(second.deleted, 0);
        assert!(dir.path().join("2/0/1.png").exists());
    }
}
