use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// File found by [`walk_files`] with its position among the files of its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFile {
    pub path: PathBuf,
    pub depth: usize,
    pub index_in_dir: usize,
}

impl TileFile {
    pub fn is_image(&self) -> bool {
        is_image(&self.path)
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Files go before subdirectories, each group in file name order, so the files of
/// one directory are always yielded contiguously.
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Recursively yields regular files under `root`.
///
/// Walk errors are passed through so the caller can decide to skip the entry.
pub fn walk_files(root: &Path) -> impl Iterator<Item = Result<TileFile, walkdir::Error>> {
    let mut current_dir: Option<PathBuf> = None;

    let mut index = 0;

    WalkDir::new(root)
        .sort_by(files_first)
        .into_iter()
        .filter(|entry| !matches!(entry, Ok(entry) if entry.file_type().is_dir()))
        .map(move |entry| -> Result<TileFile, walkdir::Error> {
            let entry = entry?;

            let parent = entry.path().parent().map(Path::to_path_buf);

            if parent != current_dir {
                current_dir = parent;

                index = 0;
            }

            let file = TileFile {
                depth: entry.depth(),
                path: entry.into_path(),
                index_in_dir: index,
            };

            index += 1;

            Ok(file)
        })
}

/// `path` relative to `root`, joined with `/` whatever the platform separator.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect();

    parts.map(|parts| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn recognises_image_extensions_case_insensitively() {
        assert!(is_image(Path::new("14/1/2.png")));
        assert!(is_image(Path::new("14/1/2.JPG")));
        assert!(is_image(Path::new("a.jpeg")));
        assert!(!is_image(Path::new("tile_paths.txt")));
        assert!(!is_image(Path::new("png")));
    }

    #[test]
    fn yields_files_of_a_directory_before_descending() {
        let dir = tempdir().unwrap();

        let root = dir.path();

        touch(&root.join("b.png"));
        touch(&root.join("a/2.png"));
        touch(&root.join("a/1.png"));
        touch(&root.join("c.txt"));
        touch(&root.join("a/z/0.png"));

        let files: Vec<_> = walk_files(root)
            .map(|file| file.unwrap())
            .map(|file| {
                (
                    relative_slash_path(root, &file.path).unwrap(),
                    file.index_in_dir,
                    file.depth,
                )
            })
            .collect();

        assert_eq!(
            files,
            vec![
                ("b.png".to_owned(), 0, 1),
                ("c.txt".to_owned(), 1, 1),
                ("a/1.png".to_owned(), 0, 2),
                ("a/2.png".to_owned(), 1, 2),
                ("a/z/0.png".to_owned(), 0, 3),
            ]
        );
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("out");

        let path = root.join("14").join("9").join("5.png");

        assert_eq!(relative_slash_path(root, &path).as_deref(), Some("14/9/5.png"));
        assert_eq!(relative_slash_path(root, Path::new("elsewhere/x.png")), None);
    }
}
