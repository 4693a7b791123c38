//! Project root and recursive file lookup

use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding the project's `data/` and `models/` folders: the crate
/// manifest directory, fixed at compile time.
pub fn get_root_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Depth-first search of `search_dir` for an entry named `filename`.
///
/// Entries are visited in file-name order, so the first match is the same on
/// every platform. Directories that cannot be read are skipped.
pub fn find_file<P: AsRef<Path>>(filename: &str, search_dir: P) -> Option<PathBuf> {
    let search_dir = search_dir.as_ref();
    let entries = match fs::read_dir(search_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping {}: {}", search_dir.display(), e);
            return None;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    for path in paths {
        if path.file_name().map_or(false, |name| name == filename) {
            return Some(path);
        }
        if path.is_dir() {
            if let Some(found) = find_file(filename, &path) {
                return Some(found);
            }
        }
    }
    None
}
