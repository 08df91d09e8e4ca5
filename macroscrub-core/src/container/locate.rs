//! Shared file lookup over an unpacked container tree

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Collect every file under `root` recursively, in a stable sorted order
pub fn collect_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_into(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_into(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Find the first file named `filename` (case-insensitive) under `root`
pub fn find_file_ci(root: &Path, filename: &str) -> Option<PathBuf> {
    let wanted = filename.to_lowercase();
    let files = collect_files(root).ok()?;
    files.into_iter().find(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.to_lowercase() == wanted)
    })
}
