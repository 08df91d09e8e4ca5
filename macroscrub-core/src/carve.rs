//! Best-effort location of a workbook embedded in an executable wrapper

use crate::container::locate;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Outcome of a carving attempt. `container_path` stays absent when nothing
/// usable was found; `extracted` marks whether the scratch directory was
/// populated.
#[derive(Debug, Default, Clone)]
pub struct LocatedContainer {
    pub container_path: Option<PathBuf>,
    pub extracted: bool,
}

/// Try to locate a macro-enabled workbook behind an executable wrapper.
///
/// Two heuristics, in order: treat the executable as a self-extracting zip
/// and search the extracted tree; otherwise scan the raw bytes for workbook
/// path strings that exist on disk. This is a carving heuristic, not a
/// format contract, so every failure degrades to "not found".
pub fn locate_embedded_container(exe_path: &Path, scratch_dir: &Path) -> LocatedContainer {
    let mut result = LocatedContainer::default();
    if !exe_path.is_file() {
        return result;
    }

    if unzip_into(exe_path, scratch_dir).is_ok() {
        result.extracted = true;
        if let Some(found) = find_workbook_in_dir(scratch_dir) {
            result.container_path = Some(found);
            return result;
        }
    }

    result.container_path = find_embedded_path(exe_path);
    result
}

/// Extract the executable as a zip archive, if it is one.
fn unzip_into(exe_path: &Path, scratch_dir: &Path) -> io::Result<()> {
    let file = File::open(exe_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // Hostile names are skipped rather than fatal; carving is best-effort.
        let Some(rel) = entry.enclosed_name() else {
            continue;
        };
        let dest = scratch_dir.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

fn find_workbook_in_dir(dir: &Path) -> Option<PathBuf> {
    locate::collect_files(dir).ok()?.into_iter().find(|path| {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsm"))
    })
}

/// Scan the binary for printable path strings ending in `.xlsm` and return
/// the first one that exists on disk.
fn find_embedded_path(exe_path: &Path) -> Option<PathBuf> {
    let data = fs::read(exe_path).ok()?;
    let mut start = None;

    for (i, &byte) in data.iter().enumerate() {
        if is_path_byte(byte) {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take() {
            if let Some(path) = existing_workbook(&data[s..i]) {
                return Some(path);
            }
        }
    }
    start.and_then(|s| existing_workbook(&data[s..]))
}

fn existing_workbook(bytes: &[u8]) -> Option<PathBuf> {
    let text = std::str::from_utf8(bytes).ok()?;
    if !text.to_lowercase().ends_with(".xlsm") {
        return None;
    }
    let path = PathBuf::from(text);
    path.is_file().then_some(path)
}

fn is_path_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'/' | b'\\' | b':' | b'.' | b'-' | b'_')
}
