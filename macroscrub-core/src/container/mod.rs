//! Unpack and rebuild OOXML container archives

pub mod locate;

use crate::error::Error;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// An unpacked container on disk.
///
/// Trees unpacked from an archive own a temporary directory that is removed
/// on cleanup (or drop). Trees opened from an existing directory are
/// borrowed and never deleted.
#[derive(Debug)]
pub struct WorkingTree {
    root: PathBuf,
    temp: Option<TempDir>,
}

impl WorkingTree {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when this tree owns (and will delete) its directory
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Remove the owned working directory. Calling this more than once, or
    /// on a borrowed tree, is a no-op.
    pub fn cleanup(&mut self) -> io::Result<()> {
        match self.temp.take() {
            Some(temp) => temp.close(),
            None => Ok(()),
        }
    }
}

/// Unpack an archive into a fresh working tree, or open an already unpacked
/// directory as-is.
pub fn unpack(input: &Path) -> Result<WorkingTree, Error> {
    if input.is_dir() {
        return Ok(WorkingTree {
            root: input.to_path_buf(),
            temp: None,
        });
    }

    let file = File::open(input).map_err(|_| Error::InvalidContainer(input.to_path_buf()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|_| Error::InvalidContainer(input.to_path_buf()))?;

    // Validate every entry name before writing anything, so a traversal
    // entry anywhere in the archive aborts with no partial extraction.
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.enclosed_name().is_none() {
            return Err(Error::PathEscape {
                entry: entry.name().to_string(),
            });
        }
    }

    let temp = tempfile::Builder::new().prefix("macroscrub-").tempdir()?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel = entry.enclosed_name().expect("validated above");
        let dest = temp.path().join(rel);

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

    Ok(WorkingTree {
        root: temp.path().to_path_buf(),
        temp: Some(temp),
    })
}

/// Rebuild a container archive from a working tree.
///
/// Entry ordering: `[Content_Types].xml` first, root `_rels/` entries next,
/// everything else in lexicographic order. The output file itself is
/// excluded even if it lives inside the tree. On any mid-write failure the
/// partial output is deleted before the error is returned.
pub fn rebuild(tree: &WorkingTree, output: &Path) -> Result<(), Error> {
    let entries = manifest_entries(tree.root(), output)?;

    let result = write_archive(tree.root(), output, &entries);
    if let Err(e) = result {
        let _ = fs::remove_file(output);
        return Err(Error::Rebuild {
            source: Box::new(e),
        });
    }
    Ok(())
}

fn write_archive(root: &Path, output: &Path, entries: &[String]) -> Result<(), Error> {
    let file = File::create(output)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for name in entries {
        writer.start_file(name.as_str(), options)?;
        let data = fs::read(root.join(name))?;
        writer.write_all(&data)?;
    }

    writer.finish()?;
    Ok(())
}

/// Relative entry names for a rebuild, already ordered, with the output
/// file filtered out.
fn manifest_entries(root: &Path, output: &Path) -> Result<Vec<String>, Error> {
    let output_abs = std::path::absolute(output)?;
    let mut names = Vec::new();

    for path in locate::collect_files(root)? {
        if std::path::absolute(&path)? == output_abs {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .expect("collected paths live under root");
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        names.push(name);
    }

    Ok(manifest_order(names))
}

/// Order archive entry names per the container layout invariant.
pub fn manifest_order(names: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut content_types = Vec::new();
    let mut rels = Vec::new();
    let mut rest = Vec::new();

    let mut sorted = names;
    sorted.sort();

    for name in sorted {
        if !seen.insert(name.clone()) {
            continue;
        }
        if name == "[Content_Types].xml" {
            content_types.push(name);
        } else if name.starts_with("_rels/") {
            rels.push(name);
        } else {
            rest.push(name);
        }
    }

    let mut ordered = content_types;
    ordered.extend(rels);
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_first_then_root_rels() {
        let names = vec![
            "xl/workbook.xml".to_string(),
            "_rels/.rels".to_string(),
            "[Content_Types].xml".to_string(),
            "docProps/core.xml".to_string(),
            "xl/_rels/workbook.xml.rels".to_string(),
        ];
        let ordered = manifest_order(names);
        assert_eq!(ordered[0], "[Content_Types].xml");
        assert_eq!(ordered[1], "_rels/.rels");
        // Remaining entries are lexicographic; nested _rels stay in place.
        assert_eq!(
            &ordered[2..],
            &[
                "docProps/core.xml".to_string(),
                "xl/_rels/workbook.xml.rels".to_string(),
                "xl/workbook.xml".to_string(),
            ]
        );
    }

    #[test]
    fn duplicate_names_are_dropped() {
        let names = vec![
            "xl/workbook.xml".to_string(),
            "xl/workbook.xml".to_string(),
        ];
        assert_eq!(manifest_order(names).len(), 1);
    }

    #[test]
    fn directory_input_is_borrowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = unpack(dir.path()).unwrap();
        assert!(!tree.is_temporary());
        tree.cleanup().unwrap();
        tree.cleanup().unwrap();
        assert!(dir.path().exists());
    }

    #[test]
    fn missing_input_is_invalid() {
        let err = unpack(Path::new("/nonexistent/book.xlsm")).unwrap_err();
        assert!(matches!(err, Error::InvalidContainer(_)));
    }
}
