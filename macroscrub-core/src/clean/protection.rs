//! Workbook/sheet protection removal and VBA password neutralization

use super::CleanSummary;
use crate::container::{WorkingTree, locate};
use crate::error::Error;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::Cursor;

/// Protection elements removed when they are direct children of a part's
/// root element (spreadsheetml `workbookProtection` / `sheetProtection`).
const PROTECTION_ELEMENTS: [&[u8]; 2] = [b"workbookProtection", b"sheetProtection"];

/// Ordered literal substitutions applied to the VBA project binary.
///
/// Each replacement renames the key to an invalid spelling of the same
/// shape, so the host treats the project as unprotected without any other
/// stream offset moving. The table is append-only; ordering is
/// longest-key-first and quoted-before-bare so that no pair can match
/// inside the output of an earlier one (`OEMPassword` is consumed before
/// `Password` ever matches).
const PASSWORD_MARKERS: &[(&[u8], &[u8])] = &[
    (b"DPB=\"", b"DPX=\""),
    (b"DPB=", b"DPX="),
    (b"DPb=\"", b"DPx=\""),
    (b"DPb=", b"DPx="),
    (b"DPC=\"", b"DPX=\""),
    (b"DPC=", b"DPX="),
    (b"DPc=\"", b"DPx=\""),
    (b"DPc=", b"DPx="),
    (b"CMG=\"", b"CMX=\""),
    (b"CMG=", b"CMX="),
    (b"CMg=\"", b"CMx=\""),
    (b"CMg=", b"CMx="),
    (b"OEMPassword=\"", b"OEMPassworX=\""),
    (b"Password=\"", b"PassworX=\""),
];

/// Remove workbook- and sheet-level protection elements from every XML part.
///
/// Parts are rewritten only when at least one element was removed; malformed
/// parts are reported per-part unless `strict` is set.
pub fn strip_sheet_and_workbook_protection(
    tree: &WorkingTree,
    strict: bool,
) -> Result<CleanSummary, Error> {
    let mut summary = CleanSummary::default();

    for path in locate::collect_files(tree.root())? {
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        let part = path
            .strip_prefix(tree.root())
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(&path)?;
        match remove_protection_elements(&content) {
            Ok(Some(cleaned)) => {
                fs::write(&path, cleaned)?;
                summary.parts_changed.push(part);
            }
            Ok(None) => summary.parts_unchanged += 1,
            Err(e) => {
                if strict {
                    return Err(Error::Xml {
                        part,
                        reason: e.to_string(),
                    });
                }
                summary.parts_failed.push((part, e.to_string()));
            }
        }
    }

    Ok(summary)
}

/// Rewrite one XML document without its protection elements.
///
/// Returns `Ok(None)` when nothing was removed so callers can leave the
/// original bytes untouched.
fn remove_protection_elements(xml: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    // Number of currently open elements; a Start seen at depth 1 is a
    // direct child of the document root.
    let mut depth = 0usize;
    let mut removed = 0usize;
    let mut skip_from: Option<usize> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if skip_from.is_none() && depth == 1 && is_protection_element(e.name().local_name().as_ref()) {
                    skip_from = Some(depth);
                    removed += 1;
                } else if skip_from.is_none() {
                    writer.write_event(Event::Start(e))?;
                }
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                if skip_from.is_some() {
                    // Inside a removed subtree
                } else if depth == 1 && is_protection_element(e.name().local_name().as_ref()) {
                    removed += 1;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                if skip_from == Some(depth) {
                    skip_from = None;
                } else if skip_from.is_none() {
                    writer.write_event(Event::End(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(event) => {
                if skip_from.is_none() {
                    writer.write_event(event)?;
                }
            }
            Err(e) => return Err(e),
        }
        buf.clear();
    }

    if removed == 0 {
        return Ok(None);
    }
    let bytes = writer.into_inner().into_inner();
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

fn is_protection_element(local_name: &[u8]) -> bool {
    PROTECTION_ELEMENTS.iter().any(|e| *e == local_name)
}

/// Neutralize the password markers inside the VBA project binary stream.
///
/// Returns `false` when no project stream exists or no marker matched; the
/// file is rewritten only when a substitution was applied.
pub fn strip_vba_project_password(tree: &WorkingTree) -> Result<bool, Error> {
    let Some(path) = locate::find_file_ci(tree.root(), "vbaproject.bin") else {
        return Ok(false);
    };

    let data = fs::read(&path)?;
    match patch_password_markers(&data) {
        Some(patched) => {
            fs::write(&path, patched)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Apply the marker table to a byte buffer. Returns `None` when no marker
/// matched.
pub fn patch_password_markers(data: &[u8]) -> Option<Vec<u8>> {
    let mut current = data.to_vec();
    let mut changed = false;

    for (from, to) in PASSWORD_MARKERS {
        if let Some(replaced) = replace_bytes(&current, from, to) {
            current = replaced;
            changed = true;
        }
    }

    changed.then_some(current)
}

/// Replace every occurrence of `from` with `to`. Returns `None` when `from`
/// does not occur.
fn replace_bytes(data: &[u8], from: &[u8], to: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut matched = false;
    let mut i = 0;

    while i < data.len() {
        if data[i..].starts_with(from) {
            out.extend_from_slice(to);
            i += from.len();
            matched = true;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }

    matched.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_nonempty_password_value() {
        let data = b"ID=\"{X}\"\r\nPassword=\"ABCD1234\"\r\nVisibilityState=\"0\"\r\n";
        let patched = patch_password_markers(data).expect("marker should match");
        assert!(!contains(&patched, b"Password=\""));
        assert!(contains(&patched, b"PassworX=\"ABCD1234\""));
    }

    #[test]
    fn oem_password_is_not_contaminated() {
        let data = b"OEMPassword=\"abc\"\r\nPassword=\"xyz\"\r\n";
        let patched = patch_password_markers(data).unwrap();
        assert!(contains(&patched, b"OEMPassworX=\"abc\""));
        assert!(contains(&patched, b"PassworX=\"xyz\""));
        assert!(!contains(&patched, b"Password=\""));
    }

    #[test]
    fn project_stream_keys_are_renamed() {
        let data = b"CMG=\"AABB\"\r\nDPB=\"CCDD\"\r\nGC=\"EEFF\"\r\n";
        let patched = patch_password_markers(data).unwrap();
        assert!(contains(&patched, b"CMX=\"AABB\""));
        assert!(contains(&patched, b"DPX=\"CCDD\""));
        // Untouched key survives byte-for-byte.
        assert!(contains(&patched, b"GC=\"EEFF\""));
    }

    #[test]
    fn unmatched_buffer_reports_no_change() {
        assert!(patch_password_markers(b"nothing to see here").is_none());
    }

    #[test]
    fn patching_is_idempotent() {
        let data = b"DPB=\"CCDD\"\r\nPassword=\"s3cret\"\r\n";
        let once = patch_password_markers(data).unwrap();
        assert!(patch_password_markers(&once).is_none());
    }

    #[test]
    fn removes_direct_child_protection_only() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><workbookProtection workbookPassword="CAFE"/><sheets><sheet name="Hoja1" sheetId="1"/></sheets><outer><sheetProtection sheet="1"/></outer></workbook>"#;
        let cleaned = remove_protection_elements(xml).unwrap().unwrap();
        assert!(!cleaned.contains("workbookProtection"));
        // Deeper element is not a direct child of the root and stays.
        assert!(cleaned.contains("sheetProtection"));
        assert!(cleaned.contains(r#"<sheet name="Hoja1" sheetId="1"/>"#));
    }

    #[test]
    fn removes_protection_with_namespace_prefix() {
        let xml = r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:sheetProtection password="ABCD" sheet="1"/><x:sheetData/></x:worksheet>"#;
        let cleaned = remove_protection_elements(xml).unwrap().unwrap();
        assert!(!cleaned.contains("sheetProtection"));
        assert!(cleaned.contains("<x:sheetData/>"));
    }

    #[test]
    fn removes_nonempty_protection_subtree() {
        let xml = r#"<worksheet><sheetProtection sheet="1"><legacy/></sheetProtection><sheetData/></worksheet>"#;
        let cleaned = remove_protection_elements(xml).unwrap().unwrap();
        assert!(!cleaned.contains("sheetProtection"));
        assert!(!cleaned.contains("legacy"));
        assert!(cleaned.contains("<sheetData/>"));
    }

    #[test]
    fn unprotected_part_is_left_alone() {
        let xml = r#"<worksheet><sheetData/></worksheet>"#;
        assert!(remove_protection_elements(xml).unwrap().is_none());
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }
}
