//! Wrapper-tool fingerprint removal from container metadata

use crate::container::WorkingTree;
use crate::error::Error;
use std::fs;

/// Fingerprint left in custom document properties by the wrapper tool.
const WRAPPER_FINGERPRINT: &str = "XLtoEXE";

/// Neutral replacement; must never contain the fingerprint itself.
const NEUTRAL_MARK: &str = "CleanWorkbook";

/// Rewrite wrapper-tool fingerprints in `docProps/custom.xml`.
///
/// Returns `true` when the part existed and was rewritten. Absent part or
/// no occurrence is a no-op; re-running after success is a no-op too.
pub fn remove_wrapper_traces(tree: &WorkingTree) -> Result<bool, Error> {
    let custom = tree.root().join("docProps").join("custom.xml");
    if !custom.is_file() {
        return Ok(false);
    }

    let content = fs::read_to_string(&custom)?;
    if !content.contains(WRAPPER_FINGERPRINT) {
        return Ok(false);
    }

    let cleaned = content.replace(WRAPPER_FINGERPRINT, NEUTRAL_MARK);
    fs::write(&custom, cleaned)?;
    Ok(true)
}
