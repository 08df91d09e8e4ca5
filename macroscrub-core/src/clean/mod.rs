//! Protection stripping and wrapper-trace cleaning over an unpacked tree

pub mod protection;
pub mod traces;

use serde::Serialize;

/// Aggregated outcome of the XML protection pass.
///
/// Parts that failed to parse are collected here instead of aborting the
/// pass; strict mode turns the first failure into an error at the call site.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CleanSummary {
    /// Parts rewritten because at least one protection element was removed
    pub parts_changed: Vec<String>,
    /// Parts left byte-for-byte untouched
    pub parts_unchanged: usize,
    /// Parts skipped with their parse failure reason
    pub parts_failed: Vec<(String, String)>,
}
