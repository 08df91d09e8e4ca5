//! Reinjection of macro source through a host automation runtime

use crate::vba::MacroModule;
use std::path::Path;

/// Pushes macro source back into a rebuilt container through a live host
/// application instance.
///
/// The host runtime is an external capability that may simply not exist on
/// the machine running the pipeline; implementations report failure through
/// the returned pair and the pipeline downgrades it to a warning.
pub trait MacroReinjector {
    /// Returns `(success, message)`; `message` carries the reason on
    /// failure.
    fn reinject(&self, container: &Path, modules: &[MacroModule]) -> (bool, String);
}

/// Stand-in used when no automation runtime is available.
pub struct NoAutomation;

impl MacroReinjector for NoAutomation {
    fn reinject(&self, _container: &Path, _modules: &[MacroModule]) -> (bool, String) {
        (
            false,
            "host automation runtime is not available; macros were not reinserted".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_automation_reports_unavailable() {
        let (ok, message) = NoAutomation.reinject(Path::new("out.xlsm"), &[]);
        assert!(!ok);
        assert!(message.contains("not available"));
    }
}
