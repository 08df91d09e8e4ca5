//! Run summary assembled by the pipeline and rendered by callers

use crate::clean::CleanSummary;
use crate::rename::RenameEntry;
use crate::vba::ModuleKind;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lightweight integrity probe of the unpacked tree
#[derive(Debug, Default, Clone, Serialize)]
pub struct StructureCheck {
    /// `xl/workbook.xml` is present
    pub has_workbook_part: bool,
    /// A VBA project stream is present somewhere in the tree
    pub has_vba_project: bool,
}

/// One extracted module, as listed in the report
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub module_name: String,
    pub kind: ModuleKind,
    pub export_path: Option<PathBuf>,
}

/// Everything one pipeline run did, as a value
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScrubReport {
    pub input: PathBuf,
    pub working_dir: PathBuf,
    pub output: Option<PathBuf>,
    pub structure: StructureCheck,
    pub clean: CleanSummary,
    pub vba_password_patched: bool,
    pub wrapper_traces_removed: bool,
    pub modules: Vec<ModuleSummary>,
    pub renames: Vec<RenameEntry>,
    pub annotated_lines: usize,
    pub relabeled_routines: usize,
    pub warnings: Vec<String>,
}

impl ScrubReport {
    /// Write the plain-text report file. The format is informative, not a
    /// compatibility contract.
    pub fn write_text(&self, path: &Path) -> std::io::Result<()> {
        let mut out = std::fs::File::create(path)?;

        writeln!(out, "CLEANUP AND DEOBFUSCATION REPORT")?;
        writeln!(out, "Input: {}", self.input.display())?;
        writeln!(out, "Working directory: {}", self.working_dir.display())?;
        if let Some(output) = &self.output {
            writeln!(out, "Rebuilt container: {}", output.display())?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "Workbook part present: {}",
            yes_no(self.structure.has_workbook_part)
        )?;
        writeln!(
            out,
            "VBA project present: {}",
            yes_no(self.structure.has_vba_project)
        )?;
        writeln!(
            out,
            "VBA password neutralized: {}",
            yes_no(self.vba_password_patched)
        )?;
        writeln!(
            out,
            "Wrapper traces removed: {}",
            yes_no(self.wrapper_traces_removed)
        )?;
        writeln!(out)?;

        writeln!(out, "XML parts rewritten: {}", self.clean.parts_changed.len())?;
        for part in &self.clean.parts_changed {
            writeln!(out, "  - {part}")?;
        }
        for (part, reason) in &self.clean.parts_failed {
            writeln!(out, "  ! {part}: {reason}")?;
        }
        writeln!(out)?;

        writeln!(out, "Macro modules: {}", self.modules.len())?;
        for module in &self.modules {
            match &module.export_path {
                Some(path) => writeln!(
                    out,
                    "  - {} ({}) -> {}",
                    module.module_name,
                    module.kind,
                    path.display()
                )?,
                None => writeln!(out, "  - {} ({})", module.module_name, module.kind)?,
            }
        }
        writeln!(out)?;

        writeln!(out, "Identifiers renamed: {}", self.renames.len())?;
        for entry in &self.renames {
            writeln!(out, "  - {} -> {}", entry.original, entry.replacement)?;
        }
        writeln!(out, "Lines flagged: {}", self.annotated_lines)?;
        writeln!(out, "Routines relabeled: {}", self.relabeled_routines)?;

        if !self.warnings.is_empty() {
            writeln!(out)?;
            writeln!(out, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(out, "  ! {warning}")?;
            }
        }

        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_report_lists_the_working_directory() {
        let report = ScrubReport {
            input: PathBuf::from("book.xlsm"),
            working_dir: PathBuf::from("/tmp/macroscrub-xyz"),
            warnings: vec!["something minor".to_string()],
            ..ScrubReport::default()
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        report.write_text(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Working directory: /tmp/macroscrub-xyz"));
        assert!(text.contains("something minor"));
    }
}
