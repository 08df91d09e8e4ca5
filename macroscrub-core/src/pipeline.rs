//! Pipeline orchestrator: unpack, strip, clean, extract, rename, rebuild

use crate::clean::{protection, traces};
use crate::config::ScrubConfig;
use crate::container::{self, WorkingTree};
use crate::error::Error;
use crate::inject::MacroReinjector;
use crate::rename::Renamer;
use crate::report::{ModuleSummary, ScrubReport, StructureCheck};
use crate::vba;
use std::fs;
use std::path::{Path, PathBuf};

/// A stage failure with the stage name attached
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed")]
pub struct PipelineError {
    pub stage: &'static str,
    #[source]
    pub source: Error,
}

impl PipelineError {
    fn at(stage: &'static str) -> impl FnOnce(Error) -> Self {
        move |source| Self { stage, source }
    }
}

/// Per-run destinations, all optional except the input itself
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Rebuilt container destination; `None` skips the rebuild (manual mode)
    pub output: Option<PathBuf>,
    /// Export extracted modules (and their deobfuscated copies) here
    pub export_dir: Option<PathBuf>,
    /// Write the plain-text report here
    pub report_path: Option<PathBuf>,
}

/// The whole container transformation pipeline
pub struct Pipeline {
    config: ScrubConfig,
    reinjector: Option<Box<dyn MacroReinjector>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(ScrubConfig::default())
    }

    pub fn with_config(config: ScrubConfig) -> Self {
        Self {
            config,
            reinjector: None,
        }
    }

    /// Attach a host-automation reinjector. Reinjection failures degrade to
    /// report warnings; the pipeline itself never fails because of them.
    pub fn with_reinjector(mut self, reinjector: Box<dyn MacroReinjector>) -> Self {
        self.reinjector = Some(reinjector);
        self
    }

    /// Run every stage over `input`. The working tree is removed on every
    /// exit path, success or failure; directory inputs are borrowed and
    /// left in place.
    pub fn run(&self, input: &Path, options: &RunOptions) -> Result<ScrubReport, PipelineError> {
        let mut tree = container::unpack(input).map_err(PipelineError::at("unpack"))?;

        let result = self.run_stages(&tree, input, options);
        let cleanup = tree.cleanup();

        let mut report = result?;
        if let Err(e) = cleanup {
            report
                .warnings
                .push(format!("could not remove the working directory: {e}"));
        }
        Ok(report)
    }

    fn run_stages(
        &self,
        tree: &WorkingTree,
        input: &Path,
        options: &RunOptions,
    ) -> Result<ScrubReport, PipelineError> {
        let mut report = ScrubReport {
            input: input.to_path_buf(),
            working_dir: tree.root().to_path_buf(),
            ..ScrubReport::default()
        };

        report.structure = StructureCheck {
            has_workbook_part: tree.root().join("xl").join("workbook.xml").is_file(),
            has_vba_project: vba::find_project_stream(tree).is_some(),
        };

        report.clean =
            protection::strip_sheet_and_workbook_protection(tree, self.config.clean.strict_xml)
                .map_err(PipelineError::at("strip-protection"))?;
        report.vba_password_patched = protection::strip_vba_project_password(tree)
            .map_err(PipelineError::at("strip-vba-password"))?;
        report.wrapper_traces_removed =
            traces::remove_wrapper_traces(tree).map_err(PipelineError::at("clean-traces"))?;

        let scan = vba::extract_macros(tree, options.export_dir.as_deref());
        report.warnings.extend(scan.warnings);
        report.modules = scan
            .modules
            .iter()
            .map(|m| ModuleSummary {
                module_name: m.module_name.clone(),
                kind: m.kind,
                export_path: m.export_path.clone(),
            })
            .collect();

        if !scan.modules.is_empty() && self.any_rename_pass_enabled() {
            let renamer = Renamer::new(self.config.rename.clone());
            let outcome = renamer.rename_modules(&scan.modules);
            report.renames = outcome.entries;
            report.annotated_lines = outcome.annotated_lines;
            report.relabeled_routines = outcome.relabeled_routines;

            if let Some(export_dir) = &options.export_dir {
                let deobfuscated_dir = export_dir.join("deobfuscated");
                for module in &outcome.modules {
                    if let Err(e) = write_deobfuscated(&deobfuscated_dir, module) {
                        report
                            .warnings
                            .push(format!("could not export {}: {e}", module.filename));
                    }
                }
            }
        }

        if let Some(output) = &options.output {
            container::rebuild(tree, output).map_err(PipelineError::at("rebuild"))?;
            report.output = Some(output.clone());

            if let Some(reinjector) = &self.reinjector {
                if !scan.modules.is_empty() {
                    let (ok, message) = reinjector.reinject(output, &scan.modules);
                    if !ok {
                        report.warnings.push(format!("reinjection skipped: {message}"));
                    }
                }
            }
        }

        if let Some(report_path) = &options.report_path {
            report
                .write_text(report_path)
                .map_err(|e| PipelineError::at("report")(Error::Io(e)))?;
        }

        Ok(report)
    }

    fn any_rename_pass_enabled(&self) -> bool {
        let rename = &self.config.rename;
        rename.rename_identifiers || rename.annotate_lines || rename.relabel_routines
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn write_deobfuscated(dir: &Path, module: &crate::rename::RenamedModule) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    // Module filenames come from the binary stream; keep them inside `dir`.
    let filename: String = module
        .filename
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    fs::write(dir.join(filename), module.code.as_bytes())
}
