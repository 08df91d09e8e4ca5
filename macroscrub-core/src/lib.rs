//! Core library for cleaning wrapper-protected macro-enabled workbooks.
//!
//! The pipeline unpacks an OOXML container, strips workbook/sheet
//! protection, neutralizes the VBA project password, removes wrapper-tool
//! fingerprints, extracts and deobfuscates macro source, and rebuilds a
//! valid container.

pub mod carve;
pub mod clean;
pub mod config;
pub mod container;
pub mod error;
pub mod inject;
pub mod pipeline;
pub mod rename;
pub mod report;
pub mod vba;

pub use config::ScrubConfig;
pub use error::Error;
pub use pipeline::{Pipeline, PipelineError, RunOptions};
pub use report::ScrubReport;
pub use vba::{MacroModule, ModuleKind};
