//! Error taxonomy for container operations

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Input is neither a valid archive nor an existing directory
    #[error("not a valid container archive or unpacked directory: {0}")]
    InvalidContainer(PathBuf),

    /// An archive entry resolves outside the extraction root
    #[error("archive entry escapes the extraction root: {entry}")]
    PathEscape { entry: String },

    /// Writing the output archive failed; no partial output remains
    #[error("failed to rebuild container archive")]
    Rebuild {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An XML part failed to parse (fatal only in strict mode)
    #[error("failed to parse XML part {part}: {reason}")]
    Xml { part: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}
