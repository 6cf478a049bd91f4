//! Error types for the conversion pipeline.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Every way a single pipeline run can fail.
///
/// All variants are terminal for the run in progress. `RoutingFailed` is only
/// produced after the outcome has been decided and never replaces it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("File does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("File is not readable: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("HL7 file is empty: {}", .0.display())]
    EmptyMessage(PathBuf),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("No base64 PDF data found in HL7 message")]
    NoPayload,

    #[error("Failed to decode base64 PDF: {0}")]
    DecodeFailed(String),

    #[error("Failed to write {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to convert PDF to JPEG: {0}")]
    RasterizeFailed(String),

    #[error("img2dcm failed: {0}")]
    EncodeFailed(String),

    #[error("Failed to move {} to {}: {source}", path.display(), destination.display())]
    RoutingFailed {
        path: PathBuf,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    /// Short machine-friendly name, used in diagnostic records.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "NotFound",
            PipelineError::Unreadable { .. } => "Unreadable",
            PipelineError::EmptyMessage(_) => "EmptyMessage",
            PipelineError::MissingFields(_) => "MissingFields",
            PipelineError::NoPayload => "NoPayload",
            PipelineError::DecodeFailed(_) => "DecodeFailed",
            PipelineError::ArtifactWrite { .. } => "ArtifactWrite",
            PipelineError::RasterizeFailed(_) => "RasterizeFailed",
            PipelineError::EncodeFailed(_) => "EncodeFailed",
            PipelineError::RoutingFailed { .. } => "RoutingFailed",
        }
    }
}

/// Non-fatal conditions noticed while reading a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadWarning {
    /// The file size never settled within the wait bound; processing went ahead.
    StillWriting { waited: Duration },
}

impl std::fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadWarning::StillWriting { waited } => {
                write!(f, "file may still be writing after {:?}", waited)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
