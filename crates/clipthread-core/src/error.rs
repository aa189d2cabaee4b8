use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipthreadError {
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("{what} timed out after {seconds} seconds")]
    Timeout { what: String, seconds: u64 },

    #[error("Remote processing failed for {name}: state {state}")]
    ProcessingFailed { name: String, state: String },

    #[error("Generation request failed: {reason}")]
    GenerationError { reason: String },

    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Segmentation failed for chapter {chapter}: {stderr}")]
    SegmentationError { chapter: usize, stderr: String },

    #[error("Probe failed for {path}: {reason}")]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("Analysis failed for chapter {chapter}: {source}")]
    ChapterAnalysisFailed {
        chapter: usize,
        #[source]
        source: Box<ClipthreadError>,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClipthreadError>;
