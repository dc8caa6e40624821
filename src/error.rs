use thiserror::Error;

/// Failure to obtain the course document. Fatal: the only recovery is a reload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("fetch course document from {location}: {message}")]
    Transport { location: String, message: String },
    #[error("course document request to {location} returned status {status}")]
    Status { location: String, status: u16 },
    #[error("parse course document: {0}")]
    Parse(String),
    #[error("invalid course document: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("render surface is empty ({width}x{height})")]
    EmptySurface { width: u32, height: u32 },
    #[error("no visible nodes to export")]
    NothingVisible,
    #[error("encode image: {0}")]
    Encode(String),
    #[error("write export: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("share is not available on this platform")]
    Unavailable,
    #[error("share was rejected: {0}")]
    Rejected(String),
    #[error("copy to clipboard: {0}")]
    Clipboard(String),
}
