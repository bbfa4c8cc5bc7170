use std::fmt;

use crate::data::fits::FitsError;
use crate::data::mat::MatError;
use crate::render::RenderError;

/// Result alias carrying the pipeline's classified [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

// ---------------------------------------------------------------------------
// Classified failures
// ---------------------------------------------------------------------------

/// Every way a pipeline run can fail, reduced to the four outcomes a caller
/// is allowed to see.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No known sub-format decodes the container.
    #[error("File is corrupted or not in a known container format: {0}")]
    CorruptFile(String),

    /// Recognized format and filename length, unimplemented subtype.
    #[error("Unsupported capture variant: {0}")]
    UnsupportedVariant(String),

    /// Extension or filename length matches no known encoding.
    #[error("Unrecognized format: {0}")]
    UnrecognizedFormat(String),

    /// Chart construction failed. The cause stays attached for logging but is
    /// not part of the message.
    #[error("Error while creating plot")]
    RenderFailure(#[source] RenderError),
}

impl GraphError {
    pub fn status(&self) -> Status {
        match self {
            GraphError::CorruptFile(_) => Status::CorruptFile,
            GraphError::UnsupportedVariant(_) => Status::UnsupportedVariant,
            GraphError::UnrecognizedFormat(_) => Status::UnrecognizedFormat,
            GraphError::RenderFailure(_) => Status::RenderFailure,
        }
    }
}

impl From<MatError> for GraphError {
    fn from(err: MatError) -> Self {
        GraphError::CorruptFile(err.to_string())
    }
}

impl From<FitsError> for GraphError {
    fn from(err: FitsError) -> Self {
        GraphError::CorruptFile(err.to_string())
    }
}

impl From<RenderError> for GraphError {
    fn from(err: RenderError) -> Self {
        GraphError::RenderFailure(err)
    }
}

// ---------------------------------------------------------------------------
// Status – the outcome reported to the caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Status {
    Success,
    CorruptFile,
    UnsupportedVariant,
    RenderFailure,
    UnrecognizedFormat,
}

impl Status {
    /// HTTP status the serving layer answers with for this outcome.
    pub fn http_code(self) -> u16 {
        match self {
            Status::Success => 200,
            Status::CorruptFile | Status::UnsupportedVariant | Status::RenderFailure => 400,
            Status::UnrecognizedFormat => 404,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "success",
            Status::CorruptFile => "corrupt-file",
            Status::UnsupportedVariant => "unsupported-variant",
            Status::RenderFailure => "render-failure",
            Status::UnrecognizedFormat => "unrecognized-format",
        };
        f.write_str(name)
    }
}
