use thiserror::Error;

/// Failure taxonomy for one summarization request.
///
/// Stages keep their documented fallbacks to themselves; whatever reaches the
/// coordinator unhandled becomes a single `error` event with the matching
/// `kind()` tag.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request body was unusable before any network call was made.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Remote fetch failed (network error, timeout, non-success status or an
    /// oversized body) and no DOM snapshot could stand in for it.
    #[error("could not fetch remote content: {0}")]
    FetchFailed(String),

    /// Extraction produced zero paragraphs from every available source.
    #[error("no main content could be extracted from the page")]
    ExtractionEmpty,

    /// The embedding or completion provider returned a failure; the detail is
    /// surfaced verbatim.
    #[error("provider error: {0}")]
    Provider(String),

    /// The model's structured reply did not survive validation.
    #[error("model returned a malformed structured reply: {0}")]
    MalformedModelOutput(String),

    /// The embedding store itself failed (sled or codec fault).
    #[error("embedding store error: {0}")]
    Store(String),

    /// The caller went away mid-request. Never turned into an event; the
    /// stream is already gone.
    #[error("request cancelled by the caller")]
    Cancelled,
}

impl PipelineError {
    /// Stable machine-readable tag for logs and event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::FetchFailed(_) => "fetch_failed",
            PipelineError::ExtractionEmpty => "extraction_empty",
            PipelineError::Provider(_) => "provider_error",
            PipelineError::MalformedModelOutput(_) => "malformed_model_output",
            PipelineError::Store(_) => "store_error",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

impl From<sled::Error> for PipelineError {
    fn from(err: sled::Error) -> Self {
        PipelineError::Store(err.to_string())
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::Store(err.to_string())
    }
}
