//! Pipeline error types.
//!
//! All pipeline components surface errors through [`PipelineError`].  Each
//! variant carries enough context for callers to decide how to handle the
//! failure.

use crate::lang::Language;

/// Alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Unified error type for the translation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // -- Content errors ------------------------------------------------------
    /// The content failed length, forbidden-pattern, or structural checks.
    ///
    /// Carries every violation found, not just the first, so clients can
    /// report all of them in one round trip.
    #[error("invalid content: {}", reasons.join("; "))]
    InvalidContent { reasons: Vec<String> },

    // -- Translator errors ---------------------------------------------------
    /// A single target failed after exhausting retries.
    #[error("translation to {target} failed: {reason}")]
    TranslationFailed { target: Language, reason: String },

    /// The translation service could not be reached at all.
    #[error("translator unavailable: {reason}")]
    TranslatorUnavailable { reason: String },

    /// The translator response could not be parsed into the expected shape.
    #[error("translator response parse error: {reason}")]
    TranslatorParseFailed { reason: String },

    /// The API key is missing for an adapter that requires one.
    #[error("missing translator api key")]
    MissingApiKey,

    // -- Orchestration errors ------------------------------------------------
    /// The message to translate does not exist in the repository.
    #[error("message not found: {message_id}")]
    MessageNotFound { message_id: String },

    /// The backing message repository failed; the run is aborted so a
    /// future retry can make progress.
    #[error("message repository error: {reason}")]
    Repository { reason: String },
}
