use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The engine could not be reached or returned a transient failure.
    /// The orchestration layer retries this kind with backoff.
    #[error("Engine unavailable ({0}): {1}")]
    Unavailable(&'static str, String),
    /// The input is not supported by or is incompatible with the engine
    /// (e.g. image input to a text-only engine).
    #[error("Unsupported by {0}: {1}")]
    Unsupported(&'static str, String),
    /// The engine produced output the library does not recognize.
    #[error("Invariant from {0}: {1}")]
    Invariant(&'static str, String),
    /// The engine refused to process the input.
    #[error("Refusal: {0}")]
    Refusal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
