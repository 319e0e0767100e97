use thiserror::Error;

/// Errors returned by the detector and its building blocks.
///
/// All variants are local and synchronous; nothing here is retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Rejected configuration (construction time).
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Input data that cannot be used for fitting (empty, non-finite, or
    /// incompatible with the configured architecture).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Scoring was requested before a successful `fit`.
    #[error("detector is not fitted; call `fit` first")]
    NotFitted,

    /// Column count disagrees with the feature count recorded at fit time.
    #[error("shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Training produced a non-finite loss.
    #[error("training diverged at epoch {epoch}: loss = {loss}")]
    Diverged { epoch: usize, loss: f32 },
}

pub type Result<T> = std::result::Result<T, Error>;
