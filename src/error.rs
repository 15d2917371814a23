use thiserror::Error;

/// Errors raised before or instead of numeric work.
///
/// Everything that is recoverable at the data level (silent range bins,
/// unresolved Doppler folds, missing MUSIC peaks) is reported through
/// [`crate::target::Condition`] instead.
#[derive(Debug, Error)]
pub enum RadarError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("frame codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, RadarError>;

pub(crate) fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(RadarError::InvalidInput(msg.into()))
}
