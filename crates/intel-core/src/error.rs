use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A Bar/Series/Snapshot invariant was violated. Fatal to the call;
    /// never silently repaired.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough samples for the requested metric when the caller demands
    /// a scalar answer. Indicator warm-ups surface as undefined values, not
    /// as this error.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A port could not supply data for the requested range.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Fusion weights, thresholds, or cost parameters are inconsistent.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Cooperative cancellation was observed; partial results may accompany.
    #[error("canceled")]
    Canceled,
}
