use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Everything that can abort a forecast request.
///
/// Row-level parse failures are not errors; they are counted in
/// [`SkipCounts`](crate::models::SkipCounts) and the row is dropped.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("missing required {role} column: none of [{aliases}] found in header")]
    Schema { role: &'static str, aliases: String },

    #[error("no usable rows: 0 of {total} rows survived parsing")]
    EmptyDataset { total: usize },

    #[error("value {value} on {date} is outside the log1p domain (must be > -1)")]
    NonPositiveValue { date: NaiveDate, value: f64 },

    #[error("model fit failed: {0}")]
    ModelFit(String),

    #[error("invalid forecast horizon {0}: must be at least 1")]
    InvalidHorizon(usize),

    #[error("invalid confidence level {0}: must lie strictly between 0 and 1")]
    InvalidConfidence(f64),

    #[error("forecast does not continue history: expected {expected}, got {got}")]
    Continuity { expected: NaiveDate, got: NaiveDate },

    #[error("date arithmetic overflow stepping from {0}")]
    DateOverflow(NaiveDate),

    #[error("failed to read CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    /// Short stable tag used by the pipeline's `Failed` stage and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SchemaError",
            Self::EmptyDataset { .. } => "EmptyDatasetError",
            Self::NonPositiveValue { .. } => "NonPositiveValueError",
            Self::ModelFit(_) => "ModelFitError",
            Self::InvalidHorizon(_) => "InvalidHorizon",
            Self::InvalidConfidence(_) => "InvalidConfidence",
            Self::Continuity { .. } => "ContinuityError",
            Self::DateOverflow(_) => "DateOverflow",
            Self::Csv(_) | Self::Io(_) => "InputError",
        }
    }
}
