//! Ошибки конвейера прогнозирования

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Unsupported signal type: {0}")]
    UnsupportedSignalType(String),

    #[error("Unknown signal '{0}': no entity metadata")]
    UnknownSignal(String),

    #[error("Invalid {bound} bound '{value}' for signal '{signal}'")]
    InvalidBound {
        signal: String,
        bound: &'static str,
        value: String,
    },

    #[error("Invalid split fractions: {0}")]
    InvalidSplit(String),

    #[error("No preprocessing rule for column '{column}' of type '{field_type}'")]
    UnmatchedTransform { column: String, field_type: String },

    #[error("Unknown target signal '{0}'")]
    SignalMapping(String),

    #[error("Unknown network architecture: '{0}'")]
    UnknownArchitecture(String),

    #[error("Invalid aggregation interval: '{0}'")]
    InvalidInterval(String),

    #[error("Target column '{0}' is not among the input columns")]
    ResidualMapping(String),

    #[error("No data in the defined time range")]
    NoData,

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("Column '{column}' is not numeric (row {row})")]
    NonNumeric { column: String, row: usize },

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Model not trained")]
    NotTrained,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    /// Ошибки конфигурации фатальны и не повторяются
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ForecastError::UnsupportedSignalType(_)
                | ForecastError::UnknownSignal(_)
                | ForecastError::InvalidBound { .. }
                | ForecastError::InvalidSplit(_)
                | ForecastError::UnmatchedTransform { .. }
                | ForecastError::SignalMapping(_)
                | ForecastError::UnknownArchitecture(_)
                | ForecastError::InvalidInterval(_)
                | ForecastError::ResidualMapping(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
