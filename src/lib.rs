//! Signal Forecast - прогнозирование временных рядов сигналов на окнах

pub mod api;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod params;
pub mod prediction;
pub mod preprocessing;
pub mod training;
pub mod types;

pub use error::{ForecastError, Result};
pub use types::*;
pub use models::{ForecastModel, Regression, Regressor};
pub use preprocessing::*;

// Re-export для удобства
pub use params::{prepare_training_params, JobParameters, PredictionParams, TrainingParams};
pub use prediction::{load_and_predict, postprocess, run_prediction};
pub use training::{run_training, TrainingMetrics, TrainingOutcome};
