//! Обучение модели на таблице сигналов

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{targets_to_inputs_mapping, ForecastModel, Regression};
use crate::params::{PredictionParams, TrainingParams};
use crate::preprocessing::{make_datasets, preprocess_dataframes, split_data};
use crate::types::Table;

/// Ошибки (MSE) в нормализованном пространстве; `None` для пустых выборок
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train_loss: Option<f64>,
    pub val_loss: Option<f64>,
    pub test_loss: Option<f64>,
    pub train_windows: usize,
    pub val_windows: usize,
    pub test_windows: usize,
}

/// Результат обучения
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// `None`, если в обучающей выборке не нашлось ни одного окна
    pub model: Option<ForecastModel>,
    pub prediction_parameters: PredictionParams,
    pub metrics: TrainingMetrics,
}

impl TrainingOutcome {
    /// Сохраняет `model.json` и `prediction_parameters.json` в каталог
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        if let Some(model) = &self.model {
            model.save(dir.join("model.json"))?;
        }
        std::fs::write(
            dir.join("prediction_parameters.json"),
            self.prediction_parameters.to_json()?,
        )?;
        Ok(())
    }
}

pub fn run_training(params: &TrainingParams, table: &Table) -> Result<TrainingOutcome> {
    tracing::info!(
        "Training '{}' on {} rows: input_width={}, target_width={}",
        params.architecture,
        table.len(),
        params.input_width,
        params.target_width
    );

    let (train_df, val_df, test_df) = split_data(&params.split, table)?;
    let preprocessed = preprocess_dataframes(&params.schema(), &train_df, &val_df, &test_df)?;
    let prediction_parameters = PredictionParams::new(params, preprocessed.coefficients.clone());

    let (mut train, val, test) = make_datasets(
        &preprocessed.columns,
        &preprocessed.train,
        &preprocessed.val,
        &preprocessed.test,
        &params.window_params(),
    )?;
    if let Some(seed) = params.seed {
        train = train.with_seed(seed);
    }

    let mut metrics = TrainingMetrics {
        train_windows: train.len(),
        val_windows: val.len(),
        test_windows: test.len(),
        ..TrainingMetrics::default()
    };

    let regression = Regression::from_architecture(&params.architecture, params.alpha)?;
    if train.is_empty() {
        tracing::warn!("Training dataset is empty, skipping fitting");
        return Ok(TrainingOutcome {
            model: None,
            prediction_parameters,
            metrics,
        });
    }

    let mut model = ForecastModel::new(regression, train.input_shape(), train.target_shape());
    if params.residual {
        let mapping = targets_to_inputs_mapping(
            &preprocessed.columns.input,
            preprocessed.columns.effective_target(),
        )?;
        model = model.with_residual(mapping)?;
    }
    model.fit(&train)?;

    metrics.train_loss = model.evaluate(&train)?;
    metrics.val_loss = model.evaluate(&val)?;
    metrics.test_loss = model.evaluate(&test)?;
    tracing::info!(
        "Training finished: train_loss={:?}, val_loss={:?}, test_loss={:?}",
        metrics.train_loss,
        metrics.val_loss,
        metrics.test_loss
    );

    Ok(TrainingOutcome {
        model: Some(model),
        prediction_parameters,
        metrics,
    })
}
