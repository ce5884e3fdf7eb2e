/// Модели прогнозирования поверх оконных наборов данных

pub mod linear;
pub mod residual;
pub mod ridge;

use std::path::Path;

use ndarray::{concatenate, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::preprocessing::WindowedDataset;

pub use linear::LeastSquares;
pub use residual::targets_to_inputs_mapping;
pub use ridge::Ridge;

/// Регрессия на развернутых окнах: `[samples, features] -> [samples, outputs]`
pub trait Regressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()>;
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "architecture", rename_all = "lowercase")]
pub enum Regression {
    Ridge(Ridge),
    Linear(LeastSquares),
}

impl Regression {
    /// Модель по имени архитектуры
    pub fn from_architecture(architecture: &str, alpha: f64) -> Result<Self> {
        match architecture {
            "ridge" => Ok(Regression::Ridge(Ridge::new(alpha))),
            "linear" => Ok(Regression::Linear(LeastSquares::new())),
            other => Err(ForecastError::UnknownArchitecture(other.to_string())),
        }
    }

    fn regressor(&self) -> &dyn Regressor {
        match self {
            Regression::Ridge(model) => model,
            Regression::Linear(model) => model,
        }
    }

    fn regressor_mut(&mut self) -> &mut dyn Regressor {
        match self {
            Regression::Ridge(model) => model,
            Regression::Linear(model) => model,
        }
    }
}

/// Обученная модель: принимает `[batch, input_width, n_in]`, возвращает
/// `[batch, target_width, n_target]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastModel {
    regression: Regression,
    input_shape: (usize, usize),
    target_shape: (usize, usize),
    #[serde(default, skip_serializing_if = "Option::is_none")]
    residual: Option<Vec<usize>>,
    #[serde(default)]
    is_trained: bool,
}

fn flatten(array: &Array3<f64>) -> Result<Array2<f64>> {
    let (batch, steps, features) = array.dim();
    array
        .as_standard_layout()
        .into_owned()
        .into_shape((batch, steps * features))
        .map_err(|e| ForecastError::Shape(e.to_string()))
}

impl ForecastModel {
    pub fn new(
        regression: Regression,
        input_shape: (usize, usize),
        target_shape: (usize, usize),
    ) -> Self {
        Self {
            regression,
            input_shape,
            target_shape,
            residual: None,
            is_trained: false,
        }
    }

    /// Включает остаточное соединение с заданным отображением целей во входы
    pub fn with_residual(mut self, mapping: Vec<usize>) -> Result<Self> {
        if mapping.len() != self.target_shape.1 {
            return Err(ForecastError::Shape(format!(
                "residual mapping has {} entries, model has {} targets",
                mapping.len(),
                self.target_shape.1
            )));
        }
        if let Some(&idx) = mapping.iter().find(|&&idx| idx >= self.input_shape.1) {
            return Err(ForecastError::Shape(format!(
                "residual mapping index {} out of {} inputs",
                idx, self.input_shape.1
            )));
        }
        self.residual = Some(mapping);
        Ok(self)
    }

    pub fn input_shape(&self) -> (usize, usize) {
        self.input_shape
    }

    pub fn target_shape(&self) -> (usize, usize) {
        self.target_shape
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    fn check_input(&self, dataset_shape: (usize, usize)) -> Result<()> {
        if dataset_shape != self.input_shape {
            return Err(ForecastError::Shape(format!(
                "model expects inputs {:?}, dataset has {:?}",
                self.input_shape, dataset_shape
            )));
        }
        Ok(())
    }

    fn baseline(&self, inputs: &Array3<f64>) -> Option<Array3<f64>> {
        self.residual
            .as_ref()
            .map(|mapping| residual::last_step_baseline(inputs, mapping, self.target_shape.0))
    }

    /// Обучение на всех окнах набора, батч за батчем
    pub fn fit(&mut self, dataset: &WindowedDataset) -> Result<()> {
        self.check_input(dataset.input_shape())?;
        if dataset.target_shape() != self.target_shape {
            return Err(ForecastError::Shape(format!(
                "model expects targets {:?}, dataset has {:?}",
                self.target_shape,
                dataset.target_shape()
            )));
        }

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (inputs, mut targets) in dataset.batches() {
            if let Some(baseline) = self.baseline(&inputs) {
                targets -= &baseline;
            }
            xs.push(flatten(&inputs)?);
            ys.push(flatten(&targets)?);
        }
        if xs.is_empty() {
            return Err(ForecastError::Model("Empty dataset".to_string()));
        }

        let x_views: Vec<_> = xs.iter().map(|x| x.view()).collect();
        let y_views: Vec<_> = ys.iter().map(|y| y.view()).collect();
        let x = concatenate(Axis(0), &x_views).map_err(|e| ForecastError::Shape(e.to_string()))?;
        let y = concatenate(Axis(0), &y_views).map_err(|e| ForecastError::Shape(e.to_string()))?;

        self.regression.regressor_mut().fit(&x, &y)?;
        self.is_trained = true;
        tracing::info!("Model trained on {} windows", x.nrows());
        Ok(())
    }

    /// Прогноз для одного батча входов
    pub fn predict_batch(&self, inputs: &Array3<f64>) -> Result<Array3<f64>> {
        if !self.is_trained {
            return Err(ForecastError::NotTrained);
        }
        let (batch, steps, features) = inputs.dim();
        self.check_input((steps, features))?;

        let (target_width, n_target) = self.target_shape;
        let flat = self.regression.regressor().predict(&flatten(inputs)?)?;
        let mut output = flat
            .into_shape((batch, target_width, n_target))
            .map_err(|e| ForecastError::Shape(e.to_string()))?;
        if let Some(baseline) = self.baseline(inputs) {
            output += &baseline;
        }
        Ok(output)
    }

    /// Прогноз для всех окон набора в порядке батчей
    pub fn predict(&self, dataset: &WindowedDataset) -> Result<Array3<f64>> {
        self.check_input(dataset.input_shape())?;
        let outputs = dataset
            .batches()
            .map(|(inputs, _)| self.predict_batch(&inputs))
            .collect::<Result<Vec<_>>>()?;

        if outputs.is_empty() {
            let (target_width, n_target) = self.target_shape;
            return Ok(Array3::zeros((0, target_width, n_target)));
        }
        let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| ForecastError::Shape(e.to_string()))
    }

    /// Среднеквадратичная ошибка; `None` для пустого набора
    pub fn evaluate(&self, dataset: &WindowedDataset) -> Result<Option<f64>> {
        if dataset.is_empty() {
            return Ok(None);
        }
        let mut sum = 0.0;
        let mut count = 0usize;
        for (inputs, targets) in dataset.batches() {
            let predicted = self.predict_batch(&inputs)?;
            sum += (&predicted - &targets).mapv(|d| d * d).sum();
            count += targets.len();
        }
        Ok(Some(if count == 0 { 0.0 } else { sum / count as f64 }))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
