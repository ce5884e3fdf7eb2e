//! Параметры обучения и прогнозирования

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::preprocessing::normalization::{column_names, NormalizationCoefficients};
use crate::preprocessing::schema::{prepare_signals, EntitySignal, Schema, Signal, SignalDeclaration};
use crate::preprocessing::split::SplitFractions;
use crate::preprocessing::windowing::WindowParams;

fn default_architecture() -> String {
    "ridge".to_string()
}

fn default_alpha() -> f64 {
    1.0
}

fn default_batch_size() -> usize {
    32
}

/// Интервал агрегации вида `500ms`, `30s`, `10m`, `1h`, `1d`, `1w` в миллисекундах
pub fn parse_interval(interval: &str) -> Result<u64> {
    let invalid = || ForecastError::InvalidInterval(interval.to_string());
    let trimmed = interval.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (number, unit) = trimmed.split_at(split);
    let number: u64 = number.parse().map_err(|_| invalid())?;

    let multiplier = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(invalid()),
    };
    Ok(number * multiplier)
}

/// Параметры одного запуска обучения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    #[serde(default = "default_architecture")]
    pub architecture: String,
    /// Коэффициент регуляризации для `ridge`
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Предсказывать разницу с последним входным шагом
    #[serde(default)]
    pub residual: bool,
    #[serde(default)]
    pub index: Option<String>,
    pub input_signals: Vec<Signal>,
    /// Пустой список - авторегрессионная модель
    #[serde(default)]
    pub target_signals: Vec<Signal>,
    #[serde(default)]
    pub split: SplitFractions,
    #[serde(default)]
    pub ts_field: Option<String>,
    /// Интервал агрегации в миллисекундах
    #[serde(default)]
    pub interval: Option<u64>,
    pub input_width: usize,
    pub target_width: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TrainingParams {
    pub fn new(input_signals: Vec<Signal>, target_signals: Vec<Signal>, input_width: usize, target_width: usize) -> Self {
        Self {
            architecture: default_architecture(),
            alpha: default_alpha(),
            residual: false,
            index: None,
            input_signals,
            target_signals,
            split: SplitFractions::default(),
            ts_field: None,
            interval: None,
            input_width,
            target_width,
            offset: 0,
            batch_size: default_batch_size(),
            shuffle: false,
            seed: None,
        }
    }

    /// Целевые сигналы; без них цели совпадают со входами
    pub fn effective_target_signals(&self) -> &[Signal] {
        if self.target_signals.is_empty() {
            &self.input_signals
        } else {
            &self.target_signals
        }
    }

    pub fn schema(&self) -> Schema {
        Schema::merged(&self.input_signals, &self.target_signals)
    }

    pub fn window_params(&self) -> WindowParams {
        WindowParams {
            input_width: self.input_width,
            target_width: self.target_width,
            offset: self.offset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Параметры прогнозирования; сохраняются рядом с моделью
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionParams {
    pub architecture: String,
    #[serde(default)]
    pub index: Option<String>,
    pub input_signals: Vec<Signal>,
    #[serde(default)]
    pub target_signals: Vec<Signal>,
    #[serde(default)]
    pub ts_field: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub normalization_coefficients: NormalizationCoefficients,
    /// Количество шагов, по которым строится прогноз
    pub input_width: usize,
    /// Количество предсказываемых шагов
    pub target_width: usize,
}

impl PredictionParams {
    pub fn new(training: &TrainingParams, normalization_coefficients: NormalizationCoefficients) -> Self {
        Self {
            architecture: training.architecture.clone(),
            index: training.index.clone(),
            input_signals: training.input_signals.clone(),
            target_signals: training.target_signals.clone(),
            ts_field: training.ts_field.clone(),
            interval: training.interval,
            normalization_coefficients,
            input_width: training.input_width,
            target_width: training.target_width,
        }
    }

    pub fn effective_target_signals(&self) -> &[Signal] {
        if self.target_signals.is_empty() {
            &self.input_signals
        } else {
            &self.target_signals
        }
    }

    /// Исходные колонки входных сигналов
    pub fn input_signal_columns(&self) -> Vec<String> {
        self.input_signals.iter().map(Signal::column).collect()
    }

    /// Исходные колонки целевых сигналов в объявленном порядке
    pub fn target_signal_columns(&self) -> Vec<String> {
        self.effective_target_signals().iter().map(Signal::column).collect()
    }

    /// Закодированные входные колонки
    pub fn input_columns(&self) -> Vec<String> {
        column_names(&self.normalization_coefficients, &self.input_signal_columns())
    }

    /// Закодированные целевые колонки
    pub fn target_columns(&self) -> Vec<String> {
        column_names(&self.normalization_coefficients, &self.target_signal_columns())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Параметры задания в том виде, в каком их задает пользователь
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParameters {
    #[serde(default)]
    pub index: Option<String>,
    pub input_signals: Vec<SignalDeclaration>,
    #[serde(default)]
    pub target_signals: Vec<SignalDeclaration>,
    /// Метаданные сигналов набора: cid -> {type, field}
    pub entities: HashMap<String, EntitySignal>,
    /// Интервал агрегации; пустая строка - без агрегации
    #[serde(default)]
    pub aggregation: String,
    #[serde(default)]
    pub ts_field: Option<String>,
    pub input_width: usize,
    pub target_width: usize,
    #[serde(default)]
    pub split: Option<SplitFractions>,
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub residual: bool,
}

impl JobParameters {
    pub fn is_aggregated(&self) -> bool {
        !self.aggregation.trim().is_empty()
    }
}

/// Параметры обучения по умолчанию для задания
pub fn prepare_training_params(job: &JobParameters) -> Result<TrainingParams> {
    let aggregated = job.is_aggregated();
    let input_signals = prepare_signals(&job.input_signals, &job.entities, aggregated)?;
    let target_signals = prepare_signals(&job.target_signals, &job.entities, aggregated)?;

    let mut params = TrainingParams::new(input_signals, target_signals, job.input_width, job.target_width);
    params.architecture = job.architecture.clone();
    params.alpha = job.alpha;
    params.residual = job.residual;
    params.index = job.index.clone();
    params.ts_field = job.ts_field.clone();
    if let Some(split) = job.split {
        params.split = split;
    }
    if aggregated {
        params.interval = Some(parse_interval(&job.aggregation)?);
    }
    Ok(params)
}
