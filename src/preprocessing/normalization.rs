//! Нормализация данных: обратимые преобразования колонок
//!
//! Коэффициенты считаются только по обучающей выборке, сохраняются вместе с
//! моделью и без изменений применяются при прогнозировании.

use std::collections::{BTreeMap, HashMap};

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::preprocessing::schema::{ColumnSpec, Schema};
use crate::types::{Table, Value};

/// Разброс ниже этого порога считается нулевым
const MIN_SPREAD: f64 = 1e-10;

/// Суффикс колонки для значений, не встреченных при обучении
pub const UNKNOWN_LEVEL: &str = "unknown";

/// Коэффициенты преобразования одной колонки.
/// В JSON: `{"min", "max"}`, `{"mean", "std"}` или `{"values"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coefficients {
    MinMax { min: f64, max: f64 },
    MeanStd { mean: f64, std: f64 },
    Categorical { values: Vec<String> },
}

impl Coefficients {
    /// Нулевой разброс (в том числе из сохраненных коэффициентов) считается
    /// единичным
    fn spread(spread: f64) -> f64 {
        if spread.abs() < MIN_SPREAD {
            1.0
        } else {
            spread
        }
    }

    /// Прямое преобразование числового значения
    pub fn normalize(&self, x: f64) -> f64 {
        match self {
            Coefficients::MinMax { min, max } => (x - min) / Self::spread(max - min),
            Coefficients::MeanStd { mean, std } => (x - mean) / Self::spread(*std),
            Coefficients::Categorical { .. } => x,
        }
    }

    /// Обратное преобразование числового значения
    pub fn denormalize(&self, x: f64) -> f64 {
        match self {
            Coefficients::MinMax { min, max } => x * Self::spread(max - min) + min,
            Coefficients::MeanStd { mean, std } => x * Self::spread(*std) + mean,
            Coefficients::Categorical { .. } => x,
        }
    }

    /// Имена колонок, в которые кодируется исходная колонка
    pub fn encoded_columns(&self, column: &str) -> Vec<String> {
        match self {
            Coefficients::Categorical { values } => values
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(UNKNOWN_LEVEL))
                .map(|level| format!("{}_{}", column, level))
                .collect(),
            _ => vec![column.to_string()],
        }
    }
}

/// Коэффициенты всех колонок; сохраняются вместе с моделью
pub type NormalizationCoefficients = BTreeMap<String, Coefficients>;

/// Имена закодированных колонок для списка исходных колонок
pub fn column_names<S: AsRef<str>>(
    coefficients: &NormalizationCoefficients,
    columns: &[S],
) -> Vec<String> {
    columns
        .iter()
        .flat_map(|column| match coefficients.get(column.as_ref()) {
            Some(coeffs) => coeffs.encoded_columns(column.as_ref()),
            None => vec![column.as_ref().to_string()],
        })
        .collect()
}

/// Роли закодированных колонок: входы модели и цели
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnRoles {
    pub input: Vec<String>,
    pub target: Vec<String>,
}

impl ColumnRoles {
    /// Цели; при пустом списке совпадают со входами
    pub fn effective_target(&self) -> &[String] {
        if self.target.is_empty() {
            &self.input
        } else {
            &self.target
        }
    }
}

/// Результат обучения и применения преобразований ко всем выборкам
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub train: Table,
    pub val: Table,
    pub test: Table,
    pub coefficients: NormalizationCoefficients,
    pub columns: ColumnRoles,
}

enum Transform {
    MinMax,
    OneHot,
    MeanStd,
}

fn select_transform(spec: &ColumnSpec) -> Result<Transform> {
    if spec.min.is_some() || spec.max.is_some() {
        Ok(Transform::MinMax)
    } else if spec.categorical {
        Ok(Transform::OneHot)
    } else if spec.field_type.is_numeric() {
        Ok(Transform::MeanStd)
    } else if spec.field_type.is_string() {
        Ok(Transform::OneHot)
    } else {
        Err(ForecastError::UnmatchedTransform {
            column: spec.name.clone(),
            field_type: spec.field_type.to_string(),
        })
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let values = finite(values);
    if values.is_empty() {
        return (0.0, 1.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 1.0);
    }

    // Выборочное стандартное отклонение
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();

    // Избегаем деления на ноль
    if std < MIN_SPREAD {
        (mean, 1.0)
    } else {
        (mean, std)
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let values = finite(values);
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}

/// Уровни в порядке первого появления
fn observed_levels(values: &[Value]) -> Vec<String> {
    let mut levels: Vec<String> = Vec::new();
    for level in values.iter().filter_map(Value::level) {
        if !levels.contains(&level) {
            levels.push(level);
        }
    }
    levels
}

fn fit_column(spec: &ColumnSpec, train: &Table) -> Result<Coefficients> {
    let coefficients = match select_transform(spec)? {
        Transform::MinMax => {
            let observed = if spec.min.is_none() || spec.max.is_none() {
                min_max(&train.numeric_column(&spec.name)?)
            } else {
                None
            };
            let (observed_min, observed_max) = observed.unwrap_or((0.0, 1.0));
            Coefficients::MinMax {
                min: spec.min.unwrap_or(observed_min),
                max: spec.max.unwrap_or(observed_max),
            }
        }
        Transform::MeanStd => {
            let (mean, std) = mean_std(&train.numeric_column(&spec.name)?);
            Coefficients::MeanStd { mean, std }
        }
        Transform::OneHot => Coefficients::Categorical {
            values: observed_levels(train.column(&spec.name)?),
        },
    };
    tracing::debug!("Column '{}': {:?}", spec.name, coefficients);
    Ok(coefficients)
}

/// Считает коэффициенты всех колонок схемы только по обучающей выборке
pub fn fit_coefficients(schema: &Schema, train: &Table) -> Result<NormalizationCoefficients> {
    if train.is_empty() {
        tracing::warn!("Training split is empty, using neutral normalization coefficients");
    }
    schema
        .columns()
        .iter()
        .map(|spec| Ok((spec.name.clone(), fit_column(spec, train)?)))
        .collect()
}

fn one_hot_encoding(mut table: Table, column: &str, values: &[String]) -> Result<Table> {
    let original = table.drop_column(column)?;
    let levels: Vec<Option<String>> = original.iter().map(Value::level).collect();
    let indicator = |hit: bool| Value::Number(if hit { 1.0 } else { 0.0 });

    for value in values {
        let encoded = levels
            .iter()
            .map(|level| indicator(level.as_deref() == Some(value.as_str())))
            .collect();
        table.push_column(format!("{}_{}", column, value), encoded)?;
    }

    let unknown = levels
        .iter()
        .map(|level| indicator(!matches!(level, Some(l) if values.contains(l))))
        .collect();
    table.push_column(format!("{}_{}", column, UNKNOWN_LEVEL), unknown)?;

    Ok(table)
}

/// Применяет коэффициенты к одной колонке. Используется и при обучении, и
/// при прогнозировании, поэтому результат совпадает в обоих случаях.
fn transform_column(mut table: Table, column: &str, coefficients: &Coefficients) -> Result<Table> {
    match coefficients {
        Coefficients::Categorical { values } => one_hot_encoding(table, column, values),
        numeric => {
            let normalized = table
                .numeric_column(column)?
                .into_iter()
                .map(|x| Value::Number(numeric.normalize(x)))
                .collect();
            table.set_column(column, normalized)?;
            Ok(table)
        }
    }
}

/// Обучает преобразования на train и применяет их ко всем трем выборкам.
///
/// Возвращает преобразованные выборки, коэффициенты (их нужно сохранить) и
/// списки входных и целевых колонок после кодирования.
pub fn preprocess_dataframes(
    schema: &Schema,
    train: &Table,
    val: &Table,
    test: &Table,
) -> Result<Preprocessed> {
    let coefficients = fit_coefficients(schema, train)?;

    let mut train = train.clone();
    let mut val = val.clone();
    let mut test = test.clone();
    let mut columns = ColumnRoles::default();

    for spec in schema.columns() {
        let coeffs = &coefficients[&spec.name];
        train = transform_column(train, &spec.name, coeffs)?;
        val = transform_column(val, &spec.name, coeffs)?;
        test = transform_column(test, &spec.name, coeffs)?;
        if spec.input {
            columns.input.extend(coeffs.encoded_columns(&spec.name));
        }
    }
    // Цели идут в объявленном порядке, а не в порядке схемы: по нему
    // выход модели раскладывается обратно на сигналы
    columns.target = column_names(&coefficients, schema.target_names());

    tracing::info!(
        "Preprocessed {} columns: {} input features, {} target features",
        schema.columns().len(),
        columns.input.len(),
        columns.target.len()
    );

    Ok(Preprocessed {
        train,
        val,
        test,
        coefficients,
        columns,
    })
}

/// Применяет сохраненные коэффициенты к новой таблице. Колонки без
/// коэффициентов остаются без изменений.
pub fn preprocess_using_coefficients(
    coefficients: &NormalizationCoefficients,
    table: &Table,
) -> Result<Table> {
    let mut result = table.clone();
    for column in table.column_names() {
        if let Some(coeffs) = coefficients.get(&column) {
            result = transform_column(result, &column, coeffs)?;
        }
    }
    Ok(result)
}

/// Индекс первого максимума; NaN пропускаются
fn argmax<I: IntoIterator<Item = f64>>(values: I) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.into_iter().enumerate() {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            None if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Восстанавливает значения одного сигнала из выхода модели.
///
/// `sample` имеет форму `[time, feature]`, `indices` сопоставляет имени
/// закодированной колонки ее позицию по оси признаков.
pub fn decode_column(
    column: &str,
    coefficients: Option<&Coefficients>,
    sample: ArrayView2<f64>,
    indices: &HashMap<String, usize>,
) -> Result<Vec<Value>> {
    let coefficients =
        coefficients.ok_or_else(|| ForecastError::SignalMapping(column.to_string()))?;

    let position = |name: &str| {
        indices
            .get(name)
            .copied()
            .filter(|&idx| idx < sample.ncols())
            .ok_or_else(|| ForecastError::SignalMapping(name.to_string()))
    };

    match coefficients {
        Coefficients::Categorical { values } => {
            let positions = coefficients
                .encoded_columns(column)
                .iter()
                .map(|name| position(name))
                .collect::<Result<Vec<usize>>>()?;

            Ok(sample
                .rows()
                .into_iter()
                .map(|row| {
                    let level = argmax(positions.iter().map(|&p| row[p]))
                        .and_then(|i| values.get(i))
                        .map(String::as_str)
                        .unwrap_or(UNKNOWN_LEVEL);
                    Value::Text(level.to_string())
                })
                .collect())
        }
        numeric => {
            let idx = position(column)?;
            Ok(sample
                .column(idx)
                .iter()
                .map(|&x| Value::Number(numeric.denormalize(x)))
                .collect())
        }
    }
}
