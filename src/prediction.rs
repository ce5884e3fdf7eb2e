//! Прогнозирование обученной моделью и обратное преобразование результатов

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array3, ArrayView2, Axis};

use crate::error::{ForecastError, Result};
use crate::loader::{DataLoader, TimeRange};
use crate::models::ForecastModel;
use crate::params::PredictionParams;
use crate::preprocessing::normalization::{
    column_names, decode_column, preprocess_using_coefficients, NormalizationCoefficients,
};
use crate::preprocessing::WindowGenerator;
use crate::types::Table;

/// Позиции закодированных целевых колонок по оси признаков выхода модели
pub fn get_column_indices<S: AsRef<str>>(
    coefficients: &NormalizationCoefficients,
    target_columns: &[S],
) -> HashMap<String, usize> {
    column_names(coefficients, target_columns)
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, i))
        .collect()
}

fn postprocess_sample<S: AsRef<str>>(
    sample: ArrayView2<f64>,
    target_columns: &[S],
    coefficients: &NormalizationCoefficients,
    column_indices: &HashMap<String, usize>,
) -> Result<Table> {
    let mut table = Table::new();
    for column in target_columns {
        let column = column.as_ref();
        let values = decode_column(column, coefficients.get(column), sample, column_indices)?;
        table.push_column(column, values)?;
    }
    Ok(table)
}

/// Восстанавливает значения целевых сигналов из выхода модели
/// `[sample, time, feature]`: по таблице на образец, колонки - целевые
/// сигналы в объявленном порядке.
pub fn postprocess<S: AsRef<str>>(
    coefficients: &NormalizationCoefficients,
    target_columns: &[S],
    output: &Array3<f64>,
) -> Result<Vec<Table>> {
    if let Some(missing) = target_columns
        .iter()
        .find(|c| !coefficients.contains_key(c.as_ref()))
    {
        return Err(ForecastError::SignalMapping(missing.as_ref().to_string()));
    }

    let column_indices = get_column_indices(coefficients, target_columns);
    let features = output.len_of(Axis(2));
    if features != column_indices.len() {
        return Err(ForecastError::Shape(format!(
            "model output has {} features, targets need {}",
            features,
            column_indices.len()
        )));
    }

    output
        .outer_iter()
        .map(|sample| postprocess_sample(sample, target_columns, coefficients, &column_indices))
        .collect()
}

/// Прогноз для каждого окна таблицы. Таблица содержит исходные
/// (ненормализованные) значения сигналов.
pub fn run_prediction(
    params: &PredictionParams,
    model: &ForecastModel,
    table: &Table,
) -> Result<Vec<Table>> {
    let processed = preprocess_using_coefficients(&params.normalization_coefficients, table)?;
    let window = WindowGenerator::for_inference(
        processed.column_names(),
        &params.input_columns(),
        params.input_width,
    )?;
    let dataset = window.make_dataset(&processed)?;
    if dataset.is_empty() {
        tracing::warn!(
            "Not enough data for prediction: {} rows, input_width={}",
            table.len(),
            params.input_width
        );
        return Ok(Vec::new());
    }

    tracing::info!("Computing predictions for {} windows", dataset.len());
    let predicted = model.predict(&dataset)?;
    postprocess(
        &params.normalization_coefficients,
        &params.target_signal_columns(),
        &predicted,
    )
}

/// Загружает последние `input_width` строк, модель из файла и строит прогноз
pub fn load_and_predict(
    params: &PredictionParams,
    model_path: impl AsRef<Path>,
    loader: &dyn DataLoader,
    range: &TimeRange,
) -> Result<Vec<Table>> {
    tracing::info!("Loading data...");
    let table = match loader.load(&params.input_signals, range) {
        Ok(table) => table,
        Err(ForecastError::NoData) => {
            tracing::error!("No data in the defined time range, can't continue.");
            return Err(ForecastError::NoData);
        }
        Err(e) => return Err(e),
    };

    tracing::info!("Loading model...");
    let model = ForecastModel::load(model_path)?;
    run_prediction(params, &model, &table.tail(params.input_width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::normalization::Coefficients;
    use crate::types::Value;

    fn coefficients() -> NormalizationCoefficients {
        let mut coefficients = NormalizationCoefficients::new();
        coefficients.insert("temp".to_string(), Coefficients::MeanStd { mean: 20.0, std: 2.0 });
        coefficients.insert("level".to_string(), Coefficients::MinMax { min: 0.0, max: 50.0 });
        coefficients.insert(
            "status".to_string(),
            Coefficients::Categorical {
                values: vec!["ok".to_string(), "fail".to_string()],
            },
        );
        coefficients
    }

    #[test]
    fn test_postprocess_denormalizes_each_sample() {
        // Признаки: temp, status_ok, status_fail, status_unknown, level
        let output = Array3::from_shape_vec(
            (2, 1, 5),
            vec![
                1.0, 0.9, 0.1, 0.0, 0.5, //
                -0.5, 0.0, 0.2, 0.7, 1.0,
            ],
        )
        .unwrap();
        let tables = postprocess(&coefficients(), &["temp", "status", "level"], &output).unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].column_names(), vec!["temp", "status", "level"]);
        assert_eq!(
            tables[0].to_rows()[0],
            vec![Value::Number(22.0), Value::from("ok"), Value::Number(25.0)]
        );
        assert_eq!(
            tables[1].to_rows()[0],
            vec![Value::Number(19.0), Value::from("unknown"), Value::Number(50.0)]
        );
    }

    #[test]
    fn test_postprocess_missing_coefficients() {
        let output = Array3::zeros((1, 1, 1));
        let err = postprocess(&coefficients(), &["pressure"], &output).unwrap_err();
        assert!(matches!(err, ForecastError::SignalMapping(ref c) if c == "pressure"));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_postprocess_shape_mismatch() {
        let output = Array3::zeros((1, 1, 2));
        assert!(matches!(
            postprocess(&coefficients(), &["status"], &output),
            Err(ForecastError::Shape(_))
        ));
    }

    #[test]
    fn test_postprocess_empty_output() {
        let output = Array3::zeros((0, 2, 1));
        assert!(postprocess(&coefficients(), &["temp"], &output).unwrap().is_empty());
    }
}
