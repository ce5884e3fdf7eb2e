//! Остаточное соединение: модель предсказывает разницу с последним входом

use ndarray::{Array3, Axis};

use crate::error::{ForecastError, Result};

/// Для каждой целевой колонки - ее индекс среди входных колонок.
/// Цели должны быть подмножеством входов.
pub fn targets_to_inputs_mapping(
    input_columns: &[String],
    target_columns: &[String],
) -> Result<Vec<usize>> {
    target_columns
        .iter()
        .map(|target| {
            input_columns
                .iter()
                .position(|input| input == target)
                .ok_or_else(|| ForecastError::ResidualMapping(target.clone()))
        })
        .collect()
}

/// Значения последнего входного шага, разложенные на `target_width` шагов:
/// `[batch, target_width, mapping.len()]`
pub fn last_step_baseline(inputs: &Array3<f64>, mapping: &[usize], target_width: usize) -> Array3<f64> {
    let batch = inputs.len_of(Axis(0));
    let last = inputs.len_of(Axis(1)).saturating_sub(1);
    let mut baseline = Array3::zeros((batch, target_width, mapping.len()));
    for b in 0..batch {
        for t in 0..target_width {
            for (j, &input_idx) in mapping.iter().enumerate() {
                baseline[[b, t, j]] = inputs[[b, last, input_idx]];
            }
        }
    }
    baseline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mapping() {
        let mapping =
            targets_to_inputs_mapping(&names(&["a", "b", "c"]), &names(&["c", "a"])).unwrap();
        assert_eq!(mapping, vec![2, 0]);

        let err = targets_to_inputs_mapping(&names(&["a"]), &names(&["z"])).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_baseline_repeats_last_step() {
        let inputs = Array3::from_shape_fn((1, 2, 3), |(_, t, f)| (t * 10 + f) as f64);
        let baseline = last_step_baseline(&inputs, &[2, 0], 2);
        assert_eq!(baseline.shape(), &[1, 2, 2]);
        assert_eq!(baseline[[0, 0, 0]], 12.0);
        assert_eq!(baseline[[0, 1, 1]], 10.0);
    }
}
