//! Разделение таблицы на train/val/test без перемешивания

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::types::Table;

/// Доли обучающей, валидационной и тестовой выборок.
/// Тестовая доля может быть опущена: тогда это остаток.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitFractions {
    pub train: f64,
    #[serde(default)]
    pub val: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<f64>,
}

impl SplitFractions {
    pub fn new(train: f64, val: f64, test: f64) -> Self {
        Self {
            train,
            val,
            test: Some(test),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let test = self.test.unwrap_or(0.0);
        let all = [self.train, self.val, test];
        if all.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(ForecastError::InvalidSplit(format!(
                "fractions must be non-negative, got {:?}",
                all
            )));
        }
        let sum: f64 = all.iter().sum();
        let expected_sum_ok = match self.test {
            Some(_) => (sum - 1.0).abs() < 1e-6,
            None => sum <= 1.0 + 1e-6,
        };
        if !expected_sum_ok {
            return Err(ForecastError::InvalidSplit(format!(
                "fractions must sum up to 1, got {}",
                sum
            )));
        }
        Ok(())
    }

    /// Размеры выборок для `n` строк. Ошибка округления уходит в test.
    pub fn sizes(&self, n: usize) -> (usize, usize, usize) {
        let train = ((n as f64 * self.train).floor() as usize).min(n);
        let val = ((n as f64 * self.val).floor() as usize).min(n - train);
        (train, val, n - train - val)
    }
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self::new(0.7, 0.0, 0.3)
    }
}

/// Три непрерывных непересекающихся куска таблицы в исходном порядке
pub fn split_data(fractions: &SplitFractions, table: &Table) -> Result<(Table, Table, Table)> {
    fractions.validate()?;
    let (train_size, val_size, test_size) = fractions.sizes(table.len());
    tracing::debug!(
        "Split {} rows into train={}, val={}, test={}",
        table.len(),
        train_size,
        val_size,
        test_size
    );

    Ok((
        table.slice(0..train_size),
        table.slice(train_size..train_size + val_size),
        table.slice(train_size + val_size..table.len()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn numbered(n: usize) -> Table {
        Table::from_rows(
            vec!["x".to_string()],
            (0..n).map(|i| vec![Value::Number(i as f64)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_sizes_use_floor_and_cover_all_rows() {
        let fractions = [
            SplitFractions::new(0.7, 0.0, 0.3),
            SplitFractions::new(0.6, 0.2, 0.2),
            SplitFractions::new(0.34, 0.33, 0.33),
            SplitFractions::new(1.0, 0.0, 0.0),
            SplitFractions::new(0.0, 0.0, 1.0),
        ];
        for f in fractions {
            for n in 0..50 {
                let (train, val, test) = f.sizes(n);
                assert_eq!(train, (n as f64 * f.train).floor() as usize);
                assert_eq!(val, (n as f64 * f.val).floor() as usize);
                assert_eq!(train + val + test, n);
            }
        }
    }

    #[test]
    fn test_split_is_contiguous_and_ordered() {
        let table = numbered(10);
        let (train, val, test) = split_data(&SplitFractions::new(0.6, 0.2, 0.2), &table).unwrap();
        assert_eq!((train.len(), val.len(), test.len()), (6, 2, 2));

        let mut all = Vec::new();
        for part in [&train, &val, &test] {
            all.extend(part.numeric_column("x").unwrap());
        }
        let expected: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_empty_splits_are_allowed() {
        let table = numbered(3);
        let (train, val, test) = split_data(&SplitFractions::new(0.7, 0.0, 0.3), &table).unwrap();
        assert_eq!(train.len(), 2);
        assert!(val.is_empty());
        assert_eq!(test.len(), 1);

        let (train, val, test) = split_data(&SplitFractions::default(), &numbered(0)).unwrap();
        assert!(train.is_empty() && val.is_empty() && test.is_empty());
    }

    #[test]
    fn test_invalid_fractions() {
        assert!(SplitFractions::new(-0.1, 0.5, 0.6).validate().is_err());
        assert!(SplitFractions::new(0.5, 0.2, 0.2).validate().is_err());
        let implicit_test = SplitFractions {
            train: 0.8,
            val: 0.1,
            test: None,
        };
        assert!(implicit_test.validate().is_ok());
        assert_eq!(implicit_test.sizes(10), (8, 1, 1));
    }
}
