//! Ridge Regression с несколькими выходами

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::models::Regressor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ridge {
    alpha: f64,
    weights: Option<Array2<f64>>,
    bias: Option<Array1<f64>>,
}

impl Ridge {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            weights: None,
            bias: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn solve_linear_system(A: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
        // Метод Гаусса с выбором главного элемента
        let n = A.nrows();
        let mut augmented = Array2::zeros((n, n + 1));

        for i in 0..n {
            for j in 0..n {
                augmented[[i, j]] = A[[i, j]];
            }
            augmented[[i, n]] = b[i];
        }

        // Прямой ход
        for i in 0..n {
            let mut max_row = i;
            let mut max_val = augmented[[i, i]].abs();
            for k in (i + 1)..n {
                if augmented[[k, i]].abs() > max_val {
                    max_val = augmented[[k, i]].abs();
                    max_row = k;
                }
            }

            if max_row != i {
                for j in 0..=n {
                    augmented.swap([i, j], [max_row, j]);
                }
            }

            let pivot = augmented[[i, i]];
            if pivot.abs() < 1e-10 {
                return Err(ForecastError::Model("Singular matrix".to_string()));
            }

            for k in (i + 1)..n {
                let factor = augmented[[k, i]] / pivot;
                for j in i..=n {
                    augmented[[k, j]] -= factor * augmented[[i, j]];
                }
            }
        }

        // Обратный ход
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut sum = augmented[[i, n]];
            for j in (i + 1)..n {
                sum -= augmented[[i, j]] * x[j];
            }
            x[i] = sum / augmented[[i, i]];
        }

        Ok(x)
    }
}

impl Regressor for Ridge {
    fn fit(&mut self, X: &Array2<f64>, Y: &Array2<f64>) -> Result<()> {
        let n_samples = X.nrows();
        let n_features = X.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(ForecastError::Model("Empty dataset".to_string()));
        }

        // Центрирование, чтобы bias не штрафовался
        let x_mean = X.mean_axis(Axis(0)).ok_or(ForecastError::NotTrained)?;
        let y_mean = Y.mean_axis(Axis(0)).ok_or(ForecastError::NotTrained)?;
        let Xc = X - &x_mean;
        let Yc = Y - &y_mean;

        // (X^T X + αI)
        let mut xtx = Xc.t().dot(&Xc);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha;
        }

        let xty = Xc.t().dot(&Yc);
        let mut weights = Array2::zeros((n_features, Y.ncols()));
        for (j, rhs) in xty.columns().into_iter().enumerate() {
            let w = Self::solve_linear_system(&xtx, &rhs.to_owned())?;
            weights.column_mut(j).assign(&w);
        }

        self.bias = Some(&y_mean - &x_mean.dot(&weights));
        self.weights = Some(weights);
        Ok(())
    }

    fn predict(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = self.weights.as_ref().ok_or(ForecastError::NotTrained)?;
        let bias = self.bias.as_ref().ok_or(ForecastError::NotTrained)?;
        if X.ncols() != weights.nrows() {
            return Err(ForecastError::Shape(format!(
                "expected {} features, got {}",
                weights.nrows(),
                X.ncols()
            )));
        }
        Ok(X.dot(weights) + bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_recovers_linear_relation() {
        let X = arr2(&[[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 5.0], [4.0, 2.0]]);
        let Y = X.map_axis(Axis(1), |row| 2.0 * row[0] - row[1] + 3.0).insert_axis(Axis(1));

        let mut ridge = Ridge::new(1e-9);
        ridge.fit(&X, &Y).unwrap();
        let predicted = ridge.predict(&X).unwrap();
        for (p, y) in predicted.iter().zip(Y.iter()) {
            assert!((p - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_collinear_features_need_regularization() {
        let X = arr2(&[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]);
        let Y = arr2(&[[1.0], [2.0], [3.0]]);

        assert!(Ridge::new(0.0).fit(&X, &Y).is_err());
        let mut ridge = Ridge::new(0.1);
        ridge.fit(&X, &Y).unwrap();
        assert_eq!(ridge.predict(&X).unwrap().shape(), &[3, 1]);
    }

    #[test]
    fn test_predict_before_fit() {
        let ridge = Ridge::new(1.0);
        assert!(matches!(
            ridge.predict(&Array2::zeros((1, 1))),
            Err(ForecastError::NotTrained)
        ));
    }
}
