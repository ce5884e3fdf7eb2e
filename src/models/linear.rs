//! Линейная регрессия (МНК) на linfa, отдельная модель на каждый выход

use linfa::traits::Fit;
use linfa::Dataset;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::models::Regressor;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeastSquares {
    params: Option<Array2<f64>>,
    intercept: Option<Array1<f64>>,
}

impl LeastSquares {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Regressor for LeastSquares {
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ForecastError::Model("Empty dataset".to_string()));
        }

        let mut params = Array2::zeros((x.ncols(), y.ncols()));
        let mut intercept = Array1::zeros(y.ncols());

        for (j, target) in y.columns().into_iter().enumerate() {
            let dataset = Dataset::new(x.to_owned(), target.to_owned());
            let fitted = LinearRegression::new()
                .fit(&dataset)
                .map_err(|e| ForecastError::Model(e.to_string()))?;
            params.column_mut(j).assign(fitted.params());
            intercept[j] = fitted.intercept();
        }

        self.params = Some(params);
        self.intercept = Some(intercept);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.params.as_ref().ok_or(ForecastError::NotTrained)?;
        let intercept = self.intercept.as_ref().ok_or(ForecastError::NotTrained)?;
        if x.ncols() != params.nrows() {
            return Err(ForecastError::Shape(format!(
                "expected {} features, got {}",
                params.nrows(),
                x.ncols()
            )));
        }
        Ok(x.dot(params) + intercept)
    }
}
