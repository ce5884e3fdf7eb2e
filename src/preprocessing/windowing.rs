//! Генератор окон временного ряда
//!
//! ```text
//! [ #, #, #, #, #, #, #, #, #, #, #, #, # ]
//!  | input_width | offset | target_width |
//!  |               width                 |
//! ```

use std::fmt;

use ndarray::{s, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::preprocessing::normalization::ColumnRoles;
use crate::types::Table;

/// Пара `(inputs, targets)`: `[batch, input_width, n_in]` и
/// `[batch, target_width, n_target]`
pub type Batch = (Array3<f64>, Array3<f64>);

fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowParams {
    pub input_width: usize,
    pub target_width: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub shuffle: bool,
}

impl WindowParams {
    pub fn new(input_width: usize, target_width: usize) -> Self {
        Self {
            input_width,
            target_width,
            offset: 0,
            batch_size: default_batch_size(),
            shuffle: false,
        }
    }

    /// Полная ширина окна
    pub fn width(&self) -> usize {
        self.input_width + self.offset + self.target_width
    }
}

#[derive(Debug, Clone)]
pub struct WindowGenerator {
    params: WindowParams,
    columns: Vec<String>,
    input_indices: Vec<usize>,
    target_indices: Vec<usize>,
    seed: Option<u64>,
}

fn indices_of(columns: &[String], names: &[String]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| ForecastError::MissingColumn(name.clone()))
        })
        .collect()
}

impl WindowGenerator {
    /// `columns` - колонки таблиц, из которых будут нарезаться окна.
    /// Пустой список целей означает авторегрессию.
    pub fn new(columns: Vec<String>, roles: &ColumnRoles, params: WindowParams) -> Result<Self> {
        if params.input_width == 0 {
            return Err(ForecastError::Shape("input_width must be positive".to_string()));
        }
        if params.batch_size == 0 {
            return Err(ForecastError::Shape("batch_size must be positive".to_string()));
        }

        let input_indices = indices_of(&columns, &roles.input)?;
        let target_indices = indices_of(&columns, roles.effective_target())?;

        Ok(Self {
            params,
            columns,
            input_indices,
            target_indices,
            seed: None,
        })
    }

    /// Окна только со входами, без перемешивания: для прогнозирования
    pub fn for_inference(
        columns: Vec<String>,
        input_columns: &[String],
        input_width: usize,
    ) -> Result<Self> {
        let roles = ColumnRoles {
            input: input_columns.to_vec(),
            target: Vec::new(),
        };
        Self::new(columns, &roles, WindowParams::new(input_width, 0))
    }

    /// Фиксирует порядок перемешивания
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.params.shuffle = shuffle;
        self
    }

    pub fn params(&self) -> &WindowParams {
        &self.params
    }

    pub fn width(&self) -> usize {
        self.params.width()
    }

    pub fn input_indices(&self) -> &[usize] {
        &self.input_indices
    }

    pub fn target_indices(&self) -> &[usize] {
        &self.target_indices
    }

    /// Нарезает таблицу на окна. Колонки таблицы должны совпадать с
    /// колонками генератора. Пустая таблица дает пустой набор.
    pub fn make_dataset(&self, table: &Table) -> Result<WindowedDataset> {
        let names = table.column_names();
        if names != self.columns {
            return Err(ForecastError::Shape(format!(
                "table columns {:?} differ from window columns {:?}",
                names, self.columns
            )));
        }

        if table.is_empty() {
            tracing::debug!("Empty table, no windows");
            return Ok(self.dataset(Array2::zeros((0, self.columns.len())), self.params.shuffle));
        }

        let data = table.to_array()?;
        let dataset = self.dataset(data, self.params.shuffle);
        if dataset.is_empty() {
            tracing::warn!(
                "Table has {} rows, shorter than the window width {}",
                table.len(),
                self.width()
            );
        }
        Ok(dataset)
    }

    fn dataset(&self, data: Array2<f64>, shuffle: bool) -> WindowedDataset {
        let windows = (data.nrows() + 1).saturating_sub(self.width());
        WindowedDataset {
            data,
            windows,
            input_width: self.params.input_width,
            target_start: self.params.input_width + self.params.offset,
            target_width: self.params.target_width,
            input_indices: self.input_indices.clone(),
            target_indices: self.target_indices.clone(),
            batch_size: self.params.batch_size,
            shuffle,
            seed: self.seed,
        }
    }
}

impl fmt::Display for WindowGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target_start = self.params.input_width + self.params.offset;
        writeln!(f, "Total window width: {}", self.width())?;
        writeln!(f, "Input indices: {:?}", (0..self.params.input_width).collect::<Vec<_>>())?;
        write!(
            f,
            "Target indices: {:?}",
            (target_start..target_start + self.params.target_width).collect::<Vec<_>>()
        )
    }
}

/// Конечный набор окон, который можно обходить повторно
#[derive(Debug, Clone)]
pub struct WindowedDataset {
    data: Array2<f64>,
    windows: usize,
    input_width: usize,
    target_start: usize,
    target_width: usize,
    input_indices: Vec<usize>,
    target_indices: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    seed: Option<u64>,
}

impl WindowedDataset {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Количество окон
    pub fn len(&self) -> usize {
        self.windows
    }

    pub fn is_empty(&self) -> bool {
        self.windows == 0
    }

    /// `(input_width, n_in)`
    pub fn input_shape(&self) -> (usize, usize) {
        (self.input_width, self.input_indices.len())
    }

    /// `(target_width, n_target)`
    pub fn target_shape(&self) -> (usize, usize) {
        (self.target_width, self.target_indices.len())
    }

    /// Окно `i`: входной и целевой срезы с выбранными колонками
    pub fn window(&self, i: usize) -> (Array2<f64>, Array2<f64>) {
        let inputs = self
            .data
            .slice(s![i..i + self.input_width, ..])
            .select(Axis(1), &self.input_indices);
        let start = i + self.target_start;
        let targets = self
            .data
            .slice(s![start..start + self.target_width, ..])
            .select(Axis(1), &self.target_indices);
        (inputs, targets)
    }

    fn collect(&self, order: &[usize]) -> Batch {
        let (input_width, n_in) = self.input_shape();
        let (target_width, n_target) = self.target_shape();
        let mut inputs = Array3::zeros((order.len(), input_width, n_in));
        let mut targets = Array3::zeros((order.len(), target_width, n_target));

        for (k, &i) in order.iter().enumerate() {
            let (x, y) = self.window(i);
            inputs.index_axis_mut(Axis(0), k).assign(&x);
            targets.index_axis_mut(Axis(0), k).assign(&y);
        }

        (inputs, targets)
    }

    /// Новый проход по батчам. При `shuffle` порядок окон перемешивается
    /// заново на каждом проходе (с заданным seed - одинаково).
    pub fn batches(&self) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.windows).collect();
        if self.shuffle {
            match self.seed {
                Some(seed) => order.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => order.shuffle(&mut rand::thread_rng()),
            }
        }
        Batches {
            dataset: self,
            order,
            position: 0,
        }
    }

    /// Все окна в хронологическом порядке
    pub fn to_arrays(&self) -> Batch {
        let order: Vec<usize> = (0..self.windows).collect();
        self.collect(&order)
    }
}

pub struct Batches<'a> {
    dataset: &'a WindowedDataset,
    order: Vec<usize>,
    position: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.dataset.batch_size).min(self.order.len());
        let batch = self.dataset.collect(&self.order[self.position..end]);
        self.position = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.order.len() - self.position;
        let n = remaining.div_ceil(self.dataset.batch_size);
        (n, Some(n))
    }
}

/// Наборы окон для train/val/test. Перемешивается только train.
pub fn make_datasets(
    roles: &ColumnRoles,
    train: &Table,
    val: &Table,
    test: &Table,
    params: &WindowParams,
) -> Result<(WindowedDataset, WindowedDataset, WindowedDataset)> {
    let window = WindowGenerator::new(train.column_names(), roles, params.clone())?;
    tracing::debug!("{}", window);

    let evaluation = window.clone().with_shuffle(false);
    Ok((
        window.make_dataset(train)?,
        evaluation.make_dataset(val)?,
        evaluation.make_dataset(test)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn numbered(rows: usize) -> Table {
        Table::from_rows(
            vec!["a".to_string(), "b".to_string()],
            (0..rows)
                .map(|i| vec![Value::Number(i as f64), Value::Number(100.0 + i as f64)])
                .collect(),
        )
        .unwrap()
    }

    fn roles(input: &[&str], target: &[&str]) -> ColumnRoles {
        ColumnRoles {
            input: input.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_window_count_is_rows_minus_width_plus_one() {
        let table = numbered(6);
        let window =
            WindowGenerator::new(table.column_names(), &roles(&["a", "b"], &[]), WindowParams::new(3, 1))
                .unwrap();
        let dataset = window.make_dataset(&table).unwrap();
        assert_eq!(dataset.len(), 3);

        let (inputs, targets) = dataset.to_arrays();
        assert_eq!(inputs.shape(), &[3, 3, 2]);
        assert_eq!(targets.shape(), &[3, 1, 2]);
        assert_eq!(inputs[[0, 0, 0]], 0.0);
        assert_eq!(inputs[[0, 2, 1]], 102.0);
        assert_eq!(targets[[0, 0, 0]], 3.0);
        assert_eq!(inputs[[1, 0, 0]], 1.0);
        assert_eq!(targets[[1, 0, 1]], 104.0);

        let mut params = WindowParams::new(3, 1);
        params.offset = 1;
        let window = WindowGenerator::new(table.column_names(), &roles(&["a", "b"], &[]), params)
            .unwrap();
        assert_eq!(window.make_dataset(&table).unwrap().len(), 6 - 5 + 1);
    }

    #[test]
    fn test_offset_and_column_selection() {
        let table = numbered(6);
        let mut params = WindowParams::new(2, 1);
        params.offset = 2;
        let window =
            WindowGenerator::new(table.column_names(), &roles(&["b"], &["a"]), params).unwrap();
        assert_eq!(window.width(), 5);

        let dataset = window.make_dataset(&table).unwrap();
        assert_eq!(dataset.len(), 2);
        let (x, y) = dataset.window(1);
        assert_eq!(x, ndarray::arr2(&[[101.0], [102.0]]));
        assert_eq!(y, ndarray::arr2(&[[5.0]]));
    }

    #[test]
    fn test_empty_and_short_tables() {
        let window =
            WindowGenerator::new(numbered(0).column_names(), &roles(&["a"], &["b"]), WindowParams::new(3, 1))
                .unwrap();
        let empty = window.make_dataset(&numbered(0)).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.batches().count(), 0);
        assert_eq!(empty.to_arrays().0.shape(), &[0, 3, 1]);

        assert!(window.make_dataset(&numbered(3)).unwrap().is_empty());
    }

    #[test]
    fn test_column_mismatch_is_rejected() {
        let window =
            WindowGenerator::new(vec!["a".to_string()], &roles(&["a"], &[]), WindowParams::new(1, 1))
                .unwrap();
        assert!(matches!(
            window.make_dataset(&numbered(4)),
            Err(ForecastError::Shape(_))
        ));
        assert!(matches!(
            WindowGenerator::new(vec!["a".to_string()], &roles(&["x"], &[]), WindowParams::new(1, 1)),
            Err(ForecastError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_batches_are_restartable() {
        let table = numbered(10);
        let mut params = WindowParams::new(2, 1);
        params.batch_size = 3;
        let window =
            WindowGenerator::new(table.column_names(), &roles(&["a"], &[]), params).unwrap();
        let dataset = window.make_dataset(&table).unwrap();
        assert_eq!(dataset.len(), 8);

        let sizes: Vec<usize> = dataset.batches().map(|(x, _)| x.shape()[0]).collect();
        assert_eq!(sizes, vec![3, 3, 2]);
        assert_eq!(dataset.batches().size_hint(), (3, Some(3)));

        let first: Vec<Batch> = dataset.batches().collect();
        let second: Vec<Batch> = dataset.batches().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shuffle_keeps_window_pairs() {
        let table = numbered(20);
        let mut params = WindowParams::new(2, 1);
        params.shuffle = true;
        params.batch_size = 4;
        let window = WindowGenerator::new(table.column_names(), &roles(&["a"], &[]), params)
            .unwrap()
            .with_seed(7);
        let dataset = window.make_dataset(&table).unwrap();

        let mut starts = Vec::new();
        for (x, y) in dataset.batches() {
            for k in 0..x.shape()[0] {
                let start = x[[k, 0, 0]];
                assert_eq!(x[[k, 1, 0]], start + 1.0);
                assert_eq!(y[[k, 0, 0]], start + 2.0);
                starts.push(start as usize);
            }
        }
        starts.sort_unstable();
        assert_eq!(starts, (0..18).collect::<Vec<_>>());
    }

    #[test]
    fn test_inference_windows_have_no_targets() {
        let table = numbered(4);
        let window =
            WindowGenerator::for_inference(table.column_names(), &["a".to_string()], 4).unwrap();
        let dataset = window.make_dataset(&table).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.target_shape(), (0, 1));
    }

    #[test]
    fn test_make_datasets_shuffles_only_train() {
        let table = numbered(12);
        let mut params = WindowParams::new(2, 1);
        params.shuffle = true;
        let (train, val, test) = make_datasets(
            &roles(&["a"], &[]),
            &table.slice(0..8),
            &table.slice(8..8),
            &table.slice(8..12),
            &params,
        )
        .unwrap();
        assert_eq!(train.len(), 6);
        assert!(val.is_empty());
        assert_eq!(test.len(), 2);
        let (x, _) = test.batches().next().unwrap();
        assert_eq!(x[[0, 0, 0]], 8.0);
        assert_eq!(x[[1, 0, 0]], 9.0);
    }

    #[test]
    fn test_display() {
        let mut params = WindowParams::new(3, 1);
        params.offset = 1;
        let window = WindowGenerator::new(vec!["a".to_string()], &roles(&["a"], &[]), params).unwrap();
        assert_eq!(
            window.to_string(),
            "Total window width: 5\nInput indices: [0, 1, 2]\nTarget indices: [4]"
        );
    }
}
