//! Типы данных: значения сигналов и прямоугольные таблицы

use std::fmt;
use std::ops::Range;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Скалярное значение сигнала в одной строке таблицы
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Значение как число. `Null` становится NaN, текст не приводится.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => Some(f64::NAN),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    /// Категориальный уровень значения. У `Null` уровня нет.
    pub fn level(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Сериализованная форма таблицы: имена колонок и строки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    values: Vec<Value>,
}

/// Прямоугольная таблица. Порядок строк - ось времени, порядок колонок -
/// порядок вставки, имена колонок уникальны.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableData", into = "TableData")]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Table {
            columns: Vec::with_capacity(columns.len()),
            rows: rows.len(),
        };

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ForecastError::Shape(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }

        for (idx, name) in columns.into_iter().enumerate() {
            if table.has_column(&name) {
                return Err(ForecastError::DuplicateColumn(name));
            }
            let values = rows.iter().map(|row| row[idx].clone()).collect();
            table.columns.push(Column { name, values });
        }

        Ok(table)
    }

    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        (0..self.rows)
            .map(|i| self.columns.iter().map(|c| c.values[i].clone()).collect())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    /// Добавляет колонку в конец таблицы
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(ForecastError::DuplicateColumn(name));
        }
        if self.columns.is_empty() {
            self.rows = values.len();
        } else if values.len() != self.rows {
            return Err(ForecastError::Shape(format!(
                "column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.rows
            )));
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    /// Заменяет значения существующей колонки, не меняя ее позицию
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows {
            return Err(ForecastError::Shape(format!(
                "column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.rows
            )));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))?;
        column.values = values;
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<Vec<Value>> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))?;
        Ok(self.columns.remove(idx).values)
    }

    /// Новая таблица только с указанными колонками, в указанном порядке
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let mut table = Table {
            columns: Vec::with_capacity(names.len()),
            rows: self.rows,
        };
        for name in names {
            let values = self.column(name.as_ref())?.to_vec();
            table.push_column(name.as_ref(), values)?;
        }
        Ok(table)
    }

    /// Непрерывный срез строк `[start, end)`; границы обрезаются по длине
    pub fn slice(&self, range: Range<usize>) -> Table {
        let end = range.end.min(self.rows);
        let start = range.start.min(end);
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values[start..end].to_vec(),
                })
                .collect(),
            rows: end - start,
        }
    }

    /// Последние `n` строк
    pub fn tail(&self, n: usize) -> Table {
        self.slice(self.rows.saturating_sub(n)..self.rows)
    }

    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        self.column(name)?
            .iter()
            .enumerate()
            .map(|(row, v)| {
                v.as_f64().ok_or_else(|| ForecastError::NonNumeric {
                    column: name.to_string(),
                    row,
                })
            })
            .collect()
    }

    /// Матрица `[rows, columns]` в порядке колонок таблицы
    pub fn to_array(&self) -> Result<Array2<f64>> {
        let mut data = Array2::zeros((self.rows, self.columns.len()));
        for (j, column) in self.columns.iter().enumerate() {
            for (i, value) in column.values.iter().enumerate() {
                data[[i, j]] = value.as_f64().ok_or_else(|| ForecastError::NonNumeric {
                    column: column.name.clone(),
                    row: i,
                })?;
            }
        }
        Ok(data)
    }
}

impl TryFrom<TableData> for Table {
    type Error = ForecastError;

    fn try_from(data: TableData) -> Result<Self> {
        Table::from_rows(data.columns, data.rows)
    }
}

impl From<Table> for TableData {
    fn from(table: Table) -> Self {
        TableData {
            columns: table.column_names(),
            rows: table.to_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            vec!["temp".to_string(), "status".to_string()],
            vec![
                vec![Value::Number(1.0), Value::from("ok")],
                vec![Value::Number(2.0), Value::from("fail")],
                vec![Value::Null, Value::from("ok")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let result = Table::from_rows(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Value::Number(1.0)]],
        );
        assert!(matches!(result, Err(ForecastError::Shape(_))));
    }

    #[test]
    fn test_from_rows_rejects_duplicate_columns() {
        let result = Table::from_rows(vec!["a".to_string(), "a".to_string()], vec![]);
        assert!(matches!(result, Err(ForecastError::DuplicateColumn(_))));
    }

    #[test]
    fn test_slice_keeps_row_order() {
        let table = sample();
        let part = table.slice(1..3);
        assert_eq!(part.len(), 2);
        assert_eq!(part.column("status").unwrap()[0], Value::from("fail"));

        let clipped = table.slice(2..10);
        assert_eq!(clipped.len(), 1);
        assert!(table.slice(5..9).is_empty());
    }

    #[test]
    fn test_to_array_casts_values() {
        let table = Table::from_rows(
            vec!["x".to_string(), "flag".to_string()],
            vec![
                vec![Value::Number(2.5), Value::Bool(true)],
                vec![Value::Null, Value::Bool(false)],
            ],
        )
        .unwrap();
        let data = table.to_array().unwrap();
        assert_eq!(data[[0, 0]], 2.5);
        assert_eq!(data[[0, 1]], 1.0);
        assert!(data[[1, 0]].is_nan());
        assert_eq!(data[[1, 1]], 0.0);

        assert!(matches!(
            sample().to_array(),
            Err(ForecastError::NonNumeric { .. })
        ));
    }

    #[test]
    fn test_json_round_trip_preserves_column_order() {
        let table = sample();
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.starts_with("{\"columns\":[\"temp\",\"status\"]"));
        let restored: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn test_levels() {
        assert_eq!(Value::Number(3.0).level().as_deref(), Some("3"));
        assert_eq!(Value::Bool(true).level().as_deref(), Some("true"));
        assert_eq!(Value::Null.level(), None);
    }
}
