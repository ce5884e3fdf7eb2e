//! Загрузка данных сигналов

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::preprocessing::schema::Signal;
use crate::types::{Table, Value};

/// Полуинтервал времени `[start, end)`; отсутствующая граница не ограничивает
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *ts >= start) && self.end.map_or(true, |end| *ts < end)
    }
}

/// Источник данных: таблица со строками по времени и колонками сигналов.
/// Пустой результат - ошибка `NoData`.
pub trait DataLoader {
    fn load(&self, signals: &[Signal], range: &TimeRange) -> Result<Table>;
}

/// Таблица в памяти с колонкой времени (RFC 3339 или миллисекунды)
pub struct InMemoryLoader {
    table: Table,
    ts_column: String,
}

impl InMemoryLoader {
    pub fn new(table: Table, ts_column: impl Into<String>) -> Self {
        Self {
            table,
            ts_column: ts_column.into(),
        }
    }

    fn timestamp(&self, row: usize, value: &Value) -> Result<DateTime<Utc>> {
        let invalid = || {
            ForecastError::Shape(format!(
                "invalid timestamp '{}' in column '{}' (row {})",
                value, self.ts_column, row
            ))
        };
        match value {
            Value::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| invalid()),
            Value::Number(millis) => Utc
                .timestamp_millis_opt(*millis as i64)
                .single()
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

impl DataLoader for InMemoryLoader {
    fn load(&self, signals: &[Signal], range: &TimeRange) -> Result<Table> {
        let mut columns: Vec<String> = Vec::new();
        for column in signals.iter().map(Signal::column) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        let selected = self.table.select(&columns)?;

        let mut rows = Vec::new();
        for (i, (ts, row)) in self
            .table
            .column(&self.ts_column)?
            .iter()
            .zip(selected.to_rows())
            .enumerate()
        {
            if range.contains(&self.timestamp(i, ts)?) {
                rows.push(row);
            }
        }

        if rows.is_empty() {
            tracing::warn!("No data in range {:?}", range);
            return Err(ForecastError::NoData);
        }
        tracing::debug!("Loaded {} rows for {} columns", rows.len(), columns.len());
        Table::from_rows(columns, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::schema::{FieldType, SignalKind};

    fn signal(field: &str) -> Signal {
        Signal {
            cid: field.to_string(),
            data_type: SignalKind::Numerical,
            field_type: FieldType::Double,
            field: field.to_string(),
            min: None,
            max: None,
            aggregation: None,
        }
    }

    fn loader() -> InMemoryLoader {
        let table = Table::from_rows(
            vec!["ts".to_string(), "a".to_string(), "b".to_string()],
            vec![
                vec![Value::from("2024-01-01T00:00:00Z"), 1.0.into(), 10.0.into()],
                vec![Value::from("2024-01-01T01:00:00Z"), 2.0.into(), 20.0.into()],
                vec![Value::from("2024-01-01T02:00:00+00:00"), 3.0.into(), 30.0.into()],
            ],
        )
        .unwrap();
        InMemoryLoader::new(table, "ts")
    }

    #[test]
    fn test_load_filters_range_and_projects() {
        let range = TimeRange {
            start: Some(Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()),
            end: None,
        };
        let table = loader().load(&[signal("b")], &range).unwrap();
        assert_eq!(table.column_names(), vec!["b"]);
        assert_eq!(table.numeric_column("b").unwrap(), vec![20.0, 30.0]);
    }

    #[test]
    fn test_empty_range_is_no_data() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::between(start, start + chrono::Duration::days(1));
        let err = loader().load(&[signal("a")], &range).unwrap_err();
        assert!(matches!(err, ForecastError::NoData));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_unknown_signal_column() {
        assert!(matches!(
            loader().load(&[signal("zzz")], &TimeRange::all()),
            Err(ForecastError::MissingColumn(_))
        ));
    }
}
