//! Нормализация описаний сигналов и общая схема колонок

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Тип поля в индексе
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Keyword,
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    Other(String),
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Long | FieldType::Float | FieldType::Double
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::Keyword)
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "keyword" => FieldType::Keyword,
            "boolean" => FieldType::Boolean,
            "integer" => FieldType::Integer,
            "long" => FieldType::Long,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            _ => FieldType::Other(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Keyword => "keyword",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Other(other) => other.as_str(),
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    Auto,
    Categorical,
    Numerical,
}

impl Default for DeclaredType {
    fn default() -> Self {
        DeclaredType::Auto
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Categorical,
    Numerical,
}

/// Сигнал в том виде, в каком его задал пользователь
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDeclaration {
    pub cid: String,
    #[serde(default)]
    pub data_type: DeclaredType,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
    #[serde(default)]
    pub aggregation: Option<String>,
}

/// Метаданные сигнала из набора сигналов
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySignal {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub field: String,
}

/// Сигнал после нормализации схемы, неизменяемый дальше по конвейеру
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub cid: String,
    pub data_type: SignalKind,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<String>,
}

impl Signal {
    /// Имя колонки в таблице данных
    pub fn column(&self) -> String {
        match &self.aggregation {
            Some(aggregation) => format!("{}_{}", self.field, aggregation),
            None => self.field.clone(),
        }
    }

    pub fn is_categorical(&self) -> bool {
        self.data_type == SignalKind::Categorical
    }
}

fn parse_bound(cid: &str, bound: &'static str, raw: Option<&str>) -> Result<Option<f64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ForecastError::InvalidBound {
                signal: cid.to_string(),
                bound,
                value: value.to_string(),
            }),
    }
}

/// Определяет итоговый тип, поле и границы каждого сигнала.
///
/// `auto` становится `categorical` для `keyword`/`boolean` и `numerical` для
/// числовых типов. Агрегация остается только у числовых сигналов и только
/// если данные агрегируются.
pub fn prepare_signals(
    declarations: &[SignalDeclaration],
    entities: &HashMap<String, EntitySignal>,
    aggregated: bool,
) -> Result<Vec<Signal>> {
    declarations
        .iter()
        .map(|declaration| {
            let entity = entities
                .get(&declaration.cid)
                .ok_or_else(|| ForecastError::UnknownSignal(declaration.cid.clone()))?;

            let data_type = match declaration.data_type {
                DeclaredType::Categorical => SignalKind::Categorical,
                DeclaredType::Numerical => SignalKind::Numerical,
                DeclaredType::Auto => match entity.field_type {
                    FieldType::Keyword | FieldType::Boolean => SignalKind::Categorical,
                    ref t if t.is_numeric() => SignalKind::Numerical,
                    ref t => return Err(ForecastError::UnsupportedSignalType(t.to_string())),
                },
            };

            let aggregation = if aggregated && data_type == SignalKind::Numerical {
                declaration.aggregation.clone().filter(|a| !a.is_empty())
            } else {
                None
            };

            Ok(Signal {
                cid: declaration.cid.clone(),
                data_type,
                field_type: entity.field_type.clone(),
                field: entity.field.clone(),
                min: parse_bound(&declaration.cid, "min", declaration.min.as_deref())?,
                max: parse_bound(&declaration.cid, "max", declaration.max.as_deref())?,
                aggregation,
            })
        })
        .collect()
}

/// Свойства одной колонки объединенной схемы
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub field_type: FieldType,
    pub categorical: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub input: bool,
    pub target: bool,
}

/// Объединенная схема входных и целевых сигналов
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    targets: Vec<String>,
}

impl Schema {
    /// Входные сигналы, затем целевые, которых еще нет. Пустой список целей
    /// означает авторегрессию: цели совпадают со входами.
    pub fn merged(input: &[Signal], target: &[Signal]) -> Self {
        let autoregressive = target.is_empty();
        let mut columns: Vec<ColumnSpec> = Vec::new();
        let mut targets: Vec<String> = Vec::new();

        for signal in input {
            let name = signal.column();
            if columns.iter().any(|c| c.name == name) {
                continue;
            }
            if autoregressive {
                targets.push(name.clone());
            }
            columns.push(ColumnSpec {
                name,
                field_type: signal.field_type.clone(),
                categorical: signal.is_categorical(),
                min: signal.min,
                max: signal.max,
                input: true,
                target: autoregressive,
            });
        }

        for signal in target {
            let name = signal.column();
            if !targets.contains(&name) {
                targets.push(name.clone());
            }
            if let Some(existing) = columns.iter_mut().find(|c| c.name == name) {
                existing.target = true;
                continue;
            }
            columns.push(ColumnSpec {
                name,
                field_type: signal.field_type.clone(),
                categorical: signal.is_categorical(),
                min: signal.min,
                max: signal.max,
                input: false,
                target: true,
            });
        }

        Self { columns, targets }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Целевые колонки в объявленном порядке; в этом порядке модель выдает
    /// признаки
    pub fn target_names(&self) -> &[String] {
        &self.targets
    }
}
