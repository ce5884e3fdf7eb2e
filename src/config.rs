//! Настройки сервера из переменных окружения `SIGNAL_FORECAST_*`

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

const PREFIX: &str = "SIGNAL_FORECAST_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address '{0}'")]
    InvalidBindAddr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Каталог для сохранения моделей; без него модели живут только в памяти
    pub model_dir: Option<PathBuf>,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(PREFIX).map(|k| (k.to_string(), v)))
            .collect();

        let bind_addr = vars
            .get("BIND_ADDR")
            .map(String::as_str)
            .unwrap_or("0.0.0.0:8000");
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr.to_string()))?;

        Ok(Self {
            bind_addr,
            model_dir: vars
                .get("MODEL_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            log_level: vars
                .get("LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| "info".to_string()),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            model_dir: None,
            log_level: "info".to_string(),
        }
    }
}
