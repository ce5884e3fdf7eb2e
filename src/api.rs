//! HTTP API: обучение и прогнозирование

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::error::ForecastError;
use crate::models::ForecastModel;
use crate::params::{prepare_training_params, JobParameters, PredictionParams};
use crate::prediction::run_prediction;
use crate::training::{run_training, TrainingMetrics};
use crate::types::Table;

#[derive(Clone)]
struct StoredModel {
    model: ForecastModel,
    params: PredictionParams,
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    models: Arc<tokio::sync::Mutex<HashMap<String, StoredModel>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            models: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    fn model_path(&self, name: &str) -> Option<PathBuf> {
        self.config.model_dir.as_ref().map(|dir| dir.join(name))
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<ForecastError> for ApiError {
    fn from(error: ForecastError) -> Self {
        let status = if error.is_configuration_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            match error {
                ForecastError::NoData => StatusCode::NOT_FOUND,
                ForecastError::MissingColumn(_)
                | ForecastError::DuplicateColumn(_)
                | ForecastError::NonNumeric { .. }
                | ForecastError::Shape(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!("Request failed ({}): {}", self.status, self.message);
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("invalid model name '{}'", name)))
    }
}

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub name: String,
    pub parameters: JobParameters,
    pub data: Table,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub name: String,
    pub trained: bool,
    pub metrics: TrainingMetrics,
    pub prediction_parameters: PredictionParams,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub name: String,
    pub data: Table,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<Table>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/train", post(train))
        .route("/api/predict", post(predict))
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Signal Forecast API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn train(
    State(state): State<AppState>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    validate_name(&request.name)?;
    tracing::info!("Train request '{}': {} rows", request.name, request.data.len());

    let params = prepare_training_params(&request.parameters)?;
    let outcome = run_training(&params, &request.data)?;

    if let Some(dir) = state.model_path(&request.name) {
        outcome.save(&dir)?;
        tracing::info!("Saved model '{}' to {}", request.name, dir.display());
    }

    let trained = outcome.model.is_some();
    if let Some(model) = outcome.model {
        state.models.lock().await.insert(
            request.name.clone(),
            StoredModel {
                model,
                params: outcome.prediction_parameters.clone(),
            },
        );
    }

    Ok(Json(TrainResponse {
        name: request.name,
        trained,
        metrics: outcome.metrics,
        prediction_parameters: outcome.prediction_parameters,
    }))
}

async fn load_stored(state: &AppState, name: &str) -> Result<StoredModel, ApiError> {
    if let Some(stored) = state.models.lock().await.get(name) {
        return Ok(stored.clone());
    }

    let dir = state
        .model_path(name)
        .filter(|dir| dir.join("model.json").exists())
        .ok_or_else(|| ApiError::not_found(format!("model '{}' not found", name)))?;

    let model = ForecastModel::load(dir.join("model.json"))?;
    let json = std::fs::read_to_string(dir.join("prediction_parameters.json"))
        .map_err(ForecastError::from)?;
    let params = PredictionParams::from_json(&json)?;
    let stored = StoredModel { model, params };
    state
        .models
        .lock()
        .await
        .insert(name.to_string(), stored.clone());
    Ok(stored)
}

async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    validate_name(&request.name)?;
    tracing::info!("Predict request '{}': {} rows", request.name, request.data.len());

    let stored = load_stored(&state, &request.name).await?;
    let predictions = run_prediction(&stored.params, &stored.model, &request.data)?;

    Ok(Json(PredictResponse { predictions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn job_data(rows: usize) -> serde_json::Value {
        let statuses = ["idle", "busy"];
        serde_json::json!({
            "columns": ["temp", "state"],
            "rows": (0..rows)
                .map(|i| serde_json::json!([15.0 + (i % 5) as f64, statuses[i % 2]]))
                .collect::<Vec<_>>()
        })
    }

    fn train_body(name: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "parameters": {
                "input_signals": [
                    {"cid": "t", "data_type": "auto"},
                    {"cid": "s", "data_type": "auto"}
                ],
                "entities": {
                    "t": {"type": "double", "field": "temp"},
                    "s": {"type": "keyword", "field": "state"}
                },
                "input_width": 3,
                "target_width": 1
            },
            "data": job_data(30)
        })
    }

    async fn call(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(AppState::new(AppConfig::default()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_train_then_predict() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            model_dir: Some(dir.path().to_path_buf()),
            ..AppConfig::default()
        };
        let state = AppState::new(config);

        let (status, body) = call(router(state.clone()), "/api/train", train_body("room-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trained"], true);
        assert!(dir.path().join("room-1/model.json").exists());

        let request = serde_json::json!({ "name": "room-1", "data": job_data(4) });
        let (status, body) = call(router(state), "/api/predict", request.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let predictions = body["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0]["columns"], serde_json::json!(["temp", "state"]));

        // Модель читается с диска новым экземпляром сервера
        let fresh = AppState::new(AppConfig {
            model_dir: Some(dir.path().to_path_buf()),
            ..AppConfig::default()
        });
        let (status, _) = call(router(fresh), "/api/predict", request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_errors() {
        let state = AppState::new(AppConfig::default());

        let request = serde_json::json!({ "name": "missing", "data": job_data(4) });
        let (status, _) = call(router(state.clone()), "/api/predict", request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(router(state.clone()), "/api/train", train_body("../etc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut body = train_body("bad");
        body["parameters"]["entities"]["t"]["type"] = serde_json::json!("geo_point");
        let (status, body) = call(router(state), "/api/train", body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Unsupported signal type: geo_point");
    }
}
