use crate::errors::Error;
use crate::ingest::Ingestion;
use crate::liveness::LivenessTracker;
use crate::metrics;
use crate::model::{Ack, ChartData, DeviceStatus, RawReport};
use crate::window::WindowQuery;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Ingestion,
    pub window: WindowQuery,
    pub liveness: LivenessTracker,
    pub default_uid: String,
    pub chart_window: usize,
    pub chart_max_window: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    uid: Option<String>,
    limit: Option<usize>,
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/telemetry", post(post_telemetry))
        .route("/telemetry/", post(post_telemetry))
        .route("/dashboard", get(dashboard_page))
        .route("/dashboard/", get(dashboard_page))
        .route("/dashboard/data", get(get_chart_data))
        .route("/dashboard/data/", get(get_chart_data))
        .route("/devices/:uid/status", get(get_device_status));

    Router::new()
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api)
        .with_state(state)
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

/// Browser page that polls `/api/v1/dashboard/data/` and plots the series.
async fn dashboard_page() -> Html<&'static str> {
    Html(include_str!("dashboard.html"))
}

async fn post_telemetry(
    State(state): State<AppState>,
    body: Result<Json<RawReport>, JsonRejection>,
) -> Result<Json<Ack>, AppError> {
    let Json(report) = body.map_err(|e| Error::Validation(e.body_text()))?;
    let ack = state.ingestion.ingest(report).await?;
    Ok(Json(ack))
}

async fn get_chart_data(
    State(state): State<AppState>,
    query: Result<Query<ChartQuery>, QueryRejection>,
) -> Result<Json<ChartData>, AppError> {
    let Query(params) = query.map_err(|e| Error::Validation(e.body_text()))?;
    let uid = params.uid.unwrap_or_else(|| state.default_uid.clone());
    let limit = params
        .limit
        .unwrap_or(state.chart_window)
        .min(state.chart_max_window);

    let chart = state.window.chart_data(&uid, limit).await?;
    Ok(Json(chart))
}

async fn get_device_status(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Json<DeviceStatus> {
    let online = state.liveness.is_online(&uid).await;
    Json(DeviceStatus { uid, online })
}

/// Terse `{"error": ..}` body with a status derived from the error class.
pub struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::UnregisteredDevice(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("API error: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::UnregisteredDevice("GHOST".into()), StatusCode::NOT_FOUND),
            (
                Error::StoreWrite(StoreError::Unavailable("db".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::StoreRead(StoreError::Unavailable("db".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Registry(StoreError::Unavailable("db".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }
}
