use crate::error::AppError;
use crate::infra::{build_estimator, AppState};
use crate::workflows::forecast::Forecast;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub(crate) struct EstimateRequest {
    pub(crate) receipt_number: String,
    /// Snapshot version counting back from the newest capture.
    #[serde(default)]
    pub(crate) version: usize,
    /// Business days of history for the throughput window.
    #[serde(default = "default_history_length")]
    pub(crate) history_length: u32,
}

fn default_history_length() -> u32 {
    10
}

pub(crate) fn router() -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/estimate", post(estimate_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn estimate_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<EstimateRequest>,
) -> Result<Json<Forecast>, AppError> {
    let EstimateRequest {
        receipt_number,
        version,
        history_length,
    } = payload;

    let tracker = state.config.tracker.clone();

    // The estimator blocks on network and file IO and sleeps between
    // retries, so it runs off the async workers.
    let forecast = tokio::task::spawn_blocking(move || {
        let mut estimator = build_estimator(&tracker)?;
        estimator.estimate(&receipt_number, version, history_length)
    })
    .await??;

    Ok(Json(forecast))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AppConfig, AppEnvironment, ServerConfig, TelemetryConfig, TrackerConfig,
    };
    use crate::workflows::forecast::ForecastCode;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(ready: bool, snapshot_dir: &Path) -> AppState {
        let config = AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
            tracker: TrackerConfig {
                snapshot_dir: snapshot_dir.to_path_buf(),
                proxy_pool: Vec::new(),
                rotate_every: 100,
            },
        };

        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn health_route_responds_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router().layer(Extension(test_state(true, dir.path())));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_flagged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(false, dir.path());

        let response = readiness_endpoint(Extension(state.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state
            .readiness
            .store(true, std::sync::atomic::Ordering::Release);
        let response = readiness_endpoint(Extension(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_render_as_prometheus_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = metrics_endpoint(Extension(test_state(true, dir.path())))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .expect("content type present");
        assert_eq!(content_type, "text/plain; version=0.0.4");
    }

    #[tokio::test]
    async fn malformed_receipts_come_back_as_terminal_forecasts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(true, dir.path());

        let request = EstimateRequest {
            receipt_number: "not-a-receipt".to_string(),
            version: 0,
            history_length: 10,
        };
        let Json(forecast) = estimate_endpoint(Extension(state), Json(request))
            .await
            .expect("validation is not a transport error");

        assert_eq!(forecast.code, ForecastCode::UnexpectedFormat);
        assert!(forecast.estimated_completion.is_none());
    }

    #[tokio::test]
    async fn missing_snapshot_versions_map_to_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(true, dir.path());

        let request = EstimateRequest {
            receipt_number: "YSC1790000000".to_string(),
            version: 0,
            history_length: 10,
        };
        let error = estimate_endpoint(Extension(state), Json(request))
            .await
            .expect_err("no captures exist yet");

        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn request_defaults_cover_version_and_history() {
        let request: EstimateRequest =
            serde_json::from_str(r#"{ "receipt_number": "YSC1790000000" }"#)
                .expect("minimal request parses");
        assert_eq!(request.version, 0);
        assert_eq!(request.history_length, 10);
    }
}
