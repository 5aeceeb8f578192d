//! HTTP front end for the prober.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::ble::transport::RadioTransport;
use crate::data::device::DeviceSummary;
use crate::data::services::ServiceMap;
use crate::error::{Error, Result};
use crate::prober::BleProber;
use crate::status::IndicatorState;

type SharedProber<T> = Arc<BleProber<T>>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct VersionBody {
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    state: IndicatorState,
    busy: bool,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Build the router.
pub fn router<T: RadioTransport>(prober: SharedProber<T>) -> Router {
    Router::new()
        .route("/scan", get(scan::<T>))
        .route("/results", get(results::<T>))
        .route("/probe/:address", get(probe::<T>))
        .route("/download_log", get(download_log::<T>))
        .route("/status", get(status::<T>))
        .route("/version", get(version))
        .with_state(prober)
}

/// Bind `addr` and serve the router until the listener fails.
pub async fn serve<T: RadioTransport>(prober: SharedProber<T>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind {}: {}", addr, e)))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(prober))
        .await
        .map_err(|e| Error::Internal(format!("server error: {}", e)))
}

async fn scan<T: RadioTransport>(State(prober): State<SharedProber<T>>) -> Response {
    info!("Scan requested");
    match prober.scan().await {
        Ok(_) => (StatusCode::OK, "Scan Complete").into_response(),
        Err(Error::Busy) => {
            (StatusCode::SERVICE_UNAVAILABLE, "Radio is busy, please wait...").into_response()
        }
        Err(e) => {
            error!("Scan error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Scan Error: {}", e)).into_response()
        }
    }
}

async fn results<T: RadioTransport>(
    State(prober): State<SharedProber<T>>,
) -> Json<Vec<DeviceSummary>> {
    Json(prober.devices())
}

async fn probe<T: RadioTransport>(
    State(prober): State<SharedProber<T>>,
    Path(address): Path<String>,
) -> std::result::Result<Json<ServiceMap>, Response> {
    info!("Probe requested for: {}", address);
    match prober.probe(&address).await {
        Ok(result) => Ok(Json(result.services)),
        Err(Error::Busy) => Err(json_error(StatusCode::SERVICE_UNAVAILABLE, "Radio is busy")),
        Err(e @ Error::InvalidAddress { .. }) => {
            Err(json_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            error!("Probe error: {}", e);
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn download_log<T: RadioTransport>(State(prober): State<SharedProber<T>>) -> Response {
    match prober.read_log().await {
        Ok(Some(text)) => {
            let filename = prober
                .config()
                .log_file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| crate::config::DEFAULT_LOG_FILE.to_string());
            (
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                text,
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            "Log file not found yet. Run a probe first!",
        )
            .into_response(),
        Err(e) => {
            error!("Reading log failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn status<T: RadioTransport>(State(prober): State<SharedProber<T>>) -> Json<StatusBody> {
    Json(StatusBody {
        state: prober.status(),
        busy: prober.is_busy(),
    })
}

async fn version() -> Json<VersionBody> {
    Json(VersionBody {
        version: env!("CARGO_PKG_VERSION"),
    })
}
