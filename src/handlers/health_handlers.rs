//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks disk I/O under the storage root

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Performs a write/read/delete round trip against the storage root.
/// HTTP 200 when it succeeds, HTTP 503 otherwise.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    // Dot-prefixed files are files, not buckets, so listings never see them.
    let tmp_path = service.root().join(format!(".readyz-{}", Uuid::new_v4()));
    let disk_check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"readyz" => match fs::remove_file(&tmp_path).await {
                Ok(_) => Ok(()),
                Err(e) => Err(format!("could not remove tmp file: {}", e)),
            },
            Ok(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err("file content mismatch".to_string())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(format!("could not read tmp file: {}", e))
            }
        },
        Err(e) => Err(format!("could not write tmp file: {}", e)),
    };

    let (status, body) = match disk_check {
        Ok(()) => (
            StatusCode::OK,
            ReadyResponse {
                status: "ok".into(),
                disk: CheckStatus {
                    ok: true,
                    error: None,
                },
            },
        ),
        Err(error) => {
            tracing::warn!("readiness check failed: {}", error);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ReadyResponse {
                    status: "error".into(),
                    disk: CheckStatus {
                        ok: false,
                        error: Some(error),
                    },
                },
            )
        }
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    disk: CheckStatus,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
