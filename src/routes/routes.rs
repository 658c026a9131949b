//! Defines routes for the emulated storage JSON API.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `POST   /storage/v1/b` — create bucket
//!   - `GET    /storage/v1/b` — list buckets
//!   - `GET    /storage/v1/b/{bucket}` — bucket descriptor
//!   - `GET    /storage/v1/b/{bucket}/o` — list objects (prefix, delimiter)
//!
//! - **Object-level endpoints**
//!   - `POST   /upload/storage/v1/b/{bucket}/o` — upload (media or multipart)
//!   - `GET    /storage/v1/b/{bucket}/o/{*object}` — metadata (`?alt=media` for content)
//!   - `GET    /download/storage/v1/b/{bucket}/o/{*object}` — download content
//!   - `DELETE /storage/v1/b/{bucket}/o/{*object}` — delete object
//!
//! The wildcard `*object` accepts both `a/b.txt` and the encoded `a%2Fb.txt`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{
            create_bucket, delete_object, download_object, get_bucket, get_object, list_buckets,
            list_objects, upload_object,
        },
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Largest upload body accepted, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

/// Build and return the router for all storage routes.
///
/// The router carries shared state (`StorageService`) to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/storage/v1/b", post(create_bucket).get(list_buckets))
        .route("/storage/v1/b/{bucket}", get(get_bucket))
        .route("/storage/v1/b/{bucket}/o", get(list_objects))
        // Object-level routes
        .route(
            "/storage/v1/b/{bucket}/o/{*object}",
            get(get_object).delete(delete_object),
        )
        .route(
            "/download/storage/v1/b/{bucket}/o/{*object}",
            get(download_object),
        )
        .route(
            "/upload/storage/v1/b/{bucket}/o",
            post(upload_object).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
}
