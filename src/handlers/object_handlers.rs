//! HTTP handlers for bucket and object operations.
//! Media downloads are streamed from disk; everything else is a small JSON
//! document built by `StorageService`.

use crate::{
    errors::AppError,
    models::{
        bucket::BucketDescriptor,
        object::{ObjectRepresentation, ObjectResource},
    },
    services::storage_service::{ListObjectsParams, StorageService},
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Request body for `POST /storage/v1/b`.
#[derive(Debug, Deserialize)]
pub struct CreateBucketReq {
    pub name: Option<String>,
}

/// Query params accepted by the upload endpoint.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: Option<String>,
    #[serde(rename = "uploadType")]
    pub upload_type: Option<String>,
}

/// Query params accepted by `GET .../o/{object}`.
#[derive(Debug, Deserialize)]
pub struct GetObjectQuery {
    pub alt: Option<String>,
}

/// Query params accepted by the object listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
}

#[derive(Debug, Serialize)]
struct BucketList {
    kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    items: Vec<BucketDescriptor>,
}

#[derive(Debug, Serialize)]
struct ObjectList {
    kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    items: Vec<ObjectResource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    prefixes: Vec<String>,
}

/// POST `/storage/v1/b` — create bucket.
pub async fn create_bucket(
    State(service): State<StorageService>,
    Json(payload): Json<CreateBucketReq>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::bad_request("bucket name is required"))?;

    let bucket = service.create_bucket(&name).await?;
    tracing::info!("created bucket {}", name);
    Ok(Json(bucket))
}

/// GET `/storage/v1/b` — list buckets.
pub async fn list_buckets(
    State(service): State<StorageService>,
) -> Result<impl IntoResponse, AppError> {
    let items = service.list_buckets().await?;
    Ok(Json(BucketList {
        kind: "storage#buckets",
        items,
    }))
}

/// GET `/storage/v1/b/{bucket}` — bucket descriptor.
pub async fn get_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.get_bucket(&bucket).await?))
}

/// GET `/storage/v1/b/{bucket}/o` — list objects, supports ?prefix=&delimiter=
pub async fn list_objects(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let params = ListObjectsParams {
        prefix: q.prefix,
        delimiter: q.delimiter,
    };
    let result = service.list_objects(&bucket, &params).await?;
    Ok(Json(ObjectList {
        kind: "storage#objects",
        items: result.items.into_iter().map(|o| o.resource).collect(),
        prefixes: result.prefixes,
    }))
}

/// POST `/upload/storage/v1/b/{bucket}/o?uploadType=media|multipart&name=...`
pub async fn upload_object(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    Query(q): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let key = q
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::bad_request("object name is required"))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let is_multipart = match q.upload_type.as_deref() {
        Some("multipart") => true,
        Some("media") | None => content_type.is_some_and(|ct| {
            ct.trim_start()
                .get(..10)
                .is_some_and(|p| p.eq_ignore_ascii_case("multipart/"))
        }),
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "unsupported uploadType `{}`",
                other
            )));
        }
    };

    let object = service
        .put_object(&bucket, &key, body, content_type, is_multipart)
        .await?;
    tracing::debug!("stored {}/{} ({} bytes)", bucket, key, object.resource.size);

    Ok(json_with_object_headers(object))
}

/// GET `/storage/v1/b/{bucket}/o/{*object}` — metadata, or media with `?alt=media`.
pub async fn get_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<GetObjectQuery>,
) -> Result<Response, AppError> {
    if q.alt.as_deref() == Some("media") {
        return stream_object(&service, &bucket, &key).await;
    }
    let object = service.get_object_metadata(&bucket, &key).await?;
    Ok(json_with_object_headers(object))
}

/// GET `/download/storage/v1/b/{bucket}/o/{*object}` — streaming download.
pub async fn download_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    stream_object(&service, &bucket, &key).await
}

/// DELETE `/storage/v1/b/{bucket}/o/{*object}`
pub async fn delete_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stream_object(
    service: &StorageService,
    bucket: &str,
    key: &str,
) -> Result<Response, AppError> {
    let reader = service.open_object(bucket, key).await?;
    let mut response = Response::new(Body::from_stream(reader.stream));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &reader.metadata, true);
    Ok(response)
}

/// JSON resource body plus the object headers that do not describe the body.
fn json_with_object_headers(object: ObjectRepresentation) -> Response {
    let mut response = Json(&object.resource).into_response();
    set_object_headers(response.headers_mut(), &object, false);
    response
}

/// Copy synthesized object headers onto a response.
///
/// `content-type` and `content-length` describe the media and are only
/// copied when the media itself is the body.
fn set_object_headers(headers: &mut HeaderMap, object: &ObjectRepresentation, media: bool) {
    for (name, value) in &object.headers {
        if !media && (name == "content-type" || name == "content-length") {
            continue;
        }
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            tracing::warn!("skipping unrepresentable header {}", name);
            continue;
        };
        headers.insert(name, value);
    }
}
