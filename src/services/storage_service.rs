//! src/services/storage_service.rs
//!
//! StorageService — bucket and object operations backed directly by the local
//! filesystem. A bucket is a directory under the store root and an object is a
//! file at `root/{bucket}/{key}`. There is no metadata database or cache:
//! every call reads the current state from disk and derives what it returns.

use crate::{
    models::{bucket::BucketDescriptor, object::ObjectRepresentation},
    services::{
        metadata::describe_file,
        multipart::{self, MultipartError},
        path_resolver::resolve,
    },
};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::Stream;
use std::{
    collections::BTreeSet,
    fmt,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Settings the store needs from the surrounding process.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding one subdirectory per bucket.
    pub root: PathBuf,

    /// Scheme, host and port used to build `selfLink`/`mediaLink` URLs.
    pub base_url: String,

    /// Create a missing bucket on first upload instead of failing.
    pub auto_create_bucket: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
}

#[derive(Debug)]
pub struct ListObjectsResult {
    pub items: Vec<ObjectRepresentation>,
    pub prefixes: Vec<String>,
}

/// Byte stream over an object's content.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// An object opened for download: its headers plus a stream over the file.
pub struct ObjectReader {
    pub metadata: ObjectRepresentation,
    pub stream: ByteStream,
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    BadRequest(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object path")]
    PathTraversal,
    #[error("malformed multipart request: {0}")]
    MalformedRequest(#[from] MultipartError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the emulated storage operations:
/// - Create / inspect / list buckets (directories under the root)
/// - Upload an object (plain or multipart body), fully replacing prior content
/// - Describe, stream, list and delete objects
///
/// Cloning is cheap; clones share the same configuration.
#[derive(Clone, Debug)]
pub struct StorageService {
    pub config: Arc<StoreConfig>,
}

impl StorageService {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Resolve the directory of a bucket.
    ///
    /// The name must resolve to a direct child of the root, so `a/b` or `.`
    /// are rejected and `..` is reported as a traversal attempt.
    fn bucket_root(&self, bucket: &str) -> StorageResult<PathBuf> {
        if bucket.is_empty() {
            return Err(StorageError::BadRequest("bucket name is required".into()));
        }
        if bucket.contains('\0') {
            return Err(StorageError::BadRequest(
                "bucket name contains a NUL byte".into(),
            ));
        }
        let path = resolve(self.root(), bucket).map_err(|err| {
            warn!("rejected bucket name: {}", err);
            StorageError::PathTraversal
        })?;
        if bucket.contains(['/', '\\']) || path.parent() != Some(self.root()) {
            return Err(StorageError::BadRequest(format!(
                "invalid bucket name `{bucket}`"
            )));
        }
        Ok(path)
    }

    /// Resolve the file path of an object beneath its bucket directory.
    ///
    /// Also returns the normalized key (`a/./b` and `a//b` become `a/b`),
    /// which is the name the object is reported under.
    fn object_path(&self, bucket_root: &Path, key: &str) -> StorageResult<(PathBuf, String)> {
        if key.is_empty() {
            return Err(StorageError::BadRequest("object name is required".into()));
        }
        if key.contains('\0') {
            return Err(StorageError::BadRequest(
                "object name contains a NUL byte".into(),
            ));
        }
        let path = resolve(bucket_root, key).map_err(|err| {
            warn!("rejected object name: {}", err);
            StorageError::PathTraversal
        })?;
        if path == bucket_root {
            return Err(StorageError::BadRequest(format!(
                "invalid object name `{key}`"
            )));
        }
        debug!("resolved object path {}", path.display());
        let normalized = key_for(bucket_root, &path).unwrap_or_else(|| key.to_string());
        Ok((path, normalized))
    }

    /// Fail with BadRequest if writing `file_path` would collide with the
    /// existing tree: the path is a directory, or one of its parents is a file.
    async fn ensure_key_slot(
        &self,
        bucket_root: &Path,
        file_path: &Path,
        key: &str,
    ) -> StorageResult<()> {
        if is_dir(file_path).await? {
            return Err(key_collision(key));
        }
        let mut ancestor = file_path.parent();
        while let Some(dir) = ancestor {
            if dir == bucket_root || !dir.starts_with(bucket_root) {
                break;
            }
            if is_file(dir).await? {
                return Err(key_collision(key));
            }
            ancestor = dir.parent();
        }
        Ok(())
    }

    /// Create a bucket directory.
    ///
    /// Returns BucketAlreadyExists if the directory is already there. The
    /// store root is created on demand.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<BucketDescriptor> {
        let path = self.bucket_root(name)?;
        if fs::try_exists(&path).await? {
            return Err(StorageError::BucketAlreadyExists(name.to_string()));
        }
        fs::create_dir_all(self.root()).await?;
        match fs::create_dir(&path).await {
            Ok(()) => debug!("created bucket directory {}", path.display()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::BucketAlreadyExists(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        self.describe_bucket(name, &path).await
    }

    /// Create the bucket directory unless it already exists.
    pub async fn ensure_bucket(&self, name: &str) -> StorageResult<PathBuf> {
        let path = self.bucket_root(name)?;
        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    pub async fn bucket_exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.bucket_root(name)?;
        is_dir(&path).await
    }

    pub async fn get_bucket(&self, name: &str) -> StorageResult<BucketDescriptor> {
        let path = self.bucket_root(name)?;
        if !is_dir(&path).await? {
            return Err(StorageError::BucketNotFound(name.to_string()));
        }
        self.describe_bucket(name, &path).await
    }

    /// List every bucket directory under the root, sorted by name.
    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketDescriptor>> {
        let mut entries = match fs::read_dir(self.root()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut buckets = Vec::with_capacity(names.len());
        for name in names {
            let path = self.root().join(&name);
            buckets.push(self.describe_bucket(&name, &path).await?);
        }
        Ok(buckets)
    }

    /// Write an object, replacing whatever was stored under the key.
    ///
    /// For multipart uploads the body is decoded first and the decoded
    /// content type replaces `content_type`. Nothing touches the disk until
    /// the names are validated and the body is decoded.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        is_multipart: bool,
    ) -> StorageResult<ObjectRepresentation> {
        let bucket_root = self.bucket_root(bucket)?;
        let (file_path, key) = self.object_path(&bucket_root, key)?;

        let (payload, content_type) = if is_multipart {
            let decoded = multipart::decode(body, content_type.unwrap_or_default())?;
            (decoded.media, Some(decoded.content_type))
        } else {
            (body, content_type.map(str::to_string))
        };

        self.ensure_key_slot(&bucket_root, &file_path, &key).await?;

        if !self.bucket_exists(bucket).await? {
            if !self.config.auto_create_bucket {
                return Err(StorageError::BucketNotFound(bucket.to_string()));
            }
            self.ensure_bucket(bucket).await?;
            debug!("auto-created bucket {}", bucket);
        }

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| collision_or_io(err, &key))?;
        }
        fs::write(&file_path, &payload)
            .await
            .map_err(|err| collision_or_io(err, &key))?;
        debug!(
            "wrote {} bytes to {}",
            payload.len(),
            file_path.display()
        );

        Ok(describe_file(
            &self.config.base_url,
            bucket,
            &key,
            content_type.as_deref(),
            &file_path,
        )
        .await?)
    }

    /// Describe an existing object.
    ///
    /// Returns ObjectNotFound if no file exists at the key.
    pub async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<ObjectRepresentation> {
        let (file_path, key) = self.existing_object_path(bucket, key).await?;
        Ok(describe_file(&self.config.base_url, bucket, &key, None, &file_path).await?)
    }

    /// Open an object for streaming out, together with its headers.
    pub async fn open_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader> {
        let (file_path, key) = self.existing_object_path(bucket, key).await?;
        let metadata = describe_file(&self.config.base_url, bucket, &key, None, &file_path).await?;
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                not_found(bucket, &key)
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok(ObjectReader {
            metadata,
            stream: Box::pin(ReaderStream::new(file)),
        })
    }

    /// Remove an object's file.
    ///
    /// Key directories left empty are pruned; the bucket directory is kept.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let (file_path, _) = self.existing_object_path(bucket, key).await?;
        match fs::remove_file(&file_path).await {
            Ok(()) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(not_found(bucket, key));
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(bucket)?;
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// List objects in a bucket with optional prefix and delimiter grouping.
    ///
    /// Items are sorted by key. Keys that contain the delimiter after the
    /// prefix are collapsed into `prefixes` instead of being returned.
    pub async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let bucket_root = self.bucket_root(bucket)?;
        if !is_dir(&bucket_root).await? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }

        let mut keys = collect_keys(&bucket_root).await?;
        keys.sort();

        let mut items = Vec::new();
        let mut prefixes = BTreeSet::new();
        for (key, path) in keys {
            if let Some(prefix) = params.prefix.as_deref() {
                if !key.starts_with(prefix) {
                    continue;
                }
            }
            if let Some(delim) = params.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(common) = compute_common_prefix(&key, params.prefix.as_deref(), delim)
                {
                    prefixes.insert(common);
                    continue;
                }
            }
            items.push(describe_file(&self.config.base_url, bucket, &key, None, &path).await?);
        }

        Ok(ListObjectsResult {
            items,
            prefixes: prefixes.into_iter().collect(),
        })
    }

    async fn existing_object_path(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(PathBuf, String)> {
        let bucket_root = self.bucket_root(bucket)?;
        let (file_path, normalized) = self.object_path(&bucket_root, key)?;
        if !is_file(&file_path).await? {
            return Err(not_found(bucket, key));
        }
        Ok((file_path, normalized))
    }

    async fn describe_bucket(&self, name: &str, path: &Path) -> StorageResult<BucketDescriptor> {
        let modified: DateTime<Utc> = fs::metadata(path).await?.modified()?.into();
        let timestamp = modified.to_rfc3339_opts(SecondsFormat::Millis, true);
        Ok(BucketDescriptor {
            kind: "storage#bucket",
            id: name.to_string(),
            name: name.to_string(),
            self_link: format!(
                "{}/storage/v1/b/{}",
                self.config.base_url.trim_end_matches('/'),
                name
            ),
            time_created: timestamp.clone(),
            updated: timestamp,
            location: "US",
            storage_class: "STANDARD",
            metageneration: "1",
        })
    }

    /// Recursively remove empty directories up to, not including, `stop`.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached `stop`
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

fn not_found(bucket: &str, key: &str) -> StorageError {
    StorageError::ObjectNotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

fn key_collision(key: &str) -> StorageError {
    StorageError::BadRequest(format!(
        "object name `{key}` collides with an existing object or directory"
    ))
}

/// Map path-shape I/O failures to BadRequest; anything else stays Io.
fn collision_or_io(err: io::Error, key: &str) -> StorageError {
    match err.kind() {
        ErrorKind::IsADirectory | ErrorKind::NotADirectory | ErrorKind::AlreadyExists => {
            key_collision(key)
        }
        _ => StorageError::Io(err),
    }
}

async fn is_file(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

async fn is_dir(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Walk `bucket_root` and return every file as a `/`-joined key and its path.
async fn collect_keys(bucket_root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut keys = Vec::new();
    let mut pending = vec![bucket_root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                if let Some(key) = key_for(bucket_root, &path) {
                    keys.push((key, path));
                }
            }
        }
    }
    Ok(keys)
}

fn key_for(bucket_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_root).ok()?;
    let segments = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

/// Compute the "common prefix" a key is grouped under for delimiter listing.
///
/// Returns Some(prefix) if the key belongs to a grouped prefix, otherwise None.
fn compute_common_prefix(
    key: &str,
    requested_prefix: Option<&str>,
    delimiter: &str,
) -> Option<String> {
    let after_prefix = match requested_prefix {
        Some(prefix) => key.strip_prefix(prefix)?,
        None => key,
    };

    let pos = after_prefix.find(delimiter)?;
    let mut combined = requested_prefix.unwrap_or_default().to_string();
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}
