//! Data models for the emulated cloud storage service.
//!
//! Nothing here is persisted: buckets are directories, objects are files, and
//! every model is derived from the filesystem when a request needs it. The
//! JSON shapes follow the storage service's REST resources so client SDKs can
//! decode them unchanged.

pub mod bucket;
pub mod multipart;
pub mod object;
