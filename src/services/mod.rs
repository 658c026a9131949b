pub mod metadata;
pub mod multipart;
pub mod path_resolver;
pub mod storage_service;
