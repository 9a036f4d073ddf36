//! Remote object store module
//!
//! - `client`: S3 client creation for R2/S3-compatible endpoints
//! - `types`: metadata and listing types
//! - `store`: the `ObjectStore` transport used by the upload pipeline

mod client;
mod store;
mod types;

pub use client::create_s3_client;
pub use store::{ObjectStore, S3ObjectStore};
pub use types::{
    content_type_for, encode_key_path, ObjectMetadata, ProgressFn, RemoteObject, CACHE_CONTROL,
    UPLOADED_AT_KEY,
};
