//! Keeps a declared list of named artifacts in sync between local disk and
//! an S3 bucket.

pub mod artifact;
pub mod config;
pub mod error;
pub mod key_resolver;
pub mod manifest;
pub mod storage;

pub use artifact::Artifact;
pub use config::{LocalPolicy, ManifestConfiguration};
pub use error::Error;
pub use manifest::{GetManifestResult, Manifest, StoreManifestResult};
pub use storage::{ObjectStore, S3Store};
