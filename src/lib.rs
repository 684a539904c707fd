//! gcs-redirector: point a Cloud Storage JSON API client at an emulator.
//!
//! An [`EndpointConfig`] is turned once into immutable [`UrlTemplates`] (API
//! base, download, multipart and resumable upload, access endpoint) and a
//! [`StorageClient`] that sends every request to the configured endpoint
//! while handing out object URLs on a possibly different public host.
//!
//! # Example
//!
//! ```no_run
//! use gcs_redirector::{EndpointConfig, StorageClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gcs_redirector::ClientError> {
//!     let config = EndpointConfig::new("https://127.0.0.1:4443")
//!         .public_host("storage.gcs.127.0.0.1.nip.io:4443")
//!         .insecure_tls(true);
//!     let client = StorageClient::new(config)?;
//!
//!     for bucket in client.list_buckets().await? {
//!         for object in client.list_objects(&bucket.name, None).await? {
//!             let data = client.download_object(&bucket.name, &object.name).await?;
//!             println!("{}: {} bytes", object.name, data.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod models;
pub mod provision;
pub mod transport;

// Re-exports for convenience
pub use client::StorageClient;
pub use config::{Args, Command, Config};
pub use endpoint::{
    EndpointConfig, UrlTemplates, DEFAULT_EXTERNAL_URL, DEFAULT_PROJECT, DEFAULT_PUBLIC_HOST,
};
pub use error::{ClientError, ClientResult};
pub use provision::{ProvisionOutputs, ProvisionPlan};
