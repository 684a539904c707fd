//! Endpoint redirection.
//!
//! A storage client normally talks to the provider's production host. Here
//! every URL the client needs is derived once, from an explicit
//! [`EndpointConfig`], into an immutable [`UrlTemplates`] set:
//!
//! - the JSON API base (`{base}/storage/v1`)
//! - the media download template (`{base}/download/storage/v1{path}?alt=media`)
//! - the multipart and resumable upload templates
//!   (`{base}/upload/storage/v1{bucket_path}/o?uploadType=...`)
//! - the access endpoint used for object URLs handed back to callers
//!   (`https://{public_host}`)
//!
//! API traffic and object URLs can therefore point at different hosts, e.g.
//! an emulator on `127.0.0.1:4443` whose objects are published as
//! `storage.gcs.127.0.0.1.nip.io:4443`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Default emulator address used for API calls.
pub const DEFAULT_EXTERNAL_URL: &str = "https://127.0.0.1:4443";

/// Default host presented in object access URLs.
pub const DEFAULT_PUBLIC_HOST: &str = "storage.gcs.127.0.0.1.nip.io:4443";

/// Default project for bucket listing and creation.
pub const DEFAULT_PROJECT: &str = "test";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Placeholder for an object path (`/b/{bucket}/o/{object}`).
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Placeholder for a bucket path (`/b/{bucket}`).
pub const BUCKET_PATH_PLACEHOLDER: &str = "{bucket_path}";

const API_PREFIX: &str = "/storage/v1";
const DOWNLOAD_PREFIX: &str = "/download/storage/v1";
const UPLOAD_PREFIX: &str = "/upload/storage/v1";
const EXTERNAL_URL_CONFIG_PATH: &str = "/internal/config/url/external";

/// Characters escaped in a single path segment. Object names may contain `/`,
/// which must not split the JSON API path.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters escaped in public object URLs, where `/` stays literal.
const OBJECT_NAME: &AsciiSet = &SEGMENT.remove(b'/');

/// Where the client sends requests and which host its object URLs name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Scheme, host and port of the emulator. Used for every API call.
    pub internal_base_url: String,
    /// Host and port presented in object access URLs.
    pub public_host: Option<String>,
    /// Skip certificate validation (emulators often use self-signed certs).
    pub insecure_tls: bool,
    /// Project used when listing or creating buckets.
    pub project: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl EndpointConfig {
    /// Creates a config targeting `internal_base_url` with no public host,
    /// certificate validation on, and default project and timeout.
    pub fn new(internal_base_url: impl Into<String>) -> Self {
        Self {
            internal_base_url: internal_base_url.into(),
            public_host: None,
            insecure_tls: false,
            project: DEFAULT_PROJECT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the host presented in object access URLs.
    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = Some(host.into());
        self
    }

    /// Enables or disables certificate validation.
    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    /// Sets the project.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the public host if one is set and non-blank.
    fn effective_public_host(&self) -> Option<&str> {
        self.public_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EXTERNAL_URL).public_host(DEFAULT_PUBLIC_HOST)
    }
}

/// URL templates derived from an [`EndpointConfig`].
///
/// Built once per client and never mutated, so clients with different
/// configurations cannot observe each other's endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplates {
    api_base_url: String,
    download: String,
    multipart_upload: String,
    resumable_upload: String,
    access_endpoint: String,
    external_url_config: String,
}

impl UrlTemplates {
    /// Derives the template set.
    ///
    /// Fails with [`ClientError::Configuration`] when the internal base URL is
    /// not an absolute URL with a host. No other validation is done.
    pub fn derive(config: &EndpointConfig) -> ClientResult<Self> {
        let base = config.internal_base_url.as_str();
        let parsed = validate_base_url(base)?;

        let access_endpoint = match config.effective_public_host() {
            Some(host) => format!("https://{}", host),
            None => scheme_host_port(&parsed),
        };

        let upload_base = format!(
            "{}{}{}/o?uploadType=",
            base, UPLOAD_PREFIX, BUCKET_PATH_PLACEHOLDER
        );

        Ok(Self {
            api_base_url: format!("{}{}", base, API_PREFIX),
            download: format!(
                "{}{}{}?alt=media",
                base, DOWNLOAD_PREFIX, PATH_PLACEHOLDER
            ),
            multipart_upload: format!("{}multipart", upload_base),
            resumable_upload: format!("{}resumable", upload_base),
            access_endpoint,
            external_url_config: format!("{}{}", base, EXTERNAL_URL_CONFIG_PATH),
        })
    }

    /// Base URL of the JSON API.
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Download template containing [`PATH_PLACEHOLDER`].
    pub fn download_template(&self) -> &str {
        &self.download
    }

    /// Multipart upload template containing [`BUCKET_PATH_PLACEHOLDER`].
    pub fn multipart_upload_template(&self) -> &str {
        &self.multipart_upload
    }

    /// Resumable upload template containing [`BUCKET_PATH_PLACEHOLDER`].
    pub fn resumable_upload_template(&self) -> &str {
        &self.resumable_upload
    }

    /// Scheme and host used for object access URLs.
    pub fn access_endpoint(&self) -> &str {
        &self.access_endpoint
    }

    /// Emulator endpoint that changes the external URL it reports. Always on
    /// the internal base URL, never on the public host.
    pub fn external_url_config_url(&self) -> &str {
        &self.external_url_config
    }

    /// JSON API URL for `path`, which must start with `/`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// JSON API URL of a bucket's metadata.
    pub fn bucket_url(&self, bucket: &str) -> String {
        self.api_url(&bucket_path(bucket))
    }

    /// JSON API URL of a bucket's object collection.
    pub fn objects_url(&self, bucket: &str) -> String {
        format!("{}/o", self.bucket_url(bucket))
    }

    /// JSON API URL of an object's metadata.
    pub fn object_url(&self, bucket: &str, object: &str) -> String {
        self.api_url(&object_path(bucket, object))
    }

    /// Media download URL of an object.
    pub fn download_url(&self, bucket: &str, object: &str) -> String {
        self.download
            .replace(PATH_PLACEHOLDER, &object_path(bucket, object))
    }

    /// Multipart upload URL for a bucket.
    pub fn multipart_upload_url(&self, bucket: &str) -> String {
        self.multipart_upload
            .replace(BUCKET_PATH_PLACEHOLDER, &bucket_path(bucket))
    }

    /// Resumable upload session URL for a bucket.
    pub fn resumable_upload_url(&self, bucket: &str) -> String {
        self.resumable_upload
            .replace(BUCKET_PATH_PLACEHOLDER, &bucket_path(bucket))
    }

    /// Public URL of an object on the access endpoint.
    pub fn access_url(&self, bucket: &str, object: &str) -> String {
        format!(
            "{}/{}/{}",
            self.access_endpoint,
            encode_segment(bucket),
            utf8_percent_encode(object, OBJECT_NAME)
        )
    }
}

fn validate_base_url(raw: &str) -> ClientResult<Url> {
    if raw.trim().is_empty() {
        return Err(ClientError::configuration(
            "internal base URL must not be empty",
        ));
    }

    if raw.trim() != raw {
        return Err(ClientError::configuration(format!(
            "internal base URL {:?} has leading or trailing whitespace",
            raw
        )));
    }

    let url = Url::parse(raw).map_err(|e| {
        ClientError::configuration(format!("invalid internal base URL {:?}: {}", raw, e))
    })?;

    if url.cannot_be_a_base() || !url.has_host() {
        return Err(ClientError::configuration(format!(
            "internal base URL {:?} must be an absolute URL with a host",
            raw
        )));
    }

    Ok(url)
}

/// `scheme://host[:port]` of the base URL. Unlike `Url::origin`, this stays
/// meaningful for schemes without a tuple origin.
fn scheme_host_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

fn encode_segment(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT).to_string()
}

/// `/b/{bucket}`
pub fn bucket_path(bucket: &str) -> String {
    format!("/b/{}", encode_segment(bucket))
}

/// `/b/{bucket}/o/{object}`
pub fn object_path(bucket: &str, object: &str) -> String {
    format!("{}/o/{}", bucket_path(bucket), encode_segment(object))
}
