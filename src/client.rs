//! Storage client bound to a redirected endpoint.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use md5::{Digest, Md5};
use reqwest::{header, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};

use crate::endpoint::{object_path, EndpointConfig, UrlTemplates};
use crate::error::{ClientError, ClientResult};
use crate::models::{Bucket, ListPage, Object};
use crate::transport::build_http_client;

/// Cloud Storage JSON API client whose every request targets the configured
/// endpoint.
///
/// Cloning is cheap: clones share the URL templates and the connection pool.
#[derive(Debug, Clone)]
pub struct StorageClient {
    templates: Arc<UrlTemplates>,
    http: reqwest::Client,
    project: Arc<str>,
}

impl StorageClient {
    /// Derives the URL templates and builds the transport.
    ///
    /// Fails with [`ClientError::Configuration`] before any network access
    /// when the internal base URL is invalid.
    pub fn new(config: EndpointConfig) -> ClientResult<Self> {
        let templates = UrlTemplates::derive(&config)?;
        let http = build_http_client(&config)?;

        info!(
            api = templates.api_base_url(),
            access = templates.access_endpoint(),
            "storage client configured"
        );

        Ok(Self {
            templates: Arc::new(templates),
            http,
            project: Arc::from(config.project.as_str()),
        })
    }

    /// Returns the URL templates in use.
    pub fn templates(&self) -> &UrlTemplates {
        &self.templates
    }

    /// Returns the project used for bucket operations.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Public URL of an object on the access endpoint. Makes no request.
    pub fn public_url(&self, bucket: &str, object: &str) -> String {
        self.templates.access_url(bucket, object)
    }

    // ------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------

    /// Lists every bucket of the project, following page tokens.
    pub async fn list_buckets(&self) -> ClientResult<Vec<Bucket>> {
        let url = self.templates.api_url("/b");
        let mut buckets = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![("project", self.project.to_string())];
            if let Some(t) = &token {
                query.push(("pageToken", t.clone()));
            }

            let page: ListPage<Bucket> = self.get_json(&url, &query, "buckets").await?;
            token = page.next_token().map(String::from);
            buckets.extend(page.items);

            if token.is_none() {
                break;
            }
        }

        debug!(count = buckets.len(), "listed buckets");
        Ok(buckets)
    }

    /// Fetches a bucket's metadata.
    pub async fn get_bucket(&self, bucket: &str) -> ClientResult<Bucket> {
        let url = self.templates.bucket_url(bucket);
        self.get_json(&url, &[], &format!("bucket {}", bucket)).await
    }

    /// Creates a bucket in the project.
    pub async fn create_bucket(&self, bucket: &str, versioning: bool) -> ClientResult<Bucket> {
        let url = self.templates.api_url("/b");
        let body = Bucket::new(bucket).with_versioning(versioning);

        let resp = self
            .http
            .post(&url)
            .query(&[("project", &*self.project)])
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp, &format!("bucket {}", bucket)).await?;

        info!(bucket, versioning, "created bucket");
        decode(resp).await
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Fetches one page of a bucket's objects.
    pub async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        page_token: Option<&str>,
    ) -> ClientResult<ListPage<Object>> {
        let url = self.templates.objects_url(bucket);
        let mut query = Vec::new();
        if let Some(p) = prefix {
            query.push(("prefix", p.to_string()));
        }
        if let Some(t) = page_token {
            query.push(("pageToken", t.to_string()));
        }
        self.get_json(&url, &query, &format!("bucket {}", bucket))
            .await
    }

    /// Streams a bucket's objects, fetching pages as the stream is polled.
    pub fn objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: Option<&'a str>,
    ) -> impl Stream<Item = ClientResult<Object>> + 'a {
        // `None` state means the previous page was the last one.
        let pages = stream::try_unfold(Some(None::<String>), move |state| async move {
            let token = match state {
                Some(token) => token,
                None => return Ok::<_, ClientError>(None),
            };
            let page = self
                .list_objects_page(bucket, prefix, token.as_deref())
                .await?;
            let next = page.next_token().map(|t| Some(t.to_string()));
            Ok(Some((page.items, next)))
        });

        pages
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Object, ClientError>)))
            .try_flatten()
    }

    /// Lists every object in a bucket, optionally filtered by prefix.
    pub async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> ClientResult<Vec<Object>> {
        let objects: Vec<Object> = self.objects(bucket, prefix).try_collect().await?;
        debug!(bucket, count = objects.len(), "listed objects");
        Ok(objects)
    }

    /// Fetches an object's metadata.
    pub async fn get_object(&self, bucket: &str, object: &str) -> ClientResult<Object> {
        let url = self.templates.object_url(bucket, object);
        self.get_json(&url, &[], &resource_name(bucket, object))
            .await
    }

    /// Downloads an object's contents through the download template.
    pub async fn download_object(&self, bucket: &str, object: &str) -> ClientResult<Bytes> {
        let url = self.templates.download_url(bucket, object);
        let resp = self.http.get(&url).send().await?;
        let resp = check_status(resp, &resource_name(bucket, object)).await?;
        let data = resp.bytes().await?;
        debug!(bucket, object, size = data.len(), "downloaded object");
        Ok(data)
    }

    /// Downloads an object and checks it against the recorded MD5, when the
    /// server reports one.
    pub async fn download_verified(&self, bucket: &str, object: &str) -> ClientResult<Bytes> {
        let meta = self.get_object(bucket, object).await?;
        let data = self.download_object(bucket, object).await?;

        if let Some(expected) = meta.md5_hash.as_deref().filter(|h| !h.is_empty()) {
            let actual = md5_base64(&data);
            if actual != expected {
                return Err(ClientError::ChecksumMismatch {
                    bucket: bucket.to_string(),
                    object: object.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(data)
    }

    /// Uploads an object in a single multipart request.
    pub async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        content_type: &str,
        data: impl Into<Bytes>,
    ) -> ClientResult<Object> {
        let url = self.templates.multipart_upload_url(bucket);
        let data = data.into();
        let metadata = serde_json::to_vec(&Object::new(object).with_content_type(content_type))?;

        let boundary = format!("gcs-redirector-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &metadata, content_type, &data);

        let resp = self
            .http
            .post(&url)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;
        let resp = check_status(resp, &resource_name(bucket, object)).await?;

        info!(bucket, object, size = data.len(), "uploaded object");
        decode(resp).await
    }

    /// Uploads an object through a resumable session: one request opens the
    /// session, a second sends the data to the returned session URI.
    pub async fn upload_resumable(
        &self,
        bucket: &str,
        object: &str,
        content_type: &str,
        data: impl Into<Bytes>,
    ) -> ClientResult<Object> {
        let url = self.templates.resumable_upload_url(bucket);
        let data = data.into();
        let resource = resource_name(bucket, object);

        let resp = self
            .http
            .post(&url)
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", data.len().to_string())
            .json(&Object::new(object).with_content_type(content_type))
            .send()
            .await?;
        let resp = check_status(resp, &resource).await?;

        let status = resp.status().as_u16();
        let session = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| ClientError::Api {
                status,
                message: "resumable upload response has no Location header".to_string(),
                reason: None,
            })?;
        debug!(bucket, object, session = %session, "opened resumable upload session");

        let resp = self
            .http
            .put(&session)
            .header(header::CONTENT_TYPE, content_type)
            .body(data.clone())
            .send()
            .await?;
        let resp = check_status(resp, &resource).await?;

        info!(bucket, object, size = data.len(), "uploaded object (resumable)");
        decode(resp).await
    }

    /// Uploads a local file, through a resumable session when `resumable` is
    /// set and a single multipart request otherwise.
    pub async fn upload_file(
        &self,
        bucket: &str,
        object: &str,
        content_type: &str,
        path: impl AsRef<std::path::Path>,
        resumable: bool,
    ) -> ClientResult<Object> {
        let data = tokio::fs::read(path.as_ref()).await?;
        if resumable {
            self.upload_resumable(bucket, object, content_type, data).await
        } else {
            self.upload_object(bucket, object, content_type, data).await
        }
    }

    /// Deletes an object.
    pub async fn delete_object(&self, bucket: &str, object: &str) -> ClientResult<()> {
        let url = self.templates.object_url(bucket, object);
        let resp = self.http.delete(&url).send().await?;
        check_status(resp, &resource_name(bucket, object)).await?;
        info!(bucket, object, "deleted object");
        Ok(())
    }

    /// Tells the emulator which external URL to report in the object links it
    /// generates. Sent to the internal base URL as a `text/plain` body.
    pub async fn set_external_url(&self, external_url: &str) -> ClientResult<()> {
        let url = self.templates.external_url_config_url();
        let resp = self
            .http
            .put(url)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(external_url.to_string())
            .send()
            .await?;
        check_status(resp, "external URL config").await?;
        info!(external_url, "updated emulator external URL");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        resource: &str,
    ) -> ClientResult<T> {
        let resp = self.http.get(url).query(query).send().await?;
        let resp = check_status(resp, resource).await?;
        decode(resp).await
    }
}

/// Passes successful responses through and turns the rest into errors.
async fn check_status(resp: Response, resource: &str) -> ClientResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::from_response(status, resource, &body))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn resource_name(bucket: &str, object: &str) -> String {
    format!("object {}", object_path(bucket, object))
}

/// Base64 MD5 digest, as carried in an object's `md5Hash`.
pub fn md5_base64(data: &[u8]) -> String {
    BASE64.encode(Md5::digest(data))
}

/// Assembles a `multipart/related` body: JSON metadata, then the media.
fn multipart_related_body(boundary: &str, metadata: &[u8], content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
