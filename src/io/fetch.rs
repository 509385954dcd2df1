use std::sync::Arc;

use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::{HttpRangeReader, LocalRangeReader, Location, RangeReader, S3RangeReader};
use crate::error::IoError;

/// Fetches whole objects or opens range readers over HTTP(S), S3 or the
/// local filesystem.
///
/// Cloning is cheap: both clients are reference counted internally.
#[derive(Clone)]
pub struct ObjectFetcher {
    http: reqwest::Client,
    s3: Option<Client>,
}

impl ObjectFetcher {
    /// Create a fetcher from an HTTP client and an optional S3 client.
    ///
    /// Without an S3 client, `s3://` locations fail with an `IoError::S3`.
    pub fn new(http: reqwest::Client, s3: Option<Client>) -> Self {
        Self { http, s3 }
    }

    /// Fetcher for HTTP and local locations only.
    pub fn without_s3() -> Self {
        Self::new(reqwest::Client::new(), None)
    }

    /// Read the full object at `location`.
    pub async fn fetch(&self, location: &Location) -> Result<Bytes, IoError> {
        debug!(location = %location, "Fetching object");
        match location {
            Location::Http(url) => self.fetch_http(url).await,
            Location::S3 { bucket, key } => self.fetch_s3(bucket, key).await,
            Location::Local(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => IoError::NotFound(location.to_string()),
                    _ => IoError::Local(format!("{}: {}", location, e)),
                }),
        }
    }

    /// Open a range reader over the object at `location`.
    ///
    /// Fails when the object does not exist or its size cannot be determined.
    pub async fn range_reader(&self, location: &Location) -> Result<Arc<dyn RangeReader>, IoError> {
        debug!(location = %location, "Opening range reader");
        let reader: Arc<dyn RangeReader> = match location {
            Location::Http(url) => {
                Arc::new(HttpRangeReader::new(self.http.clone(), url.clone()).await?)
            }
            Location::S3 { bucket, key } => {
                let client = self
                    .s3
                    .clone()
                    .ok_or_else(|| IoError::S3("no S3 client configured".to_string()))?;
                Arc::new(S3RangeReader::new(client, bucket.clone(), key.clone()).await?)
            }
            Location::Local(path) => Arc::new(LocalRangeReader::new(path.clone()).await?),
        };
        Ok(reader)
    }

    async fn fetch_http(&self, url: &url::Url) -> Result<Bytes, IoError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IoError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(IoError::Http(format!("{} returned {}", url, status)));
        }

        response
            .bytes()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))
    }

    async fn fetch_s3(&self, bucket: &str, key: &str) -> Result<Bytes, IoError> {
        let client = self
            .s3
            .as_ref()
            .ok_or_else(|| IoError::S3("no S3 client configured".to_string()))?;

        let resp = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    IoError::NotFound(format!("s3://{}/{}", bucket, key))
                } else {
                    IoError::S3(e.to_string())
                }
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(data)
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
