use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::IoError;

/// Trait for reading byte ranges from a stored object.
///
/// Rasters are decoded from the byte ranges they need instead of being
/// downloaded whole. Implementations must be thread-safe.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the object in bytes.
    fn size(&self) -> u64;

    /// Location of the object, for logging.
    fn identifier(&self) -> &str;
}

/// Check a requested range against the object size.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    if offset.checked_add(len as u64).map_or(true, |end| end > size) {
        return Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        });
    }
    Ok(())
}

// =============================================================================
// Memory
// =============================================================================

/// Range reads over bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Local files
// =============================================================================

/// Range reads from a local file.
#[derive(Debug, Clone)]
pub struct LocalRangeReader {
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl LocalRangeReader {
    /// Open `path`, reading its size from the filesystem.
    pub async fn new(path: PathBuf) -> Result<Self, IoError> {
        let identifier = path.display().to_string();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| local_error(&identifier, e))?;
        Ok(Self {
            path,
            size: metadata.len(),
            identifier,
        })
    }
}

fn local_error(identifier: &str, e: std::io::Error) -> IoError {
    match e.kind() {
        std::io::ErrorKind::NotFound => IoError::NotFound(identifier.to_string()),
        _ => IoError::Local(format!("{}: {}", identifier, e)),
    }
}

#[async_trait]
impl RangeReader for LocalRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| local_error(&self.identifier, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| local_error(&self.identifier, e))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)
            .await
            .map_err(|e| local_error(&self.identifier, e))?;
        Ok(Bytes::from(buffer))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Range reads over HTTP(S) with `Range` requests.
///
/// The object size comes from a HEAD request, or from the `Content-Range`
/// of a one-byte GET when the server does not report a length.
#[derive(Clone)]
pub struct HttpRangeReader {
    client: reqwest::Client,
    url: url::Url,
    size: u64,
    identifier: String,
}

impl HttpRangeReader {
    pub async fn new(client: reqwest::Client, url: url::Url) -> Result<Self, IoError> {
        let identifier = url.to_string();

        let head = client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;
        check_status(&identifier, head.status())?;

        let size = match head.content_length().filter(|len| *len > 0) {
            Some(size) => size,
            None => Self::size_from_range(&client, &url, &identifier).await?,
        };

        Ok(Self {
            client,
            url,
            size,
            identifier,
        })
    }

    async fn size_from_range(
        client: &reqwest::Client,
        url: &url::Url,
        identifier: &str,
    ) -> Result<u64, IoError> {
        let response = client
            .get(url.clone())
            .header(reqwest::header::RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;
        check_status(identifier, response.status())?;

        // "bytes 0-0/12345"
        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|total| total.parse::<u64>().ok())
            .ok_or_else(|| IoError::Http(format!("{} did not report its size", identifier)))
    }
}

fn check_status(identifier: &str, status: reqwest::StatusCode) -> Result<(), IoError> {
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(IoError::NotFound(identifier.to_string()));
    }
    if !status.is_success() {
        return Err(IoError::Http(format!("{} returned {}", identifier, status)));
    }
    Ok(())
}

#[async_trait]
impl RangeReader for HttpRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        // Build range header: "bytes=start-end" (inclusive on both ends)
        let range = format!("bytes={}-{}", offset, offset + len as u64 - 1);
        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::RANGE, range)
            .send()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;
        let status = response.status();
        check_status(&self.identifier, status)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;

        // Servers ignoring the Range header send the whole object
        let data = if status == reqwest::StatusCode::PARTIAL_CONTENT {
            body
        } else {
            let start = offset as usize;
            if body.len() < start + len {
                return Err(IoError::Http(format!(
                    "{} returned {} bytes, expected at least {}",
                    self.identifier,
                    body.len(),
                    start + len
                )));
            }
            body.slice(start..start + len)
        };

        if data.len() != len {
            return Err(IoError::Http(format!(
                "{} returned {} bytes for a {} byte range",
                self.identifier,
                data.len(),
                len
            )));
        }
        Ok(data)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
