use std::path::{Path, PathBuf};

use url::Url;

use crate::error::IoError;

/// Where a STAC item or an asset lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// `http://` or `https://` URL
    Http(Url),

    /// `s3://bucket/key`
    S3 { bucket: String, key: String },

    /// Path on the local filesystem
    Local(PathBuf),
}

impl Location {
    /// Parse a location string.
    ///
    /// Strings without a recognised scheme are treated as local paths.
    pub fn parse(location: &str) -> Result<Self, IoError> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(IoError::InvalidLocation("empty location".to_string()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|e| IoError::InvalidLocation(format!("{}: {}", trimmed, e)))?;
            return Ok(Location::Http(url));
        }

        if lower.starts_with("s3://") {
            let url = Url::parse(trimmed)
                .map_err(|e| IoError::InvalidLocation(format!("{}: {}", trimmed, e)))?;
            return Self::from_s3_url(&url);
        }

        if lower.starts_with("file://") {
            let url = Url::parse(trimmed)
                .map_err(|e| IoError::InvalidLocation(format!("{}: {}", trimmed, e)))?;
            let path = url
                .to_file_path()
                .map_err(|_| IoError::InvalidLocation(trimmed.to_string()))?;
            return Ok(Location::Local(path));
        }

        Ok(Location::Local(PathBuf::from(trimmed)))
    }

    fn from_s3_url(url: &Url) -> Result<Self, IoError> {
        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| IoError::InvalidLocation(format!("{}: missing bucket", url)))?
            .to_string();
        let key = url.path().trim_start_matches('/').to_string();
        if key.is_empty() {
            return Err(IoError::InvalidLocation(format!("{}: missing key", url)));
        }
        Ok(Location::S3 { bucket, key })
    }

    /// Resolve `href` relative to this location.
    ///
    /// Absolute hrefs (with a scheme, or absolute paths) are returned as-is.
    pub fn join(&self, href: &str) -> Result<Location, IoError> {
        if has_scheme(href) || Path::new(href).is_absolute() {
            return Location::parse(href);
        }

        match self {
            Location::Http(base) => base
                .join(href)
                .map(Location::Http)
                .map_err(|e| IoError::InvalidLocation(format!("{}: {}", href, e))),
            Location::S3 { .. } => {
                let base = Url::parse(&self.to_string())
                    .map_err(|e| IoError::InvalidLocation(format!("{}: {}", self, e)))?;
                let joined = base
                    .join(href)
                    .map_err(|e| IoError::InvalidLocation(format!("{}: {}", href, e)))?;
                Self::from_s3_url(&joined)
            }
            Location::Local(path) => {
                let parent = path.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Local(normalize(&parent.join(href))))
            }
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Http(url) => write!(f, "{}", url),
            Location::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
            Location::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

fn has_scheme(href: &str) -> bool {
    match href.find("://") {
        Some(idx) => href[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        None => false,
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
