//! Serves cached artifacts with conditional GET and single byte ranges.

use crate::error::DeliveryError;
use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Ten years, for URLs carrying a version marker.
pub const VERSIONED_MAX_AGE: u64 = 86400 * 365 * 10;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

lazy_static! {
    static ref ARTIFACT_NAME: Regex = Regex::new(r"^[a-f0-9]+-[a-f0-9]+\.[A-Za-z0-9]+$").unwrap();
}

/// What the client asked for, minus the path.
#[derive(Debug, Default, Clone)]
pub struct FetchOptions {
    /// A `v` query marker was present.
    pub versioned: bool,
    pub if_modified_since: Option<String>,
    pub range: Option<String>,
}

#[derive(Debug)]
pub struct Artifact {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, String)>,
    pub body: Vec<u8>,
}

impl Artifact {
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl IntoResponse for Artifact {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        for (name, value) in self.headers {
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

pub struct Delivery {
    root: PathBuf,
}

impl Delivery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    /// Maps a request path onto the cache directory without touching the
    /// filesystem. `..` that climbs out of the root is forbidden.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, DeliveryError> {
        let mut parts: Vec<&str> = Vec::new();
        for component in Path::new(request_path).components() {
            match component {
                Component::Normal(part) => {
                    parts.push(part.to_str().ok_or(DeliveryError::NotFound)?)
                }
                Component::ParentDir => {
                    parts.pop().ok_or(DeliveryError::Forbidden)?;
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        let relative = parts.join("/");
        if !ARTIFACT_NAME.is_match(&relative) {
            return Err(DeliveryError::NotFound);
        }
        Ok(self.root.join(relative))
    }

    pub async fn fetch(
        &self,
        request_path: &str,
        options: &FetchOptions,
    ) -> Result<Artifact, DeliveryError> {
        let path = self.resolve(request_path)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeliveryError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(DeliveryError::Forbidden);
        }

        let size = metadata.len();
        let modified: DateTime<Utc> = metadata.modified()?.into();

        let mut headers = vec![
            (header::LAST_MODIFIED, modified.format(HTTP_DATE).to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ];
        headers.extend(cache_headers(options.versioned, Utc::now()));

        if let Some(since) = options.if_modified_since.as_deref().and_then(parse_http_date) {
            if since.timestamp() >= modified.timestamp() {
                return Ok(Artifact {
                    status: StatusCode::NOT_MODIFIED,
                    headers,
                    body: Vec::new(),
                });
            }
        }

        headers.push((header::CONTENT_TYPE, content_type(&path).to_string()));

        match options.range.as_deref() {
            None => {
                let body = tokio::fs::read(&path).await?;
                headers.push((header::CONTENT_LENGTH, body.len().to_string()));
                Ok(Artifact {
                    status: StatusCode::OK,
                    headers,
                    body,
                })
            }
            Some(range) => {
                let (start, end) = parse_range(range, size)?;
                let mut file = tokio::fs::File::open(&path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                let mut body = vec![0u8; (end - start + 1) as usize];
                file.read_exact(&mut body).await?;

                headers.push((
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, size),
                ));
                headers.push((header::CONTENT_LENGTH, body.len().to_string()));
                Ok(Artifact {
                    status: StatusCode::PARTIAL_CONTENT,
                    headers,
                    body,
                })
            }
        }
    }
}

fn cache_headers(versioned: bool, now: DateTime<Utc>) -> Vec<(HeaderName, String)> {
    if versioned {
        let expires = now + ChronoDuration::seconds(VERSIONED_MAX_AGE as i64);
        vec![
            (header::EXPIRES, expires.format(HTTP_DATE).to_string()),
            (
                header::CACHE_CONTROL,
                format!("max-age={}", VERSIONED_MAX_AGE),
            ),
        ]
    } else {
        vec![(header::CACHE_CONTROL, "public".to_string())]
    }
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ogg") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Resolves a single `bytes=start-end` range against `size`. An open or
/// overlong end stops at the last byte. Anything else is unsatisfiable.
pub fn parse_range(value: &str, size: u64) -> Result<(u64, u64), DeliveryError> {
    let unsatisfiable = || DeliveryError::RangeNotSatisfiable { size };

    let spec = value.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
    if spec.contains(',') {
        return Err(unsatisfiable());
    }
    let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || size == 0 {
        return Err(unsatisfiable());
    }

    let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
    let end: u64 = if end.is_empty() {
        size - 1
    } else {
        end.parse().map_err(|_| unsatisfiable())?
    };

    if start > end || start >= size {
        return Err(unsatisfiable());
    }
    Ok((start, end.min(size - 1)))
}
