use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::text::normalize_whitespace;

/// Coarse classification of a fetched body, taken from the response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Html,
    Pdf,
    Unknown,
}

#[derive(Debug, Clone)]
pub enum PageBody {
    Text(String),
    Bytes(Vec<u8>),
}

impl PageBody {
    pub fn len(&self) -> usize {
        match self {
            PageBody::Text(text) => text.len(),
            PageBody::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub kind: PageKind,
    pub body: PageBody,
    /// Cheap `<title>` sniff so later stages have a name for the page before
    /// full extraction runs. HTML only.
    pub title: Option<String>,
}

/// Fetch failures are always recoverable by the caller's DOM-snapshot
/// fallback, so they carry a message rather than joining the terminal
/// taxonomy directly.
#[derive(Debug, Clone)]
pub struct FetchError(pub String);

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seam for the coordinator; tests drive it with canned pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| format!("failed to build fetch client: {}", e))?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }
}

fn classify_content_type(header: Option<&str>) -> PageKind {
    let Some(header) = header else {
        return PageKind::Unknown;
    };
    let mime = header
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => PageKind::Html,
        "application/pdf" => PageKind::Pdf,
        _ => PageKind::Unknown,
    }
}

lazy_static! {
    static ref TITLE_RE: Regex = Regex::new(r"(?is)<title[^>]*>([^<]*)</title>").unwrap();
}

/// Pulls the `<title>` out of raw HTML without a full parse, bounded to 180
/// characters like the rest of the title plumbing.
pub fn sniff_html_title(html: &str) -> Option<String> {
    let captured = TITLE_RE.captures(html)?.get(1)?.as_str();
    let title = normalize_whitespace(captured);
    if title.is_empty() {
        return None;
    }
    Some(title.chars().take(180).collect())
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError("the remote fetch timed out".to_string())
                } else {
                    FetchError(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError(format!("the server answered {}", status)));
        }

        if let Some(declared) = response.content_length() {
            if declared as usize > self.max_bytes {
                return Err(FetchError(format!(
                    "remote content exceeds the {} MB limit",
                    self.max_bytes / (1024 * 1024)
                )));
            }
        }

        let kind = classify_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );

        // Read the body incrementally so an unlabelled oversized response is
        // rejected without buffering all of it first.
        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError(format!("body read failed: {}", e)))?;
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(FetchError(format!(
                    "remote content exceeds the {} MB limit",
                    self.max_bytes / (1024 * 1024)
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(url, ?kind, len = bytes.len(), "fetched remote content");

        if kind == PageKind::Pdf {
            return Ok(FetchedPage {
                kind,
                body: PageBody::Bytes(bytes),
                title: None,
            });
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let title = match kind {
            PageKind::Html => sniff_html_title(&text),
            _ => None,
        };
        Ok(FetchedPage {
            kind,
            body: PageBody::Text(text),
            title,
        })
    }
}
