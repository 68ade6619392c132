//! Positions feed retrieval.
//!
//! A [`PositionsFeed`] produces one [`Snapshot`] per call. Two sources are
//! provided:
//!
//! - [`HttpFeed`]: GETs a URL (the backend's `/api/vehicles` endpoint)
//! - [`FileFeed`]: reads a JSON fixture from disk, handy for demos and tests
//!
//! Both decode the body with [`parse_snapshot`], which accepts either the
//! `vehicles` list shape or a GeoJSON FeatureCollection.
//!
//! # Example
//!
//! ```ignore
//! use transithq::feed::{FeedSource, PositionsFeed};
//!
//! let feed = FeedSource::http("http://localhost:8000/api/vehicles").build()?;
//! let snapshot = feed.fetch().await?;
//! println!("{} vehicles", snapshot.len());
//! ```

mod error;
mod http;
mod parse;

pub use error::FeedError;
pub use http::{AsyncHttpClient, ReqwestClient, DEFAULT_TIMEOUT};
pub use parse::parse_snapshot;

#[cfg(test)]
pub use http::tests::MockHttpClient;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;

use crate::entity::Snapshot;

/// Default positions endpoint of the local backend.
pub const DEFAULT_FEED_URL: &str = "http://localhost:8000/api/vehicles";

/// A source of position snapshots.
pub trait PositionsFeed: Send + Sync {
    /// Retrieve and decode one snapshot.
    fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, FeedError>>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Positions feed served over HTTP.
pub struct HttpFeed<C: AsyncHttpClient = ReqwestClient> {
    client: C,
    url: String,
}

impl<C: AsyncHttpClient> HttpFeed<C> {
    /// Create a feed polling `url` with the given client.
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// The polled URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<C: AsyncHttpClient> PositionsFeed for HttpFeed<C> {
    fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, FeedError>> {
        Box::pin(async move {
            let body = self.client.get(&self.url).await?;
            parse_snapshot(&body, Utc::now())
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Positions feed read from a local JSON file on every poll.
#[derive(Debug, Clone)]
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    /// Create a feed reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PositionsFeed for FileFeed {
    fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, FeedError>> {
        Box::pin(async move {
            let body = tokio::fs::read(&self.path)
                .await
                .map_err(|e| FeedError::Io {
                    path: self.path.clone(),
                    message: e.to_string(),
                })?;
            parse_snapshot(&body, Utc::now())
        })
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Where positions come from, as configured.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSource {
    /// Poll an HTTP endpoint.
    Http { url: String, timeout: Duration },
    /// Re-read a JSON file.
    File(PathBuf),
}

impl FeedSource {
    /// HTTP source with the default timeout.
    pub fn http(url: impl Into<String>) -> Self {
        FeedSource::Http {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// File source.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        FeedSource::File(path.into())
    }

    /// Build the feed this source describes.
    pub fn build(&self) -> Result<Arc<dyn PositionsFeed>, FeedError> {
        match self {
            FeedSource::Http { url, timeout } => {
                let client = ReqwestClient::with_timeout(*timeout)?;
                Ok(Arc::new(HttpFeed::new(client, url.clone())))
            }
            FeedSource::File(path) => Ok(Arc::new(FileFeed::new(path.clone()))),
        }
    }
}

impl Default for FeedSource {
    fn default() -> Self {
        FeedSource::http(DEFAULT_FEED_URL)
    }
}
