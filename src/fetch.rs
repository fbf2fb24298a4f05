//! Remote image downloads.
//!
//! The optimizer only ever sees the [`Fetcher`] trait; production uses
//! [`HttpFetcher`] (blocking `reqwest`). Downloads run in fixed-size batches
//! on a dedicated rayon pool: each batch completes before the next starts,
//! and one URL failing never cancels its siblings.

use crate::types::Outcome;
use rayon::prelude::*;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} returned an empty body")]
    Empty { url: String },
}

/// Capability to download a URL's body.
pub trait Fetcher: Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher with a per-request timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes()?.to_vec();
        if body.is_empty() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }
        Ok(body)
    }
}

/// Download every URL, at most `concurrency` at a time.
///
/// Results come back in input order. Failures are logged and reported as
/// [`Outcome::Skipped`].
pub fn fetch_all(
    fetcher: &dyn Fetcher,
    urls: &[String],
    concurrency: usize,
) -> Vec<(String, Outcome<Vec<u8>>)> {
    let concurrency = concurrency.max(1);
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("fetch-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("download pool unavailable, fetching sequentially: {e}");
            None
        }
    };

    let mut results = Vec::with_capacity(urls.len());
    for batch in urls.chunks(concurrency) {
        let fetched: Vec<(String, Outcome<Vec<u8>>)> = match &pool {
            Some(pool) => pool.install(|| {
                batch
                    .par_iter()
                    .map(|url| (url.clone(), fetch_one(fetcher, url)))
                    .collect()
            }),
            None => batch
                .iter()
                .map(|url| (url.clone(), fetch_one(fetcher, url)))
                .collect(),
        };
        results.extend(fetched);
    }
    results
}

fn fetch_one(fetcher: &dyn Fetcher, url: &str) -> Outcome<Vec<u8>> {
    match fetcher.fetch(url) {
        Ok(bytes) => {
            debug!(url, bytes = bytes.len(), "downloaded image");
            Outcome::Done(bytes)
        }
        Err(e) => {
            warn!(url, "image download failed: {e}");
            Outcome::skipped(format!("download failed: {e}"))
        }
    }
}
