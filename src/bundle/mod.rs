//! Conditional bundle cache.
//!
//! One [`CacheRecord`] per URL. The stored hash doubles as the revalidation
//! token: the next fetch sends it as `If-None-Match`, and "not modified"
//! returns the cached body without re-executing anything. Records never
//! expire on their own; [`BundleCache::invalidate`] forces the next fetch to
//! skip revalidation.

mod http;

pub use http::HttpBundleSource;
pub(crate) use http::unquote_etag;

use std::future::Future;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::debug;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("request to `{url}` failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("`{url}` answered {status}")]
    Status { url: String, status: u16 },

    #[error("`{url}` answered not modified without a cached copy")]
    NoCachedCopy { url: String },
}

/// Server answer to a (conditional) bundle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation {
    NotModified,
    Modified { body: String, hash: String },
}

/// Transport used by [`BundleCache`].
pub trait BundleSource: Send + Sync {
    /// GET `url`, sending `if_none_match` as the revalidation token.
    fn get(
        &self,
        url: &str,
        if_none_match: Option<&str>,
    ) -> impl Future<Output = Result<Revalidation, BundleError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub hash: String,
    pub content: String,
    pub fetched_at: u64,
}

/// Result of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: String,
    pub hash: String,
    /// False when the content is what was already cached.
    pub fresh: bool,
}

pub struct BundleCache<S> {
    source: S,
    records: FxHashMap<String, CacheRecord>,
    skip_revalidation: bool,
}

impl<S: BundleSource> BundleCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            records: FxHashMap::default(),
            skip_revalidation: false,
        }
    }

    #[cfg(test)]
    pub fn record(&self, url: &str) -> Option<&CacheRecord> {
        self.records.get(url)
    }

    /// Force the next fetch to skip conditional revalidation.
    pub fn invalidate(&mut self) {
        self.skip_revalidation = true;
    }

    pub fn is_invalidated(&self) -> bool {
        self.skip_revalidation
    }

    /// Fetch `url`, revalidating against the cached hash when there is one.
    pub async fn fetch(&mut self, url: &str, now: u64) -> Result<Fetched, BundleError> {
        let token = if self.skip_revalidation {
            None
        } else {
            self.records.get(url).map(|r| r.hash.clone())
        };

        let answer = self.source.get(url, token.as_deref()).await?;
        self.skip_revalidation = false;

        match answer {
            Revalidation::NotModified => {
                let record = self
                    .records
                    .get(url)
                    .ok_or_else(|| BundleError::NoCachedCopy {
                        url: url.to_string(),
                    })?;
                debug!("bundle"; "{} not modified ({})", url, record.hash);
                Ok(Fetched {
                    content: record.content.clone(),
                    hash: record.hash.clone(),
                    fresh: false,
                })
            }
            Revalidation::Modified { body, hash } => {
                let fresh = self.records.get(url).is_none_or(|r| r.hash != hash);
                debug!("bundle"; "{} fetched ({}, fresh: {})", url, hash, fresh);
                self.records.insert(
                    url.to_string(),
                    CacheRecord {
                        hash: hash.clone(),
                        content: body.clone(),
                        fetched_at: now,
                    },
                );
                Ok(Fetched {
                    content: body,
                    hash,
                    fresh,
                })
            }
        }
    }
}
