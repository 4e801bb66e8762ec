use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};

use super::{BundleError, BundleSource, Revalidation};
use crate::freshness::Fingerprint;

/// Bundle endpoint over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpBundleSource {
    client: reqwest::Client,
}

impl HttpBundleSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl BundleSource for HttpBundleSource {
    async fn get(
        &self,
        url: &str,
        if_none_match: Option<&str>,
    ) -> Result<Revalidation, BundleError> {
        let http_err = |source: reqwest::Error| BundleError::Http {
            url: url.to_string(),
            source,
        };

        let mut request = self.client.get(url);
        if let Some(token) = if_none_match {
            request = request.header(IF_NONE_MATCH, format!("\"{token}\""));
        }
        let response = request.send().await.map_err(http_err)?;

        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(Revalidation::NotModified),
            status if status.is_success() => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(unquote_etag);
                let body = response.text().await.map_err(http_err)?;
                let hash = etag.unwrap_or_else(|| Fingerprint::of(&body).to_hex());
                Ok(Revalidation::Modified { body, hash })
            }
            status => Err(BundleError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

/// `W/"abc"` / `"abc"` / `abc` → `abc`
pub(crate) fn unquote_etag(value: &str) -> String {
    value
        .trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .to_string()
}
