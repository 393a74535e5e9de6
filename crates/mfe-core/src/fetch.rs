//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Text resource fetchers backing the asset loader."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Retrieves a document or script body as text.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError>;
}

/// Fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        debug!(url = %url, "fetching resource");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| classify(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|err| classify(url, err))
    }
}

fn classify(url: &Url, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// In-memory fetcher serving canned bodies or statuses.
///
/// Unknown URLs fail like a refused connection.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, Result<String, u16>>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, body: impl Into<String>) -> &Self {
        self.responses
            .lock()
            .insert(canonical(url), Ok(body.into()));
        self
    }

    pub fn insert_status(&self, url: &str, status: u16) -> &Self {
        self.responses.lock().insert(canonical(url), Err(status));
        self
    }

    pub fn remove(&self, url: &str) {
        self.responses.lock().remove(&canonical(url));
    }

    /// Every URL requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        let url = canonical(url);
        self.requests.lock().iter().filter(|seen| **seen == url).count()
    }
}

fn canonical(url: &str) -> String {
    Url::parse(url)
        .map(|parsed| parsed.to_string())
        .unwrap_or_else(|_| url.to_owned())
}

#[async_trait]
impl ResourceFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        let key = url.to_string();
        self.requests.lock().push(key.clone());
        let response = self.responses.lock().get(&key).cloned();
        match response {
            Some(Ok(body)) => Ok(body),
            Some(Err(status)) => Err(FetchError::Status { url: key, status }),
            None => Err(FetchError::Network {
                url: key,
                message: "connection refused".to_owned(),
            }),
        }
    }
}
