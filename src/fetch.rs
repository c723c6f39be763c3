use std::future::Future;

use anyhow::{Context, Result};
use tracing::debug;

/// Anything that can return the markup behind a listing URL.
pub trait PageSource {
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<String>>;
}

/// Plain GET over reqwest, transport defaults.
pub struct HttpPages {
    client: reqwest::Client,
}

impl HttpPages {
    pub fn new(client: reqwest::Client) -> Self {
        HttpPages { client }
    }
}

impl PageSource for HttpPages {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let body = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch listing page {}", url))?
            .error_for_status()
            .with_context(|| format!("Listing page {} returned an error status", url))?
            .text()
            .await
            .with_context(|| format!("Failed to read listing page {}", url))?;
        Ok(body)
    }
}
