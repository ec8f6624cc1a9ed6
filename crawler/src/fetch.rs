use crate::config::CrawlSettings;
use reqwest::{header, Client};
use search_core::{Error, Result};
use std::time::Duration;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub code: u16,
    pub body: String,
}

/// HTTP client with the crawler's identity and timeouts baked in.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(settings: &CrawlSettings) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let referrer = header::HeaderValue::from_str(&settings.referrer)
            .map_err(|e| Error::Crawl(format!("invalid referrer: {e}")))?;
        headers.insert(header::REFERER, referrer);
        let mut builder = Client::builder();
        if !settings.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::Crawl(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetches an HTML page. Non-success statuses, non-HTML content and
    /// oversized bodies are reported as [`Error::FetchFailed`].
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let failed = |reason: String| Error::FetchFailed { url: url.to_string(), reason };
        let resp = self.client.get(url).send().await.map_err(|e| failed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {status}")));
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
            if let Ok(v) = ct.to_str() {
                if !(v.starts_with("text/html") || v.starts_with("application/xhtml+xml")) {
                    return Err(failed(format!("unsupported content type {v}")));
                }
            }
        }
        let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(failed(format!("body of {} bytes is too large", bytes.len())));
        }
        Ok(FetchedPage { code: status.as_u16(), body: String::from_utf8_lossy(&bytes).into_owned() })
    }
}
