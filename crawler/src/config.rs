use anyhow::{anyhow, Context, Result};
use search_core::tokenizer::language_from_name;
use search_core::{LemmaExtractor, SiteConfig, StemmingLemmatizer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Operator configuration: which sites to index and how politely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sites: Vec<SiteConfig>,
    #[serde(default)]
    pub crawl: CrawlSettings,
    /// Stemmer language shared by indexing and search
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub user_agent: String,
    pub referrer: String,
    /// Pause before every page fetch
    pub delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Pages of one site fetched and indexed at the same time
    pub max_concurrency_per_site: usize,
    /// How long `stop` waits for each site's crawl before aborting it
    pub stop_grace_ms: u64,
    pub ignored_extensions: Vec<String>,
    /// Route requests through the proxy named by HTTP_PROXY/HTTPS_PROXY
    pub use_system_proxy: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; search-engine-rs-bot/0.1)".to_string(),
            referrer: "http://www.google.com".to_string(),
            delay_ms: 500,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            max_concurrency_per_site: 8,
            stop_grace_ms: 1000,
            ignored_extensions: [".zip", ".pdf", ".jpg", ".png", ".docx", ".xlsx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            use_system_proxy: true,
        }
    }
}

impl CrawlSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

fn default_language() -> String {
    "english".to_string()
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(raw)?;
        config.normalized()
    }

    /// Trims trailing slashes from site URLs, fills missing names and checks
    /// that every URL is an http(s) origin and the language is known.
    pub fn normalized(mut self) -> Result<Self> {
        for site in &mut self.sites {
            site.url = site.url.trim().trim_end_matches('/').to_string();
            let parsed = Url::parse(&site.url).with_context(|| format!("site url {}", site.url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow!("site url {} is not http(s)", site.url));
            }
            if site.name.trim().is_empty() {
                site.name = parsed.host_str().unwrap_or_default().to_string();
            }
        }
        if language_from_name(&self.language).is_none() {
            return Err(anyhow!("unsupported language {}", self.language));
        }
        if self.crawl.max_concurrency_per_site == 0 {
            self.crawl.max_concurrency_per_site = 1;
        }
        Ok(self)
    }

    pub fn extractor(&self) -> Result<Arc<dyn LemmaExtractor>> {
        let lemmatizer = StemmingLemmatizer::for_language(&self.language)
            .ok_or_else(|| anyhow!("unsupported language {}", self.language))?;
        Ok(Arc::new(lemmatizer))
    }
}
