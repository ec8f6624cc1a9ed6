use crate::config::{AppConfig, CrawlSettings};
use crate::fetch::Fetcher;
use crate::links::{is_ignored, origin, page_path};
use crate::worker::SiteCrawl;
use parking_lot::Mutex;
use search_core::stats::{collect_statistics, StatisticsResponse};
use search_core::{
    now_millis, Error, LemmaExtractor, LemmaIndexWriter, Page, Repository, Result, Site, SiteConfig, SiteId,
    SiteStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const STOPPED_BY_USER: &str = "indexing stopped by user";

/// Owns the lifecycle of a full indexing run and of single-page indexing.
///
/// Cloning is cheap; every clone drives the same run.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) repo: Arc<dyn Repository>,
    pub(crate) writer: LemmaIndexWriter,
    pub(crate) fetcher: Fetcher,
    pub(crate) settings: CrawlSettings,
    sites: Vec<SiteConfig>,
    run: Mutex<RunState>,
    indexing: watch::Sender<bool>,
    visited: Mutex<HashSet<String>>,
    // serializes read-modify-write of site rows
    site_lock: Mutex<()>,
    // serializes the exists-then-create of page rows
    page_lock: Mutex<()>,
}

struct RunState {
    token: CancellationToken,
    active: HashMap<SiteId, ActiveSite>,
}

struct ActiveSite {
    url: String,
    handle: JoinHandle<()>,
}

impl Coordinator {
    pub fn new(config: &AppConfig, repo: Arc<dyn Repository>, extractor: Arc<dyn LemmaExtractor>) -> Result<Self> {
        let fetcher = Fetcher::new(&config.crawl)?;
        let (indexing, _) = watch::channel(false);
        let shared = Shared {
            writer: LemmaIndexWriter::new(repo.clone(), extractor),
            repo,
            fetcher,
            settings: config.crawl.clone(),
            sites: config.sites.clone(),
            run: Mutex::new(RunState { token: CancellationToken::new(), active: HashMap::new() }),
            indexing,
            visited: Mutex::new(HashSet::new()),
            site_lock: Mutex::new(()),
            page_lock: Mutex::new(()),
        };
        Ok(Self { shared: Arc::new(shared) })
    }

    pub fn sites(&self) -> &[SiteConfig] {
        &self.shared.sites
    }

    pub fn is_indexing(&self) -> bool {
        *self.shared.indexing.borrow()
    }

    /// Resolves once no run is in progress.
    pub async fn wait_finished(&self) {
        let mut rx = self.shared.indexing.subscribe();
        let _ = rx.wait_for(|running| !running).await;
    }

    pub fn statistics(&self) -> Result<StatisticsResponse> {
        collect_statistics(self.shared.repo.as_ref(), &self.shared.sites, self.is_indexing())
    }

    /// Wipes all stored data and starts crawling every configured site.
    ///
    /// Returns as soon as the per-site crawls are spawned. Must be called
    /// from within a Tokio runtime.
    pub fn start_indexing(&self) -> Result<()> {
        let shared = &self.shared;
        let mut run = shared.run.lock();
        if *shared.indexing.borrow() {
            return Err(Error::AlreadyRunning);
        }
        shared.indexing.send_replace(true);
        let sites = match shared.prepare_run() {
            Ok(sites) => sites,
            Err(e) => {
                shared.indexing.send_replace(false);
                return Err(e);
            }
        };
        if sites.is_empty() {
            shared.indexing.send_replace(false);
            tracing::info!("no sites configured, nothing to index");
            return Ok(());
        }
        run.token = CancellationToken::new();
        for site in sites {
            let token = run.token.child_token();
            let url = site.url.clone();
            let id = site.id;
            let handle = tokio::spawn(run_site(shared.clone(), site, token));
            run.active.insert(id, ActiveSite { url, handle });
        }
        tracing::info!(sites = run.active.len(), "indexing started");
        Ok(())
    }

    /// Cancels the run, waits up to the grace period for each site's crawl,
    /// aborts the stragglers and marks unfinished sites as FAILED.
    pub async fn stop_indexing(&self) -> Result<()> {
        let shared = &self.shared;
        let (token, active) = {
            let mut run = shared.run.lock();
            if !*shared.indexing.borrow() {
                return Err(Error::NotRunning);
            }
            shared.indexing.send_replace(false);
            (run.token.clone(), std::mem::take(&mut run.active))
        };
        tracing::info!(sites = active.len(), "stopping indexing");
        token.cancel();

        let grace = shared.settings.stop_grace();
        for (site_id, mut site) in active {
            if tokio::time::timeout(grace, &mut site.handle).await.is_err() {
                tracing::warn!(site = %site.url, "crawl did not stop in time, aborting");
                site.handle.abort();
            }
            let marked = shared.update_site(site_id, |s| {
                if s.status != SiteStatus::Indexed {
                    s.status = SiteStatus::Failed;
                    s.last_error = Some(STOPPED_BY_USER.to_string());
                }
            });
            if let Err(e) = marked {
                tracing::error!(site = %site.url, error = %e, "could not record stop");
            }
        }
        tracing::info!("indexing stopped");
        Ok(())
    }

    /// Fetches one page of a configured site and (re)indexes it, replacing
    /// whatever was stored for the same path.
    pub async fn index_single_page(&self, url: &str) -> Result<()> {
        let shared = &self.shared;
        let parsed = Url::parse(url.trim()).map_err(|_| Error::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        let site_origin = origin(&parsed);
        let config = shared
            .sites
            .iter()
            .find(|s| s.url == site_origin)
            .ok_or_else(|| Error::OutOfScope(url.to_string()))?;

        let site = match shared.repo.find_site_by_url(&config.url)? {
            Some(site) => site,
            None => shared.repo.create_site(&config.url, &config.name, SiteStatus::Indexing)?,
        };
        if is_ignored(parsed.as_str(), &shared.settings.ignored_extensions) {
            tracing::info!(url = %parsed, "ignored extension, page not indexed");
            return Ok(());
        }

        tokio::time::sleep(shared.settings.delay()).await;
        let fetched = shared.fetcher.fetch(parsed.as_str()).await?;
        let path = page_path(&parsed);
        let page = shared.replace_page(site.id, &path, fetched.code, &fetched.body)?;
        shared.writer.index_page(&page)?;

        let in_run = shared.run.lock().active.contains_key(&site.id);
        shared.update_site(site.id, |s| {
            s.status_time = now_millis();
            if !in_run {
                s.status = SiteStatus::Indexed;
                s.last_error = None;
            }
        })?;
        tracing::info!(site = %site.url, path = %path, "page indexed");
        Ok(())
    }
}

impl Shared {
    /// Clears storage and caches, then creates one INDEXING row per site.
    fn prepare_run(&self) -> Result<Vec<Site>> {
        self.repo.purge()?;
        self.writer.reset();
        self.visited.lock().clear();
        self.sites
            .iter()
            .map(|s| self.repo.create_site(&s.url, &s.name, SiteStatus::Indexing))
            .collect()
    }

    fn finish_site(&self, site_id: SiteId) {
        let mut run = self.run.lock();
        run.active.remove(&site_id);
        if run.active.is_empty() && *self.indexing.borrow() {
            self.indexing.send_replace(false);
            tracing::info!("indexing finished");
        }
    }

    pub(crate) fn update_site<F: FnOnce(&mut Site)>(&self, site_id: SiteId, f: F) -> Result<()> {
        let _guard = self.site_lock.lock();
        if let Some(mut site) = self.repo.find_site(site_id)? {
            f(&mut site);
            self.repo.update_site(&site)?;
        }
        Ok(())
    }

    /// True when the URL had not been seen in this run; records it.
    pub(crate) fn mark_visited(&self, url: &str) -> bool {
        self.visited.lock().insert(url.to_string())
    }

    pub(crate) fn is_visited(&self, url: &str) -> bool {
        self.visited.lock().contains(url)
    }

    /// Creates the page row unless the site already has one at this path.
    pub(crate) fn insert_new_page(&self, site_id: SiteId, path: &str, code: u16, body: &str) -> Result<Option<Page>> {
        let _guard = self.page_lock.lock();
        if self.repo.page_exists(site_id, path)? {
            return Ok(None);
        }
        self.repo.create_page(site_id, path, code, body).map(Some)
    }

    fn replace_page(&self, site_id: SiteId, path: &str, code: u16, body: &str) -> Result<Page> {
        let _guard = self.page_lock.lock();
        if let Some(old) = self.repo.find_page_by_path(site_id, path)? {
            tracing::debug!(path = %path, "retracting previous version of page");
            self.writer.retract_page(&old)?;
        }
        self.repo.create_page(site_id, path, code, body)
    }
}

async fn run_site(shared: Arc<Shared>, site: Site, token: CancellationToken) {
    tracing::info!(site = %site.url, "site crawl started");
    let crawl = Arc::new(SiteCrawl::new(shared.clone(), site.clone(), token.clone()));

    // the root page runs as its own task so a panic is reported, not swallowed
    let mut root = JoinSet::new();
    root.spawn(crawl.crawl_page(site.url.clone()));
    let outcome = match root.join_next().await {
        Some(Ok(result)) => result,
        Some(Err(e)) => Err(Error::Crawl(e.to_string())),
        None => Ok(()),
    };

    let running = *shared.indexing.borrow();
    let recorded = match settled_status(&outcome, token.is_cancelled(), running) {
        None => {
            tracing::info!(site = %site.url, "site crawl interrupted");
            Ok(())
        }
        Some(status) => {
            let error = outcome.err().map(|e| e.to_string());
            match &error {
                Some(e) => tracing::error!(site = %site.url, error = %e, "site crawl failed"),
                None => {
                    let pages = shared.repo.count_pages(site.id).unwrap_or_default();
                    tracing::info!(site = %site.url, pages, "site indexed");
                }
            }
            shared.update_site(site.id, |s| {
                s.status = status;
                s.status_time = now_millis();
                s.last_error = error;
            })
        }
    };
    if let Err(e) = recorded {
        tracing::error!(site = %site.url, error = %e, "could not record site status");
    }
    shared.finish_site(site.id);
}

/// Status a finished site crawl records. `None` once the run was stopped
/// underneath it: the stop path owns the final status then.
fn settled_status(outcome: &Result<()>, cancelled: bool, running: bool) -> Option<SiteStatus> {
    if cancelled || !running {
        return None;
    }
    Some(match outcome {
        Ok(()) => SiteStatus::Indexed,
        Err(_) => SiteStatus::Failed,
    })
}
