use crate::coordinator::Shared;
use crate::fetch::FetchedPage;
use crate::links::{extract_links, is_crawlable, is_ignored, page_path};
use futures::future::{BoxFuture, FutureExt};
use search_core::{now_millis, Error, Result, Site};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Recursive crawl of one site. Every discovered page becomes its own task;
/// the semaphore bounds how many of them fetch and index at once.
pub(crate) struct SiteCrawl {
    shared: Arc<Shared>,
    site: Site,
    token: CancellationToken,
    permits: Arc<Semaphore>,
}

impl SiteCrawl {
    pub(crate) fn new(shared: Arc<Shared>, site: Site, token: CancellationToken) -> Self {
        let permits = Arc::new(Semaphore::new(shared.settings.max_concurrency_per_site.max(1)));
        Self { shared, site, token, permits }
    }

    /// Visits `url`, then crawls every new in-scope link it points to and
    /// waits for all of them. The first storage failure below this page is
    /// returned once every child has finished.
    pub(crate) fn crawl_page(self: Arc<Self>, url: String) -> BoxFuture<'static, Result<()>> {
        async move {
            let Some(links) = self.visit(&url).await? else {
                return Ok(());
            };
            let mut children = JoinSet::new();
            for link in links {
                children.spawn(self.clone().crawl_page(link));
            }
            let mut first_error = None;
            while let Some(joined) = children.join_next().await {
                let result = joined.unwrap_or_else(|e| Err(Error::Crawl(e.to_string())));
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        }
        .boxed()
    }

    /// Fetches, stores and indexes one page. `None` means there is nothing
    /// to follow: cancelled, already seen, skipped or unreachable.
    async fn visit(&self, url: &str) -> Result<Option<Vec<String>>> {
        if self.token.is_cancelled() || !self.shared.mark_visited(url) {
            return Ok(None);
        }
        if is_ignored(url, &self.shared.settings.ignored_extensions) {
            tracing::debug!(url, "ignored extension");
            return Ok(None);
        }
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(url, error = %e, "unparsable link");
                return Ok(None);
            }
        };

        let Some(permit) = self.acquire().await else {
            return Ok(None);
        };
        let Some(fetched) = self.fetch(url).await else {
            return Ok(None);
        };
        if self.token.is_cancelled() {
            return Ok(None);
        }

        let path = page_path(&parsed);
        let Some(page) = self.shared.insert_new_page(self.site.id, &path, fetched.code, &fetched.body)? else {
            tracing::debug!(url, "page already stored");
            return Ok(None);
        };
        self.shared.update_site(self.site.id, |s| s.status_time = now_millis())?;
        self.shared.writer.index_page(&page)?;
        drop(permit);
        tracing::debug!(site = %self.site.url, path = %path, "page stored");

        let links = extract_links(&fetched.body, &parsed)
            .into_iter()
            .filter(|l| is_crawlable(l, &self.site.url) && !self.shared.is_visited(l))
            .collect();
        Ok(Some(links))
    }

    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            _ = self.token.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        }
    }

    /// Politeness delay then fetch, both abandoned on cancellation. Fetch
    /// failures are logged and end this branch of the crawl only.
    async fn fetch(&self, url: &str) -> Option<FetchedPage> {
        tokio::select! {
            _ = self.token.cancelled() => return None,
            _ = tokio::time::sleep(self.shared.settings.delay()) => {}
        }
        let result = tokio::select! {
            _ = self.token.cancelled() => return None,
            r = self.shared.fetcher.fetch(url) => r,
        };
        match result {
            Ok(page) => Some(page),
            Err(e) => {
                tracing::warn!(url, error = %e, "page fetch failed");
                None
            }
        }
    }
}
