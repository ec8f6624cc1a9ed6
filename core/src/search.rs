use crate::error::{Error, Result};
use crate::html::{page_text, page_title};
use crate::model::{Lemma, Page, PageId, Site, SiteId};
use crate::repo::Repository;
use crate::snippet::{build_snippet, query_words};
use crate::tokenizer::LemmaExtractor;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Lemmas found on more than this share of a scope's lemma rows are dropped
/// from the query as too common to discriminate.
pub const MAX_LEMMA_SHARE: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub count: usize,
    pub data: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self { result: true, error: None, count: 0, data: Vec::new() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { result: false, error: Some(message.into()), count: 0, data: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub site: String,
    pub site_name: String,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    pub relevance: f64,
}

/// Page content parsed once per query.
struct Candidate {
    page: Page,
    text: String,
    // lemmas of the visible text as it reads now
    lemmas: HashSet<String>,
    absolute: f64,
}

pub struct SearchEngine {
    repo: Arc<dyn Repository>,
    extractor: Arc<dyn LemmaExtractor>,
}

impl SearchEngine {
    pub fn new(repo: Arc<dyn Repository>, extractor: Arc<dyn LemmaExtractor>) -> Self {
        Self { repo, extractor }
    }

    /// Ranked full-text search over one site (`site`) or all indexed sites.
    ///
    /// `count` in the response is the number of matching pages before the
    /// `[offset, offset + limit)` slice is taken.
    pub fn search(&self, query: &str, site: Option<&str>, offset: usize, limit: usize) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            tracing::warn!("empty search query");
            return Err(Error::EmptyQuery);
        }
        let query_lemmas = self.extractor.lemma_set(query);

        let sites = match site.map(|s| s.trim().trim_end_matches('/')).filter(|s| !s.is_empty()) {
            Some(url) => match self.repo.find_site_by_url(url)? {
                Some(site) => vec![site],
                None => {
                    tracing::info!(site = url, "search scoped to an unknown site");
                    return Ok(SearchResponse::empty());
                }
            },
            None => self.repo.all_sites()?,
        };
        let scope_lemmas: Vec<Lemma> = if sites.len() == 1 {
            self.repo.find_lemmas_by_site(sites[0].id)?
        } else {
            self.repo.all_lemmas()?
        };

        let selected = select_lemmas(query_lemmas.iter().map(String::as_str), &scope_lemmas);
        tracing::info!(
            query,
            query_lemmas = query_lemmas.len(),
            scope_lemmas = scope_lemmas.len(),
            selected = selected.len(),
            "search lemmas selected"
        );
        if selected.is_empty() {
            return Ok(SearchResponse::empty());
        }

        let candidates = self.score_pages(&sites, &selected)?;
        let max = candidates.values().map(|c| c.absolute).fold(0.0f64, f64::max);
        let site_by_id: HashMap<SiteId, &Site> = sites.iter().map(|s| (s.id, s)).collect();
        let words = query_words(query);

        let mut hits: Vec<SearchHit> = Vec::with_capacity(candidates.len());
        for candidate in candidates.into_values() {
            let Some(site) = site_by_id.get(&candidate.page.site_id) else { continue };
            let title = page_title(&candidate.page.content);
            hits.push(SearchHit {
                site: site.url.clone(),
                site_name: site.name.clone(),
                uri: candidate.page.path.clone(),
                snippet: build_snippet(&candidate.text, &title, &words),
                title,
                relevance: if max > 0.0 { candidate.absolute / max } else { 0.0 },
            });
        }
        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.site.cmp(&b.site))
                .then_with(|| a.uri.cmp(&b.uri))
        });

        let count = hits.len();
        let data: Vec<SearchHit> = hits.into_iter().skip(offset).take(limit).collect();
        tracing::info!(count, returned = data.len(), "search finished");
        Ok(SearchResponse { result: true, error: None, count, data })
    }

    /// Absolute relevance per page: the sum of the ranks of its index entries
    /// for the selected lemmas. A lemma only counts for a page whose visible
    /// text still yields it when run through the extractor.
    fn score_pages(&self, sites: &[Site], selected: &[String]) -> Result<HashMap<PageId, Candidate>> {
        let mut candidates: HashMap<PageId, Candidate> = HashMap::new();
        for site in sites {
            for lemma_text in selected {
                let Some(lemma) = self.repo.find_lemma(site.id, lemma_text)? else { continue };
                for entry in self.repo.find_indexes_by_lemma(lemma.id)? {
                    if !candidates.contains_key(&entry.page_id) {
                        let Some(page) = self.repo.find_page(entry.page_id)? else { continue };
                        let text = page_text(&page.content);
                        let lemmas = self.extractor.lemma_set(&text);
                        candidates.insert(entry.page_id, Candidate { lemmas, text, page, absolute: 0.0 });
                    }
                    if let Some(candidate) = candidates.get_mut(&entry.page_id) {
                        if candidate.lemmas.contains(lemma_text) {
                            candidate.absolute += entry.rank as f64;
                        }
                    }
                }
            }
        }
        candidates.retain(|_, c| c.absolute > 0.0);
        Ok(candidates)
    }
}

/// Keeps the query lemmas present in the scope whose summed page frequency
/// does not exceed [`MAX_LEMMA_SHARE`] of the scope's lemma rows, rarest first.
pub fn select_lemmas<'a>(query: impl IntoIterator<Item = &'a str>, scope: &[Lemma]) -> Vec<String> {
    let mut frequency: HashMap<&str, u64> = HashMap::new();
    for lemma in scope {
        *frequency.entry(lemma.lemma.as_str()).or_insert(0) += lemma.frequency as u64;
    }
    let limit = scope.len() as f64 * MAX_LEMMA_SHARE;
    let mut kept: Vec<(&str, u64)> = query
        .into_iter()
        .filter_map(|q| frequency.get(q).map(|&f| (q, f)))
        .filter(|&(_, f)| f as f64 <= limit)
        .collect();
    kept.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    kept.dedup_by(|a, b| a.0 == b.0);
    kept.into_iter().map(|(q, _)| q.to_string()).collect()
}
