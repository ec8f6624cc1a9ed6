use crate::error::Result;
use crate::html::page_text;
use crate::model::{IndexEntry, Lemma, LemmaId, Page, SiteId};
use crate::repo::Repository;
use crate::tokenizer::LemmaExtractor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns per-page lemma counts into lemma rows and inverted-index entries.
///
/// Lemma lookup, creation and frequency changes all happen under one lock so
/// two pages indexed concurrently never create the same `(site, lemma)` row
/// twice or lose an increment. The lock also guards the lemma cache, which
/// therefore always mirrors the stored frequency of every row it holds.
pub struct LemmaIndexWriter {
    repo: Arc<dyn Repository>,
    extractor: Arc<dyn LemmaExtractor>,
    cache: Mutex<HashMap<(SiteId, String), Lemma>>,
}

impl LemmaIndexWriter {
    pub fn new(repo: Arc<dyn Repository>, extractor: Arc<dyn LemmaExtractor>) -> Self {
        Self { repo, extractor, cache: Mutex::new(HashMap::new()) }
    }

    /// Forgets cached lemma rows. Must be called whenever storage is purged.
    pub fn reset(&self) {
        self.cache.lock().clear();
    }

    /// Extracts lemmas from the page's visible text and indexes them.
    pub fn index_page(&self, page: &Page) -> Result<Vec<IndexEntry>> {
        let lemmas = self.extractor.extract_lemmas(&page_text(&page.content));
        self.write_lemmas(page, &lemmas)
    }

    /// Records one contribution per distinct lemma, then one index entry per
    /// lemma with the raw occurrence count as rank. On failure the
    /// contributions already made for this page are withdrawn again.
    pub fn write_lemmas(&self, page: &Page, lemmas: &HashMap<String, usize>) -> Result<Vec<IndexEntry>> {
        if lemmas.is_empty() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<(LemmaId, f32)> = Vec::with_capacity(lemmas.len());
        {
            let mut cache = self.cache.lock();
            for (text, &count) in lemmas {
                match self.contribute(&mut cache, page.site_id, text) {
                    Ok(id) => entries.push((id, count as f32)),
                    Err(e) => {
                        self.rollback(&mut cache, page, &entries);
                        return Err(e);
                    }
                }
            }
        }
        match self.repo.create_indexes(page.id, &entries) {
            Ok(written) => {
                tracing::debug!(page = %page.path, lemmas = written.len(), "page indexed");
                Ok(written)
            }
            Err(e) => {
                tracing::warn!(page = %page.path, error = %e, "index write failed, withdrawing lemmas");
                self.rollback(&mut self.cache.lock(), page, &entries);
                Err(e)
            }
        }
    }

    fn rollback(&self, cache: &mut HashMap<(SiteId, String), Lemma>, page: &Page, entries: &[(LemmaId, f32)]) {
        let undone = self
            .repo
            .delete_indexes_by_page(page.id)
            .and_then(|_| entries.iter().try_for_each(|&(id, _)| self.withdraw(cache, id)));
        if let Err(e) = undone {
            tracing::error!(page = %page.path, error = %e, "could not withdraw lemmas, dropping cache");
            cache.clear();
        }
    }

    fn contribute(
        &self,
        cache: &mut HashMap<(SiteId, String), Lemma>,
        site_id: SiteId,
        text: &str,
    ) -> Result<LemmaId> {
        let key = (site_id, text.to_string());
        let existing = match cache.get(&key) {
            Some(lemma) => Some(lemma.clone()),
            None => self.repo.find_lemma(site_id, text)?,
        };
        let lemma = match existing {
            Some(mut lemma) => {
                lemma.frequency += 1;
                self.repo.update_lemma(&lemma)?;
                lemma
            }
            None => self.repo.create_lemma(site_id, text, 1)?,
        };
        let id = lemma.id;
        cache.insert(key, lemma);
        Ok(id)
    }

    /// Removes a page together with everything it contributed: its index
    /// entries are deleted and every lemma it touched loses one page of
    /// frequency, disappearing when no page is left.
    pub fn retract_page(&self, page: &Page) -> Result<()> {
        let entries = self.repo.find_indexes_by_page(page.id)?;
        {
            let mut cache = self.cache.lock();
            for entry in &entries {
                self.withdraw(&mut cache, entry.lemma_id)?;
            }
        }
        self.repo.delete_page(page.id)?;
        tracing::debug!(page = %page.path, lemmas = entries.len(), "page retracted");
        Ok(())
    }

    /// Takes one page of frequency away from a lemma, deleting it at zero.
    fn withdraw(&self, cache: &mut HashMap<(SiteId, String), Lemma>, lemma_id: LemmaId) -> Result<()> {
        let Some(mut lemma) = self.repo.find_lemma_by_id(lemma_id)? else {
            return Ok(());
        };
        let key = (lemma.site_id, lemma.lemma.clone());
        if lemma.frequency <= 1 {
            self.repo.delete_lemma(lemma.id)?;
            cache.remove(&key);
        } else {
            lemma.frequency -= 1;
            self.repo.update_lemma(&lemma)?;
            cache.insert(key, lemma);
        }
        Ok(())
    }
}
