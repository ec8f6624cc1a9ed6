use crate::error::Result;
use crate::model::{
    IndexEntry, Lemma, LemmaId, Page, PageId, Site, SiteId, SiteStatus,
};

/// Row store for sites, pages, lemmas and inverted-index entries.
///
/// Rows reference each other only by id. Deleting a page or a lemma removes
/// the index entries that point at it; nothing else cascades.
pub trait Repository: Send + Sync {
    // sites
    fn create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site>;
    fn find_site(&self, id: SiteId) -> Result<Option<Site>>;
    fn find_site_by_url(&self, url: &str) -> Result<Option<Site>>;
    fn all_sites(&self) -> Result<Vec<Site>>;
    fn update_site(&self, site: &Site) -> Result<()>;
    fn delete_all_sites(&self) -> Result<()>;

    // pages
    fn create_page(&self, site_id: SiteId, path: &str, code: u16, content: &str) -> Result<Page>;
    fn find_page(&self, id: PageId) -> Result<Option<Page>>;
    fn find_page_by_path(&self, site_id: SiteId, path: &str) -> Result<Option<Page>>;
    fn page_exists(&self, site_id: SiteId, path: &str) -> Result<bool>;
    fn find_pages_by_site(&self, site_id: SiteId) -> Result<Vec<Page>>;
    fn count_pages(&self, site_id: SiteId) -> Result<usize>;
    fn delete_page(&self, id: PageId) -> Result<()>;
    fn delete_pages_by_site(&self, site_id: SiteId) -> Result<()>;
    fn delete_all_pages(&self) -> Result<()>;

    // lemmas
    fn create_lemma(&self, site_id: SiteId, lemma: &str, frequency: u32) -> Result<Lemma>;
    fn find_lemma(&self, site_id: SiteId, lemma: &str) -> Result<Option<Lemma>>;
    fn find_lemma_by_id(&self, id: LemmaId) -> Result<Option<Lemma>>;
    fn find_lemmas_by_site(&self, site_id: SiteId) -> Result<Vec<Lemma>>;
    fn all_lemmas(&self) -> Result<Vec<Lemma>>;
    fn count_lemmas(&self, site_id: SiteId) -> Result<usize>;
    fn update_lemma(&self, lemma: &Lemma) -> Result<()>;
    fn delete_lemma(&self, id: LemmaId) -> Result<()>;
    fn delete_all_lemmas(&self) -> Result<()>;

    // index entries
    fn create_indexes(&self, page_id: PageId, entries: &[(LemmaId, f32)]) -> Result<Vec<IndexEntry>>;
    fn find_indexes_by_lemma(&self, lemma_id: LemmaId) -> Result<Vec<IndexEntry>>;
    fn find_indexes_by_page(&self, page_id: PageId) -> Result<Vec<IndexEntry>>;
    fn delete_indexes_by_page(&self, page_id: PageId) -> Result<()>;
    fn delete_all_indexes(&self) -> Result<()>;

    /// Drops every row of every entity.
    fn purge(&self) -> Result<()> {
        self.delete_all_indexes()?;
        self.delete_all_lemmas()?;
        self.delete_all_pages()?;
        self.delete_all_sites()
    }
}
