use crate::error::Result;
use crate::model::{
    now_millis, IndexEntry, Lemma, LemmaId, Page, PageId, Site, SiteId, SiteStatus,
};
use crate::repo::Repository;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// [`Repository`] backed by an embedded sled database.
///
/// Each entity lives in its own tree keyed by big-endian id with a bincode
/// value. Unique keys and foreign-key lookups are kept in secondary trees whose
/// keys end with the referenced id:
///
/// - `site_by_url`: url -> site id
/// - `page_by_path`: site id ++ path -> page id
/// - `lemma_by_text`: site id ++ lemma -> lemma id
/// - `index_by_lemma`: lemma id ++ index id -> ()
/// - `index_by_page`: page id ++ index id -> ()
pub struct SledRepository {
    db: sled::Db,
    sites: sled::Tree,
    site_by_url: sled::Tree,
    pages: sled::Tree,
    page_by_path: sled::Tree,
    lemmas: sled::Tree,
    lemma_by_text: sled::Tree,
    indexes: sled::Tree,
    index_by_lemma: sled::Tree,
    index_by_page: sled::Tree,
}

impl SledRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens a throwaway database that is removed when dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            sites: db.open_tree("sites")?,
            site_by_url: db.open_tree("site_by_url")?,
            pages: db.open_tree("pages")?,
            page_by_path: db.open_tree("page_by_path")?,
            lemmas: db.open_tree("lemmas")?,
            lemma_by_text: db.open_tree("lemma_by_text")?,
            indexes: db.open_tree("indexes")?,
            index_by_lemma: db.open_tree("index_by_lemma")?,
            index_by_page: db.open_tree("index_by_page")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn next_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    fn remove_index_entry(&self, entry: &IndexEntry) -> Result<()> {
        self.indexes.remove(entry.id.to_be_bytes())?;
        self.index_by_lemma.remove(pair_key(entry.lemma_id, entry.id))?;
        self.index_by_page.remove(pair_key(entry.page_id, entry.id))?;
        Ok(())
    }

    fn indexes_under(&self, tree: &sled::Tree, owner: u64) -> Result<Vec<IndexEntry>> {
        let mut out = Vec::new();
        for kv in tree.scan_prefix(owner.to_be_bytes()) {
            let (key, _) = kv?;
            if let Some(entry) = get_row(&self.indexes, &tail_id(&key).to_be_bytes())? {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

impl Repository for SledRepository {
    fn create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        let site = Site {
            id: self.next_id()?,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: now_millis(),
            last_error: None,
        };
        put_row(&self.sites, &site.id.to_be_bytes(), &site)?;
        self.site_by_url.insert(url.as_bytes(), &site.id.to_be_bytes()[..])?;
        Ok(site)
    }

    fn find_site(&self, id: SiteId) -> Result<Option<Site>> {
        get_row(&self.sites, &id.to_be_bytes())
    }

    fn find_site_by_url(&self, url: &str) -> Result<Option<Site>> {
        match self.site_by_url.get(url.as_bytes())? {
            Some(id) => get_row(&self.sites, &tail_id(&id).to_be_bytes()),
            None => Ok(None),
        }
    }

    fn all_sites(&self) -> Result<Vec<Site>> {
        all_rows(&self.sites)
    }

    fn update_site(&self, site: &Site) -> Result<()> {
        put_row(&self.sites, &site.id.to_be_bytes(), site)
    }

    fn delete_all_sites(&self) -> Result<()> {
        self.sites.clear()?;
        self.site_by_url.clear()?;
        Ok(())
    }

    fn create_page(&self, site_id: SiteId, path: &str, code: u16, content: &str) -> Result<Page> {
        let page = Page {
            id: self.next_id()?,
            site_id,
            path: path.to_string(),
            code,
            content: content.to_string(),
        };
        put_row(&self.pages, &page.id.to_be_bytes(), &page)?;
        self.page_by_path.insert(scoped_key(site_id, path), &page.id.to_be_bytes()[..])?;
        Ok(page)
    }

    fn find_page(&self, id: PageId) -> Result<Option<Page>> {
        get_row(&self.pages, &id.to_be_bytes())
    }

    fn find_page_by_path(&self, site_id: SiteId, path: &str) -> Result<Option<Page>> {
        match self.page_by_path.get(scoped_key(site_id, path))? {
            Some(id) => get_row(&self.pages, &tail_id(&id).to_be_bytes()),
            None => Ok(None),
        }
    }

    fn page_exists(&self, site_id: SiteId, path: &str) -> Result<bool> {
        Ok(self.page_by_path.contains_key(scoped_key(site_id, path))?)
    }

    fn find_pages_by_site(&self, site_id: SiteId) -> Result<Vec<Page>> {
        let mut out = Vec::new();
        for kv in self.page_by_path.scan_prefix(site_id.to_be_bytes()) {
            let (_, id) = kv?;
            if let Some(page) = get_row(&self.pages, &id)? {
                out.push(page);
            }
        }
        Ok(out)
    }

    fn count_pages(&self, site_id: SiteId) -> Result<usize> {
        count_prefix(&self.page_by_path, site_id)
    }

    fn delete_page(&self, id: PageId) -> Result<()> {
        let Some(page) = self.find_page(id)? else {
            return Ok(());
        };
        self.delete_indexes_by_page(id)?;
        self.page_by_path.remove(scoped_key(page.site_id, &page.path))?;
        self.pages.remove(id.to_be_bytes())?;
        Ok(())
    }

    fn delete_pages_by_site(&self, site_id: SiteId) -> Result<()> {
        for page in self.find_pages_by_site(site_id)? {
            self.delete_page(page.id)?;
        }
        Ok(())
    }

    fn delete_all_pages(&self) -> Result<()> {
        self.pages.clear()?;
        self.page_by_path.clear()?;
        Ok(())
    }

    fn create_lemma(&self, site_id: SiteId, lemma: &str, frequency: u32) -> Result<Lemma> {
        let row = Lemma {
            id: self.next_id()?,
            site_id,
            lemma: lemma.to_string(),
            frequency,
        };
        put_row(&self.lemmas, &row.id.to_be_bytes(), &row)?;
        self.lemma_by_text.insert(scoped_key(site_id, lemma), &row.id.to_be_bytes()[..])?;
        Ok(row)
    }

    fn find_lemma(&self, site_id: SiteId, lemma: &str) -> Result<Option<Lemma>> {
        match self.lemma_by_text.get(scoped_key(site_id, lemma))? {
            Some(id) => get_row(&self.lemmas, &tail_id(&id).to_be_bytes()),
            None => Ok(None),
        }
    }

    fn find_lemma_by_id(&self, id: LemmaId) -> Result<Option<Lemma>> {
        get_row(&self.lemmas, &id.to_be_bytes())
    }

    fn find_lemmas_by_site(&self, site_id: SiteId) -> Result<Vec<Lemma>> {
        let mut out = Vec::new();
        for kv in self.lemma_by_text.scan_prefix(site_id.to_be_bytes()) {
            let (_, id) = kv?;
            if let Some(lemma) = get_row(&self.lemmas, &id)? {
                out.push(lemma);
            }
        }
        Ok(out)
    }

    fn all_lemmas(&self) -> Result<Vec<Lemma>> {
        all_rows(&self.lemmas)
    }

    fn count_lemmas(&self, site_id: SiteId) -> Result<usize> {
        count_prefix(&self.lemma_by_text, site_id)
    }

    fn update_lemma(&self, lemma: &Lemma) -> Result<()> {
        put_row(&self.lemmas, &lemma.id.to_be_bytes(), lemma)
    }

    fn delete_lemma(&self, id: LemmaId) -> Result<()> {
        let Some(lemma) = self.find_lemma_by_id(id)? else {
            return Ok(());
        };
        for entry in self.indexes_under(&self.index_by_lemma, id)? {
            self.remove_index_entry(&entry)?;
        }
        self.lemma_by_text.remove(scoped_key(lemma.site_id, &lemma.lemma))?;
        self.lemmas.remove(id.to_be_bytes())?;
        Ok(())
    }

    fn delete_all_lemmas(&self) -> Result<()> {
        self.lemmas.clear()?;
        self.lemma_by_text.clear()?;
        Ok(())
    }

    fn create_indexes(&self, page_id: PageId, entries: &[(LemmaId, f32)]) -> Result<Vec<IndexEntry>> {
        let mut rows = sled::Batch::default();
        let mut by_lemma = sled::Batch::default();
        let mut by_page = sled::Batch::default();
        let mut out = Vec::with_capacity(entries.len());
        for &(lemma_id, rank) in entries {
            let entry = IndexEntry { id: self.next_id()?, page_id, lemma_id, rank };
            rows.insert(&entry.id.to_be_bytes()[..], bincode::serialize(&entry)?);
            by_lemma.insert(&pair_key(lemma_id, entry.id)[..], &b""[..]);
            by_page.insert(&pair_key(page_id, entry.id)[..], &b""[..]);
            out.push(entry);
        }
        self.indexes.apply_batch(rows)?;
        self.index_by_lemma.apply_batch(by_lemma)?;
        self.index_by_page.apply_batch(by_page)?;
        Ok(out)
    }

    fn find_indexes_by_lemma(&self, lemma_id: LemmaId) -> Result<Vec<IndexEntry>> {
        self.indexes_under(&self.index_by_lemma, lemma_id)
    }

    fn find_indexes_by_page(&self, page_id: PageId) -> Result<Vec<IndexEntry>> {
        self.indexes_under(&self.index_by_page, page_id)
    }

    fn delete_indexes_by_page(&self, page_id: PageId) -> Result<()> {
        for entry in self.find_indexes_by_page(page_id)? {
            self.remove_index_entry(&entry)?;
        }
        Ok(())
    }

    fn delete_all_indexes(&self) -> Result<()> {
        self.indexes.clear()?;
        self.index_by_lemma.clear()?;
        self.index_by_page.clear()?;
        Ok(())
    }
}

fn put_row<T: Serialize>(tree: &sled::Tree, key: &[u8], row: &T) -> Result<()> {
    tree.insert(key, bincode::serialize(row)?)?;
    Ok(())
}

fn get_row<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn all_rows<T: DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for kv in tree.iter() {
        let (_, bytes) = kv?;
        out.push(bincode::deserialize(&bytes)?);
    }
    Ok(out)
}

fn count_prefix(tree: &sled::Tree, owner: u64) -> Result<usize> {
    let mut n = 0;
    for kv in tree.scan_prefix(owner.to_be_bytes()) {
        kv?;
        n += 1;
    }
    Ok(n)
}

fn scoped_key(owner: u64, text: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + text.len());
    key.extend_from_slice(&owner.to_be_bytes());
    key.extend_from_slice(text.as_bytes());
    key
}

fn pair_key(owner: u64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&owner.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

/// Ids are stored big-endian in the last eight bytes of secondary keys and values.
fn tail_id(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[bytes.len() - 8..]);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_paths_are_unique_per_site() {
        let repo = SledRepository::temporary().unwrap();
        let a = repo.create_site("http://a.test", "A", SiteStatus::Indexing).unwrap();
        let b = repo.create_site("http://b.test", "B", SiteStatus::Indexing).unwrap();
        repo.create_page(a.id, "/", 200, "<p>a</p>").unwrap();

        assert!(repo.page_exists(a.id, "/").unwrap());
        assert!(!repo.page_exists(b.id, "/").unwrap());
        assert_eq!(repo.count_pages(a.id).unwrap(), 1);
        assert_eq!(repo.count_pages(b.id).unwrap(), 0);
    }

    #[test]
    fn deleting_page_cascades_to_its_index_entries() {
        let repo = SledRepository::temporary().unwrap();
        let site = repo.create_site("http://a.test", "A", SiteStatus::Indexing).unwrap();
        let page = repo.create_page(site.id, "/x", 200, "").unwrap();
        let other = repo.create_page(site.id, "/y", 200, "").unwrap();
        let lemma = repo.create_lemma(site.id, "rust", 2).unwrap();
        repo.create_indexes(page.id, &[(lemma.id, 3.0)]).unwrap();
        repo.create_indexes(other.id, &[(lemma.id, 1.0)]).unwrap();

        repo.delete_page(page.id).unwrap();

        let left = repo.find_indexes_by_lemma(lemma.id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].page_id, other.id);
        assert!(repo.find_page_by_path(site.id, "/x").unwrap().is_none());
    }

    #[test]
    fn deleting_lemma_cascades_to_its_index_entries() {
        let repo = SledRepository::temporary().unwrap();
        let site = repo.create_site("http://a.test", "A", SiteStatus::Indexing).unwrap();
        let page = repo.create_page(site.id, "/", 200, "").unwrap();
        let rust = repo.create_lemma(site.id, "rust", 1).unwrap();
        let crab = repo.create_lemma(site.id, "crab", 1).unwrap();
        repo.create_indexes(page.id, &[(rust.id, 1.0), (crab.id, 2.0)]).unwrap();

        repo.delete_lemma(rust.id).unwrap();

        let left = repo.find_indexes_by_page(page.id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].lemma_id, crab.id);
        assert!(repo.find_lemma(site.id, "rust").unwrap().is_none());
    }

    #[test]
    fn purge_empties_everything() {
        let repo = SledRepository::temporary().unwrap();
        let site = repo.create_site("http://a.test", "A", SiteStatus::Indexed).unwrap();
        let page = repo.create_page(site.id, "/", 200, "").unwrap();
        let lemma = repo.create_lemma(site.id, "rust", 1).unwrap();
        repo.create_indexes(page.id, &[(lemma.id, 1.0)]).unwrap();

        repo.purge().unwrap();

        assert!(repo.all_sites().unwrap().is_empty());
        assert!(repo.all_lemmas().unwrap().is_empty());
        assert!(repo.find_page(page.id).unwrap().is_none());
        assert!(repo.find_indexes_by_page(page.id).unwrap().is_empty());
        assert!(repo.find_site_by_url("http://a.test").unwrap().is_none());
    }

    #[test]
    fn opens_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledRepository::open(dir.path().join("db")).unwrap();
        let site = repo.create_site("http://a.test", "A", SiteStatus::Indexing).unwrap();
        repo.flush().unwrap();

        assert_eq!(repo.find_site_by_url("http://a.test").unwrap(), Some(site));
        assert!(dir.path().join("db").exists());
    }
}
