use serde::{Deserialize, Serialize};

pub type SiteId = u64;
pub type PageId = u64;
pub type LemmaId = u64;
pub type IndexId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        }
    }
}

/// A site from the operator's configuration: origin URL plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// Unix epoch milliseconds of the last status change or page write.
    pub status_time: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// Path plus query relative to the site origin, always starting with `/`.
    pub path: String,
    pub code: u16,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub lemma: String,
    /// Number of pages of the site that contain the lemma at least once.
    pub frequency: u32,
}

/// Inverted-index entry: how often a lemma occurs on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: IndexId,
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    pub rank: f32,
}

pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
