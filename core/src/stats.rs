use crate::error::Result;
use crate::model::{now_millis, SiteConfig};
use crate::repo::Repository;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub result: bool,
    pub statistics: StatisticsData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsData {
    pub total: TotalStatistics,
    pub detailed: Vec<DetailedStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalStatistics {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub indexing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStatistics {
    pub url: String,
    pub name: String,
    pub status: String,
    pub status_time: i64,
    pub error: String,
    pub pages: usize,
    pub lemmas: usize,
}

/// Totals and per-site detail for every configured site. Sites that were
/// never crawled are reported as `NOT_INDEXED`.
pub fn collect_statistics(repo: &dyn Repository, sites: &[SiteConfig], indexing: bool) -> Result<StatisticsResponse> {
    let mut detailed = Vec::with_capacity(sites.len());
    let (mut pages, mut lemmas) = (0, 0);
    for configured in sites {
        let item = match repo.find_site_by_url(&configured.url)? {
            Some(site) => {
                let site_pages = repo.count_pages(site.id)?;
                let site_lemmas = repo.count_lemmas(site.id)?;
                pages += site_pages;
                lemmas += site_lemmas;
                DetailedStatistics {
                    url: configured.url.clone(),
                    name: configured.name.clone(),
                    status: site.status.as_str().to_string(),
                    status_time: site.status_time,
                    error: site.last_error.unwrap_or_default(),
                    pages: site_pages,
                    lemmas: site_lemmas,
                }
            }
            None => DetailedStatistics {
                url: configured.url.clone(),
                name: configured.name.clone(),
                status: "NOT_INDEXED".to_string(),
                status_time: now_millis(),
                error: String::new(),
                pages: 0,
                lemmas: 0,
            },
        };
        detailed.push(item);
    }
    tracing::debug!(sites = sites.len(), pages, lemmas, "statistics collected");
    Ok(StatisticsResponse {
        result: true,
        statistics: StatisticsData {
            total: TotalStatistics { sites: sites.len(), pages, lemmas, indexing },
            detailed,
        },
    })
}
