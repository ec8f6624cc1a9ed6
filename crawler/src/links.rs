use lazy_static::lazy_static;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::{Position, Url};

lazy_static! {
    static ref ANCHORS: Selector = Selector::parse("a[href]").expect("valid selector");
}

/// Absolute http(s) targets of every `<a href>` on the page, first occurrence order.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for a in doc.select(&ANCHORS) {
        let Some(href) = a.value().attr("href") else { continue };
        let Ok(u) = base.join(href.trim()) else { continue };
        if !u.scheme().starts_with("http") {
            continue;
        }
        let s = u.to_string();
        if seen.insert(s.clone()) {
            links.push(s);
        }
    }
    links
}

/// A link is followed only when it stays under the site's URL and carries
/// neither a fragment nor a query string. The site prefix must end at a path
/// boundary, so `http://a.test` does not cover `http://a.test.evil.com`.
pub fn is_crawlable(link: &str, site_url: &str) -> bool {
    let Some(rest) = link.strip_prefix(site_url) else {
        return false;
    };
    (rest.is_empty() || rest.starts_with('/')) && !link.contains('#') && !link.contains('?')
}

pub fn is_ignored(url: &str, extensions: &[String]) -> bool {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_lowercase(),
        Err(_) => url.to_lowercase(),
    };
    extensions.iter().any(|ext| path.ends_with(&ext.to_lowercase()))
}

/// Path and query of a URL relative to its origin; `/` for the bare origin.
pub fn page_path(url: &Url) -> String {
    url[Position::BeforePath..Position::AfterQuery].to_string()
}

pub fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}
