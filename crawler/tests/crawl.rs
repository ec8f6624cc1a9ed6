use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use crawler::{AppConfig, Coordinator, CrawlSettings, STOPPED_BY_USER};
use search_core::{Error, Repository, SiteConfig, SiteStatus, SledRepository};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn coordinator(site_url: &str, repo: Arc<SledRepository>) -> Coordinator {
    let config = AppConfig {
        sites: vec![SiteConfig { url: site_url.to_string(), name: "Local".to_string() }],
        crawl: CrawlSettings { delay_ms: 0, request_timeout_secs: 60, stop_grace_ms: 2000, use_system_proxy: false, ..Default::default() },
        language: "english".to_string(),
    }
    .normalized()
    .unwrap();
    let extractor = config.extractor().unwrap();
    Coordinator::new(&config, repo, extractor).unwrap()
}

async fn finish(coordinator: &Coordinator) {
    tokio::time::timeout(Duration::from_secs(30), coordinator.wait_finished())
        .await
        .expect("crawl did not finish");
}

fn small_site(pdf_hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/",
            get(|| async {
                Html(
                    r#"<html><head><title>Home</title></head><body><p>Rust compilers and crawlers</p>
                    <a href="/b">b</a> <a href="/c">c</a> <a href="/">self</a>
                    <a href="/b#top">fragment</a> <a href="/c?page=2">query</a>
                    <a href="/manual.pdf">pdf</a> <a href="http://elsewhere.invalid/x">external</a>
                    </body></html>"#,
                )
            }),
        )
        .route("/b", get(|| async { Html("<html><body><p>Rust borrow checker</p><a href=\"/\">home</a></body></html>") }))
        .route("/c", get(|| async { Html("<html><body><p>Crawlers follow links</p><a href=\"/b\">b</a></body></html>") }))
        .route(
            "/manual.pdf",
            get(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Html("<p>not a pdf</p>")
            }),
        )
        .with_state(pdf_hits)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crawls_each_reachable_page_once() {
    let pdf_hits = Arc::new(AtomicUsize::new(0));
    let url = serve(small_site(pdf_hits.clone())).await;
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let coordinator = coordinator(&url, repo.clone());

    coordinator.start_indexing().unwrap();
    assert!(coordinator.is_indexing());
    finish(&coordinator).await;
    assert!(!coordinator.is_indexing());

    let site = repo.find_site_by_url(&url).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Indexed);
    assert_eq!(site.last_error, None);

    let mut paths: Vec<String> = repo.find_pages_by_site(site.id).unwrap().into_iter().map(|p| p.path).collect();
    paths.sort();
    assert_eq!(paths, vec!["/", "/b", "/c"]);
    assert_eq!(pdf_hits.load(Ordering::SeqCst), 0);

    // every lemma's frequency equals the number of pages indexing it
    let mut contributors: HashMap<u64, u32> = HashMap::new();
    for page in repo.find_pages_by_site(site.id).unwrap() {
        for entry in repo.find_indexes_by_page(page.id).unwrap() {
            *contributors.entry(entry.lemma_id).or_default() += 1;
        }
    }
    let lemmas = repo.find_lemmas_by_site(site.id).unwrap();
    assert!(!lemmas.is_empty());
    for lemma in &lemmas {
        assert_eq!(contributors.get(&lemma.id).copied().unwrap_or_default(), lemma.frequency, "{}", lemma.lemma);
    }
    let rust = lemmas.iter().find(|l| l.lemma == "rust").unwrap();
    assert_eq!(rust.frequency, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_pages_do_not_fail_the_site() {
    let router = Router::new()
        .route("/", get(|| async { Html("<p>start page</p><a href=\"/missing\">x</a><a href=\"/ok\">y</a>") }))
        .route("/ok", get(|| async { Html("<p>reachable page</p>") }));
    let url = serve(router).await;
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let coordinator = coordinator(&url, repo.clone());

    coordinator.start_indexing().unwrap();
    finish(&coordinator).await;

    let site = repo.find_site_by_url(&url).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Indexed);
    assert_eq!(repo.count_pages(site.id).unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_marks_unfinished_sites_failed() {
    let router = Router::new().route(
        "/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Html("<p>too late</p>")
        }),
    );
    let url = serve(router).await;
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let coordinator = coordinator(&url, repo.clone());

    coordinator.start_indexing().unwrap();
    assert!(matches!(coordinator.start_indexing(), Err(Error::AlreadyRunning)));
    tokio::time::sleep(Duration::from_millis(200)).await;

    coordinator.stop_indexing().await.unwrap();
    assert!(!coordinator.is_indexing());
    finish(&coordinator).await;

    let site = repo.find_site_by_url(&url).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Failed);
    assert_eq!(site.last_error.as_deref(), Some(STOPPED_BY_USER));
    assert_eq!(repo.count_pages(site.id).unwrap(), 0);

    assert!(matches!(coordinator.stop_indexing().await, Err(Error::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_without_run_is_rejected() {
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let coordinator = coordinator("http://127.0.0.1:9/", repo);
    assert_eq!(coordinator.sites()[0].url, "http://127.0.0.1:9");
    assert!(matches!(coordinator.stop_indexing().await, Err(Error::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_page_reindex_is_idempotent() {
    let router = Router::new().route("/doc", get(|| async { Html("<p>Lifetimes and lifetimes and borrowing</p>") }));
    let url = serve(router).await;
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let coordinator = coordinator(&url, repo.clone());
    let page_url = format!("{url}/doc");

    coordinator.index_single_page(&page_url).await.unwrap();
    let site = repo.find_site_by_url(&url).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Indexed);
    let mut first: Vec<(String, u32)> =
        repo.find_lemmas_by_site(site.id).unwrap().into_iter().map(|l| (l.lemma, l.frequency)).collect();
    first.sort();

    coordinator.index_single_page(&page_url).await.unwrap();
    let mut second: Vec<(String, u32)> =
        repo.find_lemmas_by_site(site.id).unwrap().into_iter().map(|l| (l.lemma, l.frequency)).collect();
    second.sort();

    assert_eq!(first, second);
    assert!(first.iter().all(|(_, f)| *f == 1));
    assert_eq!(repo.count_pages(site.id).unwrap(), 1);
    let page = repo.find_page_by_path(site.id, "/doc").unwrap().unwrap();
    let ranks: Vec<f32> = repo.find_indexes_by_page(page.id).unwrap().into_iter().map(|e| e.rank).collect();
    assert!(ranks.contains(&2.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_page_rejects_bad_input() {
    let router = Router::new().route("/gone", get(|| async { StatusCode::NOT_FOUND }));
    let url = serve(router).await;
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let coordinator = coordinator(&url, repo.clone());

    assert!(matches!(coordinator.index_single_page("not a url").await, Err(Error::InvalidUrl(_))));
    assert!(matches!(
        coordinator.index_single_page("http://elsewhere.invalid/page").await,
        Err(Error::OutOfScope(_))
    ));
    let missing = coordinator.index_single_page(&format!("{url}/gone")).await;
    assert!(matches!(missing, Err(Error::FetchFailed { .. })));
    let site = repo.find_site_by_url(&url).unwrap().unwrap();
    assert_eq!(repo.count_pages(site.id).unwrap(), 0);
}
