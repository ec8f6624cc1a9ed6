use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use crawler::AppConfig;
use http_body_util::BodyExt;
use search_core::{LemmaIndexWriter, Repository, SiteStatus, SledRepository, StemmingLemmatizer};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const CONFIG: &str = r#"{"sites": [{"url": "http://a.test/", "name": "Site A"}], "crawl": {"delay_ms": 0}}"#;

fn indexed_app() -> Router {
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let writer = LemmaIndexWriter::new(repo.clone(), Arc::new(StemmingLemmatizer::default()));
    let site = repo.create_site("http://a.test", "Site A", SiteStatus::Indexed).unwrap();
    let pages = [
        ("/one", "Rust Book", "rust rust rust crab", 0..10),
        ("/two", "Ocean", "rust ocean", 10..20),
        ("/three", "Nothing", "ocean ocean", 20..30),
    ];
    for (path, title, body, fillers) in pages {
        let filler: Vec<String> = fillers.map(|i| format!("zz{i}")).collect();
        let html = format!("<html><head><title>{title}</title></head><body><p>{body}</p><p>{}</p></body></html>", filler.join(" "));
        let page = repo.create_page(site.id, path, 200, &html).unwrap();
        writer.index_page(&page).unwrap();
    }
    let config = AppConfig::from_json(CONFIG).unwrap();
    server::build_app(server::AppState::new(&config, repo).unwrap())
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    call(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (status, json) = get(indexed_app(), "/api/search?query=rust").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    assert_eq!(json["count"], 2);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data[0]["uri"], "/one");
    assert_eq!(data[0]["site"], "http://a.test");
    assert_eq!(data[0]["siteName"], "Site A");
    assert_eq!(data[0]["relevance"].as_f64().unwrap(), 1.0);
    assert_eq!(data[1]["uri"], "/two");
    assert!(data[0]["snippet"].as_str().unwrap().contains("<b>"));
}

#[tokio::test]
async fn search_scopes_and_pages() {
    let (status, json) = get(indexed_app(), "/api/search?query=rust&site=http://a.test/&offset=1&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["uri"], "/two");
}

#[tokio::test]
async fn empty_query_is_a_failed_response() {
    for uri in ["/api/search", "/api/search?query=%20%20"] {
        let (status, json) = get(indexed_app(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["result"], false);
        assert_eq!(json["count"], 0);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(0));
        assert_eq!(json["error"], "empty search query");
    }
}

#[tokio::test]
async fn stop_without_run_fails() {
    let (status, json) = get(indexed_app(), "/api/stopIndexing").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert_eq!(json["error"], "indexing is not running");
}

#[tokio::test]
async fn index_page_outside_configured_sites_fails() {
    let req = Request::post("/api/indexPage")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("url=http%3A%2F%2Felsewhere.invalid%2Fpage"))
        .unwrap();
    let (status, json) = call(indexed_app(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert!(json["error"].as_str().unwrap().contains("elsewhere.invalid"));
}

#[tokio::test]
async fn statistics_report_counts() {
    let (status, json) = get(indexed_app(), "/api/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    let total = &json["statistics"]["total"];
    assert_eq!(total["sites"], 1);
    assert_eq!(total["pages"], 3);
    assert_eq!(total["indexing"], false);
    let detail = &json["statistics"]["detailed"][0];
    assert_eq!(detail["url"], "http://a.test");
    assert_eq!(detail["status"], "INDEXED");
    assert_eq!(detail["pages"], 3);
}

#[tokio::test]
async fn health() {
    let app = indexed_app();
    let resp = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
