//! Integration tests for the scraper
//!
//! These tests use wiremock to stand in for the recipe site and the search
//! index, and drive full runs end-to-end through the real HTTP session.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use thermomix_scraper::config::{Config, RunMode};
use thermomix_scraper::crawler::{Coordinator, HttpSession, PageExtractor};
use thermomix_scraper::state::CrawlState;
use thermomix_scraper::storage::RecordStore;
use thermomix_scraper::{CrawlError, Record};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const SEARCH_PATH: &str = "/1/indexes/recipes-title/query";

const PROFILE_PAGE: &str =
    r#"<html><body><core-user-profile name="Test Cook"></core-user-profile></body></html>"#;

const SEARCH_PAGE: &str = r#"<html><body><script id="__NEXT_DATA__" type="application/json">
    {"props":{"pageProps":{
        "algoliaAppId":"TESTAPP",
        "algoliaApiKeyData":{"apiKey":"search-key"},
        "algoliaIndices":{"recipes":{"title":"recipes-title"}}
    }}}
</script></body></html>"#;

/// Answers search queries from a prefix -> identifiers table
struct PrefixResponder {
    hits: HashMap<&'static str, Vec<String>>,
}

impl Respond for PrefixResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let query = body["query"].as_str().unwrap_or_default();
        let ids = self.hits.get(query).cloned().unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "nbHits": ids.len(),
            "hits": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
        }))
    }
}

fn recipe_page(title: &str) -> String {
    format!(
        r#"<html lang="de-DE"><head>
        <script type="application/ld+json">{{
            "@type": "Recipe",
            "name": "{}",
            "recipeIngredient": ["500 g Kartoffeln", "1 TL Salz"],
            "recipeInstructions": [{{"@type": "HowToStep", "text": "Kochen."}}],
            "keywords": "Beilage"
        }}</script></head>
        <body><div class="rdp-tm-versions__name">TM6</div></body></html>"#,
        title
    )
}

/// Mounts login, logout and the search bootstrap page
async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/profile/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PROFILE_PAGE))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/profile/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SEARCH_PAGE))
        .mount(server)
        .await;
}

async fn mount_search(server: &MockServer, hits: Vec<(&'static str, Vec<&str>)>) {
    let hits = hits
        .into_iter()
        .map(|(prefix, ids)| (prefix, ids.into_iter().map(str::to_string).collect()))
        .collect();

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(PrefixResponder { hits })
        .mount(server)
        .await;
}

async fn mount_recipe(server: &MockServer, id: &str, status: u16, expected_calls: u64) {
    let mut response = ResponseTemplate::new(status);
    if status == 200 {
        response = response.set_body_string(recipe_page(&format!("Rezept {}", id)));
    }

    Mock::given(method("GET"))
        .and(path(format!("/recipes/recipe/de-DE/{}", id)))
        .respond_with(response)
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, output: &Path) -> Config {
    let mut config = Config::default();
    config.site.base_url = Some(format!("{}/", server.uri()));
    config.site.search_endpoint = Some(format!("{}{}", server.uri(), SEARCH_PATH));
    config.credentials.username = Some("cook@example.com".to_string());
    config.credentials.password = Some("secret".to_string());
    config.output.directory = output.to_path_buf();
    config.timing.download_delay = 0.0;
    config.timing.query_delay = 0.0;
    config.timing.retry_delay = 0.0;
    config.timing.save_interval = 1;
    config
}

fn create_coordinator(config: Config) -> Coordinator {
    let session = HttpSession::new(&config).expect("Failed to build session");
    Coordinator::new(config, Box::new(session), Box::new(PageExtractor))
        .expect("Failed to create coordinator")
}

fn state_path(output: &Path) -> std::path::PathBuf {
    output.join(".scraper_state.json")
}

#[tokio::test]
async fn test_full_discovery_run() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_site(&server).await;
    mount_search(&server, vec![("K", vec!["r1", "r2"]), ("s", vec!["r2", "r3"])]).await;
    for id in ["r1", "r2", "r3"] {
        mount_recipe(&server, id, 200, 1).await;
    }

    let mut coordinator = create_coordinator(create_test_config(&server, output.path()));
    let stats = coordinator.run().await.expect("Run failed");

    assert_eq!(stats.discovered, 3);
    assert_eq!(stats.downloaded, 3);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.prefixes_queried, 68);
    assert!(!stats.interrupted);

    let store = RecordStore::new(output.path());
    let record = store.load("r2").unwrap().expect("r2 should be saved");
    assert_eq!(record.title, "Rezept r2");
    assert_eq!(record.ingredients, vec!["500 g Kartoffeln", "1 TL Salz"]);
    assert_eq!(record.steps, vec!["Kochen."]);
    assert_eq!(record.tm_versions, vec!["TM6"]);
    assert!(record.tags.contains("beilage"));
    assert_eq!(record.language.as_deref(), Some("de-DE"));

    // The on-disk layout keeps the documented key order
    let raw = std::fs::read_to_string(store.record_path("r1").unwrap()).unwrap();
    let id_pos = raw.find("\"id\"").unwrap();
    let tags_pos = raw.find("\"tags\"").unwrap();
    assert!(id_pos < tags_pos);

    // A clean full run leaves no recovery file behind
    assert!(!state_path(output.path()).exists());
}

#[tokio::test]
async fn test_single_slot_queue_delivers_every_record() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    let ids = vec!["r1", "r2", "r3", "r4", "r5", "r6"];
    mount_site(&server).await;
    mount_search(&server, vec![("D", ids.clone())]).await;
    for id in &ids {
        mount_recipe(&server, id, 200, 1).await;
    }

    let mut config = create_test_config(&server, output.path());
    config.timing.queue_capacity = 1;

    let stats = create_coordinator(config).run().await.expect("Run failed");

    assert_eq!(stats.discovered, 6);
    assert_eq!(stats.downloaded, 6);
    assert_eq!(stats.failures, 0);
    for id in &ids {
        assert!(output.path().join(format!("{}.json", id)).exists());
    }
    assert!(!state_path(output.path()).exists());
}

#[tokio::test]
async fn test_unsafe_search_hits_are_ignored() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();
    let output = root.path().join("out");
    let absolute = root.path().join("absolute").display().to_string();

    mount_site(&server).await;
    mount_search(
        &server,
        vec![("E", vec!["r1", "../escaped", absolute.as_str(), "r2/../r3"])],
    )
    .await;
    mount_recipe(&server, "r1", 200, 1).await;

    let stats = create_coordinator(create_test_config(&server, &output))
        .run()
        .await
        .expect("Run failed");

    assert_eq!(stats.discovered, 1);
    assert_eq!(stats.downloaded, 1);
    assert_eq!(stats.skipped, 3);
    assert!(output.join("r1.json").exists());
    assert!(!root.path().join("escaped.json").exists());
    assert!(!root.path().join("absolute.json").exists());
}

#[tokio::test]
async fn test_explicit_ids_skip_discovery() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_site(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_recipe(&server, "r42", 200, 1).await;

    let mut config = create_test_config(&server, output.path());
    config.run.recipe_ids = vec!["42".to_string(), "r42".to_string(), "".to_string()];

    let stats = create_coordinator(config).run().await.expect("Run failed");

    assert_eq!(stats.discovered, 1);
    assert_eq!(stats.downloaded, 1);
    assert_eq!(stats.skipped, 1);
    assert!(output.path().join("r42.json").exists());
}

#[tokio::test]
async fn test_failures_are_retried_and_keep_state() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_site(&server).await;
    mount_search(&server, vec![("A", vec!["r1", "r3"])]).await;
    mount_recipe(&server, "r1", 200, 1).await;
    // First attempt plus two retries
    mount_recipe(&server, "r3", 500, 3).await;

    let mut coordinator = create_coordinator(create_test_config(&server, output.path()));
    let stats = coordinator.run().await.expect("Run failed");

    assert_eq!(stats.downloaded, 1);
    assert_eq!(stats.failures, 1);
    assert!(!output.path().join("r3.json").exists());

    let state = CrawlState::load(&state_path(output.path()))
        .unwrap()
        .expect("State file should be kept after failures");
    assert!(state.failed.contains("r3"));
    assert!(state.completed.contains("r1"));
    assert!(state.pending.is_empty());
}

#[tokio::test]
async fn test_continue_mode_resumes_pending() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    let mut previous = CrawlState::default();
    previous.discovered = ["r1", "r2", "r3", "r4"].iter().map(|s| s.to_string()).collect();
    previous.pending = ["r1", "r2"].iter().map(|s| s.to_string()).collect();
    previous.failed = ["r3"].iter().map(|s| s.to_string()).collect();
    previous.completed = ["r4"].iter().map(|s| s.to_string()).collect();
    previous.save(&state_path(output.path())).unwrap();

    mount_site(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_recipe(&server, "r1", 200, 1).await;
    mount_recipe(&server, "r2", 200, 1).await;
    mount_recipe(&server, "r3", 200, 0).await;

    let mut config = create_test_config(&server, output.path());
    config.run.mode = RunMode::Continue;

    let mut coordinator = create_coordinator(config);
    let stats = coordinator.run().await.expect("Run failed");

    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.failures, 0);

    let state = coordinator.state();
    assert!(state.pending.is_empty());
    assert!(state.completed.contains("r1"));
    assert!(state.completed.contains("r2"));
    assert!(state.failed.contains("r3"));
    assert!(state_path(output.path()).exists());
}

#[tokio::test]
async fn test_skip_mode_skips_existing_records() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    RecordStore::new(output.path())
        .save(&Record {
            title: "Schon da".to_string(),
            steps: vec!["Fertig.".to_string()],
            ..Record::new("r1")
        })
        .unwrap();

    mount_site(&server).await;
    mount_search(&server, vec![("B", vec!["r1", "r2"])]).await;
    mount_recipe(&server, "r1", 200, 0).await;
    mount_recipe(&server, "r2", 200, 1).await;

    let stats = create_coordinator(create_test_config(&server, output.path()))
        .run()
        .await
        .expect("Run failed");

    assert_eq!(stats.discovered, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.downloaded, 1);

    let untouched = RecordStore::new(output.path()).load("r1").unwrap().unwrap();
    assert_eq!(untouched.title, "Schon da");
}

#[tokio::test]
async fn test_redownload_mode_updates_existing_records() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    RecordStore::new(output.path())
        .save(&Record {
            steps: vec!["Alt.".to_string()],
            ..Record::new("r1")
        })
        .unwrap();

    mount_site(&server).await;
    mount_search(&server, vec![("C", vec!["r1"])]).await;
    mount_recipe(&server, "r1", 200, 1).await;

    let mut config = create_test_config(&server, output.path());
    config.run.mode = RunMode::Redownload;

    let stats = create_coordinator(config).run().await.expect("Run failed");

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.downloaded, 0);

    let record = RecordStore::new(output.path()).load("r1").unwrap().unwrap();
    assert_eq!(record.steps, vec!["Kochen."]);
}

#[tokio::test]
async fn test_login_failure_aborts_run() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = create_coordinator(create_test_config(&server, output.path()))
        .run()
        .await;

    assert!(matches!(result, Err(CrawlError::Authentication(_))));
    assert!(RecordStore::new(output.path())
        .scan_existing()
        .unwrap()
        .is_empty());
}
