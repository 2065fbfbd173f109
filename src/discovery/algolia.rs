//! Hosted search index client
//!
//! Sends title-restricted prefix queries and reads back identifiers only.

use crate::discovery::{DiscoveryError, SearchConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Maximum hits the index returns for one query page
pub const HITS_PER_PAGE: usize = 1000;

/// One page of results for a prefix query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Identifiers in the order the index returned them
    pub ids: Vec<String>,

    /// Total number of matches reported by the index (`nbHits`)
    pub total_hits: usize,
}

/// A search backend queried by prefix
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Runs a single prefix query (first page only)
    async fn query_prefix(&self, prefix: &str) -> Result<SearchPage, DiscoveryError>;
}

/// Raw query response; `null` counts are treated like absent ones
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "nbHits", default)]
    nb_hits: Option<usize>,

    #[serde(default)]
    hits: Option<Vec<Value>>,
}

/// Algolia-compatible query endpoint
#[derive(Debug, Clone)]
pub struct AlgoliaIndex {
    client: Client,
    endpoint: String,
    app_id: String,
    api_key: String,
    language_filter: String,
}

impl AlgoliaIndex {
    /// Creates an index client
    ///
    /// # Arguments
    ///
    /// * `search` - Credentials and index name from the bootstrap page
    /// * `endpoint` - Query URL override; `None` uses the hosted DSN endpoint
    /// * `language` - Language code used for the `language:xx` filter
    /// * `timeout` - Per-request timeout
    pub fn new(
        search: &SearchConfig,
        endpoint: Option<&str>,
        language: &str,
        timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let endpoint = match endpoint {
            Some(url) => url.to_string(),
            None => default_endpoint(search),
        };
        url::Url::parse(&endpoint).map_err(|e| {
            DiscoveryError::InvalidEndpoint(format!("{}: {}", endpoint, e))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| DiscoveryError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            app_id: search.app_id.clone(),
            api_key: search.api_key.clone(),
            language_filter: format!("language:{}", language),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn query_body(&self, prefix: &str) -> Value {
        json!({
            "query": prefix,
            "page": 0,
            "hitsPerPage": HITS_PER_PAGE,
            "attributesToRetrieve": ["id"],
            "filters": self.language_filter,
            "restrictSearchableAttributes": ["title"],
        })
    }
}

/// `https://{app}-dsn.algolia.net/1/indexes/{index}/query`
pub fn default_endpoint(search: &SearchConfig) -> String {
    format!(
        "https://{}-dsn.algolia.net/1/indexes/{}/query",
        search.app_id.to_lowercase(),
        search.index_name
    )
}

#[async_trait]
impl SearchIndex for AlgoliaIndex {
    async fn query_prefix(&self, prefix: &str) -> Result<SearchPage, DiscoveryError> {
        let query_err = |message: String| DiscoveryError::Query {
            prefix: prefix.to_string(),
            message,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Algolia-Application-Id", &self.app_id)
            .header("X-Algolia-API-Key", &self.api_key)
            .json(&self.query_body(prefix))
            .send()
            .await
            .map_err(|e| query_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(query_err(format!("HTTP {}", status.as_u16())));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| query_err(format!("malformed response: {}", e)))?;

        Ok(SearchPage {
            ids: body.hits.unwrap_or_default().iter().filter_map(hit_id).collect(),
            total_hits: body.nb_hits.unwrap_or(0),
        })
    }
}

/// Reads a hit's identifier from `id`, falling back to `objectID`
fn hit_id(hit: &Value) -> Option<String> {
    ["id", "objectID"].iter().find_map(|key| {
        let raw = match hit.get(*key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(raw).filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn search_config() -> SearchConfig {
        SearchConfig {
            app_id: "APP123".to_string(),
            api_key: "KEY".to_string(),
            index_name: "recipes-de".to_string(),
        }
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            default_endpoint(&search_config()),
            "https://app123-dsn.algolia.net/1/indexes/recipes-de/query"
        );
    }

    #[test]
    fn test_hit_id_fallback() {
        assert_eq!(hit_id(&json!({"id": " r1 "})), Some("r1".to_string()));
        assert_eq!(hit_id(&json!({"objectID": "r2"})), Some("r2".to_string()));
        assert_eq!(
            hit_id(&json!({"id": "", "objectID": "r3"})),
            Some("r3".to_string())
        );
        assert_eq!(hit_id(&json!({"id": "  "})), None);
        assert_eq!(hit_id(&json!({"title": "Soup"})), None);
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = AlgoliaIndex::new(
            &search_config(),
            Some("not a url"),
            "de",
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(DiscoveryError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_query_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("X-Algolia-Application-Id", "APP123"))
            .and(header("X-Algolia-API-Key", "KEY"))
            .and(body_partial_json(json!({
                "query": "Sup",
                "page": 0,
                "hitsPerPage": 1000,
                "filters": "language:de",
                "attributesToRetrieve": ["id"],
                "restrictSearchableAttributes": ["title"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nbHits": 3,
                "hits": [{"id": "r1"}, {"objectID": "r2"}, {"id": ""}]
            })))
            .mount(&server)
            .await;

        let endpoint = format!("{}/query", server.uri());
        let index = AlgoliaIndex::new(
            &search_config(),
            Some(&endpoint),
            "de",
            Duration::from_secs(5),
        )
        .unwrap();

        let page = index.query_prefix("Sup").await.unwrap();
        assert_eq!(page.ids, vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(page.total_hits, 3);
    }

    #[tokio::test]
    async fn test_query_null_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nbHits": null,
                "hits": [{"id": "r1"}]
            })))
            .mount(&server)
            .await;

        let endpoint = format!("{}/query", server.uri());
        let index = AlgoliaIndex::new(
            &search_config(),
            Some(&endpoint),
            "de",
            Duration::from_secs(5),
        )
        .unwrap();

        let page = index.query_prefix("B").await.unwrap();
        assert_eq!(page.ids, vec!["r1".to_string()]);
        assert_eq!(page.total_hits, 0);

        let parsed: QueryResponse = serde_json::from_value(json!({"hits": null})).unwrap();
        assert!(parsed.hits.is_none());
        assert!(parsed.nb_hits.is_none());
    }

    #[tokio::test]
    async fn test_query_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let endpoint = format!("{}/query", server.uri());
        let index = AlgoliaIndex::new(
            &search_config(),
            Some(&endpoint),
            "de",
            Duration::from_secs(5),
        )
        .unwrap();

        match index.query_prefix("A").await {
            Err(DiscoveryError::Query { prefix, message }) => {
                assert_eq!(prefix, "A");
                assert!(message.contains("403"));
            }
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let endpoint = format!("{}/query", server.uri());
        let index = AlgoliaIndex::new(
            &search_config(),
            Some(&endpoint),
            "de",
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(matches!(
            index.query_prefix("A").await,
            Err(DiscoveryError::Query { .. })
        ));
    }
}
