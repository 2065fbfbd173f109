//! Search configuration embedded in the site's search page
//!
//! The search page ships its client configuration as a Next.js data blob in
//! `<script id="__NEXT_DATA__">`. Everything the discovery client needs lives
//! under `props.pageProps`.

use crate::discovery::DiscoveryError;
use scraper::{Html, Selector};
use serde_json::Value;

/// Credentials and index name for the hosted search service
#[derive(Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub app_id: String,
    pub api_key: String,
    pub index_name: String,
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("index_name", &self.index_name)
            .finish()
    }
}

/// Index keys tried in order under `algoliaIndices.recipes`
const INDEX_KEYS: [&str; 3] = ["title", "relevance_empty", "relevance"];

/// Extracts the search configuration from the search page HTML
///
/// # Errors
///
/// * `DiscoveryError::MissingBootstrap` - No `__NEXT_DATA__` script on the page
/// * `DiscoveryError::InvalidBootstrap` - The script is not valid JSON
/// * `DiscoveryError::MissingField` - A required field is absent or empty
pub fn parse_bootstrap(html: &str) -> Result<SearchConfig, DiscoveryError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__")
        .map_err(|_| DiscoveryError::MissingBootstrap)?;

    let raw = document
        .select(&selector)
        .next()
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .ok_or(DiscoveryError::MissingBootstrap)?;

    let data: Value = serde_json::from_str(&raw).map_err(DiscoveryError::InvalidBootstrap)?;
    let props = data
        .pointer("/props/pageProps")
        .ok_or(DiscoveryError::MissingField("props.pageProps"))?;

    let app_id = non_empty_str(props.get("algoliaAppId"))
        .ok_or(DiscoveryError::MissingField("algoliaAppId"))?;

    let api_key = non_empty_str(props.pointer("/algoliaApiKeyData/apiKey"))
        .ok_or(DiscoveryError::MissingField("algoliaApiKeyData.apiKey"))?;

    let recipes = props.pointer("/algoliaIndices/recipes");
    let index_name = INDEX_KEYS
        .iter()
        .find_map(|key| non_empty_str(recipes.and_then(|r| r.get(*key))))
        .ok_or(DiscoveryError::MissingField("algoliaIndices.recipes"))?;

    Ok(SearchConfig {
        app_id,
        api_key,
        index_name,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
