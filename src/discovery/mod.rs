//! Discovery module for enumerating record identifiers
//!
//! Discovery reads the search configuration from the site's search page, then
//! walks the hosted search index by title prefix. Identifiers are produced as
//! a lazy stream so downloading can start before the walk finishes.
//!
//! # Components
//!
//! - `parse_bootstrap`: Extracts index credentials from the search page
//! - `AlgoliaIndex`: Prefix query client for the hosted index
//! - `PrefixTraversal`: Breadth-first prefix subdivision

mod algolia;
mod bootstrap;
mod traversal;

pub use algolia::{default_endpoint, AlgoliaIndex, SearchIndex, SearchPage, HITS_PER_PAGE};
pub use bootstrap::{parse_bootstrap, SearchConfig};
pub use traversal::{PrefixTraversal, ALPHABET, MAX_PREFIX_LEN};

use crate::config::Config;
use crate::crawler::{FetchError, Session};
use futures::Stream;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use thiserror::Error;

/// Discovery errors
///
/// Everything except `Query` is raised while initializing and aborts the run.
/// `Query` errors are contained by the traversal.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Search page has no embedded configuration")]
    MissingBootstrap,

    #[error("Search configuration is missing '{0}'")]
    MissingField(&'static str),

    #[error("Search configuration is not valid JSON: {0}")]
    InvalidBootstrap(serde_json::Error),

    #[error("Failed to load search page: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid search endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Query for prefix '{prefix}' failed: {message}")]
    Query { prefix: String, message: String },
}

/// Identifier discovery over the hosted search index
pub struct DiscoveryClient {
    traversal: PrefixTraversal,
}

impl DiscoveryClient {
    /// Loads the search page through the session and prepares the traversal
    ///
    /// # Errors
    ///
    /// Fails if the search page cannot be fetched, lacks the embedded search
    /// configuration, or the configured endpoint is not a URL.
    pub async fn initialize(
        config: &Config,
        session: &mut dyn Session,
    ) -> Result<Self, DiscoveryError> {
        let search_url = format!("{}search/", config.base_url());
        tracing::debug!("Loading search configuration from {}", search_url);

        let page = session.fetch_page(&search_url).await?;
        let search = parse_bootstrap(&page.html)?;

        let index = AlgoliaIndex::new(
            &search,
            config.site.search_endpoint.as_deref(),
            config.language_code(),
            config.timing.request_timeout(),
        )?;
        tracing::info!(
            "Search index '{}' ready at {}",
            search.index_name,
            index.endpoint()
        );

        Ok(Self::with_index(Arc::new(index), config))
    }

    /// Builds a client over an already configured index
    pub fn with_index(index: Arc<dyn SearchIndex>, config: &Config) -> Self {
        Self {
            traversal: PrefixTraversal::new(index, config.timing.query_delay()),
        }
    }

    /// Counter of prefixes queried, readable while the stream runs
    pub fn query_counter(&self) -> Arc<AtomicUsize> {
        self.traversal.query_counter()
    }

    /// Consumes the client into a stream of unique identifiers
    pub fn discover_all(self) -> impl Stream<Item = String> + Send {
        self.traversal.into_stream()
    }
}
