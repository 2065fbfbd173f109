//! Breadth-first prefix traversal of the search index
//!
//! The index caps every query at `HITS_PER_PAGE` results. To enumerate the
//! whole catalogue the traversal queries every single-character prefix and
//! splits any saturated prefix into its single-character extensions, up to
//! `MAX_PREFIX_LEN` characters.

use crate::discovery::algolia::{SearchIndex, SearchPage, HITS_PER_PAGE};
use futures::stream::{self, Stream};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Characters a prefix is built from (68 characters)
pub const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÜabcdefghijklmnopqrstuvwxyzäöü0123456789";

/// Saturated prefixes shorter than this are subdivided
pub const MAX_PREFIX_LEN: usize = 3;

/// Lazy, finite identifier traversal
///
/// Each prefix is queried at most once and each identifier is yielded at most
/// once. A failed query is logged and treated as an empty result.
pub struct PrefixTraversal {
    index: Arc<dyn SearchIndex>,
    queue: VecDeque<String>,
    queried: HashSet<String>,
    seen: HashSet<String>,
    buffer: VecDeque<String>,
    query_delay: Duration,
    prefixes_queried: Arc<AtomicUsize>,
}

impl PrefixTraversal {
    /// Creates a traversal seeded with every single-character prefix
    pub fn new(index: Arc<dyn SearchIndex>, query_delay: Duration) -> Self {
        Self {
            index,
            queue: ALPHABET.chars().map(String::from).collect(),
            queried: HashSet::new(),
            seen: HashSet::new(),
            buffer: VecDeque::new(),
            query_delay,
            prefixes_queried: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of prefixes queried so far
    pub fn query_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.prefixes_queried)
    }

    pub fn prefixes_queried(&self) -> usize {
        self.prefixes_queried.load(Ordering::Relaxed)
    }

    /// Number of prefixes waiting to be queried
    pub fn queued_prefixes(&self) -> usize {
        self.queue.len()
    }

    /// Returns the next unseen identifier, or `None` once every prefix is done
    pub async fn next_id(&mut self) -> Option<String> {
        loop {
            if let Some(id) = self.buffer.pop_front() {
                return Some(id);
            }

            let prefix = self.queue.pop_front()?;
            if !self.queried.insert(prefix.clone()) {
                continue;
            }

            self.query(&prefix).await;
        }
    }

    /// Turns the traversal into a stream of identifiers
    pub fn into_stream(self) -> impl Stream<Item = String> + Send {
        stream::unfold(self, |mut traversal| async move {
            let id = traversal.next_id().await?;
            Some((id, traversal))
        })
    }

    async fn query(&mut self, prefix: &str) {
        let page = match self.index.query_prefix(prefix).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Search query for prefix '{}' failed: {}", prefix, e);
                SearchPage::default()
            }
        };
        self.prefixes_queried.fetch_add(1, Ordering::Relaxed);

        if should_subdivide(prefix, &page) {
            tracing::debug!(
                "Prefix '{}' saturated ({} total hits), subdividing",
                prefix,
                page.total_hits
            );
            for c in ALPHABET.chars() {
                let extended = format!("{}{}", prefix, c);
                if !self.queried.contains(&extended) {
                    self.queue.push_back(extended);
                }
            }
        }

        let mut fresh = 0;
        for id in page.ids {
            if self.seen.insert(id.clone()) {
                self.buffer.push_back(id);
                fresh += 1;
            }
        }
        tracing::debug!(
            "Prefix '{}': {} hits, {} new (total seen {})",
            prefix,
            page.total_hits,
            fresh,
            self.seen.len()
        );

        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
    }
}

fn should_subdivide(prefix: &str, page: &SearchPage) -> bool {
    page.ids.len() >= HITS_PER_PAGE
        && page.total_hits > HITS_PER_PAGE
        && prefix.chars().count() < MAX_PREFIX_LEN
}
