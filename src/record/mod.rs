//! Recipe record model
//!
//! A [`Record`] is what the extractor produces for one recipe page and what the
//! record store writes to `<output>/<id>.json`. Reading is lenient so that files
//! written by older versions of the scraper still load.

mod id;

pub use id::{IdError, RecordId, ID_PREFIX};

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single scraped recipe
///
/// Field order matches the on-disk JSON layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Site-assigned identifier (e.g. `r123456`)
    pub id: String,

    #[serde(default)]
    pub source_url: Option<String>,

    /// Language tag of the recipe content (e.g. `de-DE`)
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default)]
    pub rating_count: Option<u64>,

    #[serde(default)]
    pub rating_score: Option<f64>,

    /// Appliance versions the recipe supports (TM5, TM6, ...)
    #[serde(default, alias = "tm-versions", deserialize_with = "null_as_default")]
    pub tm_versions: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub ingredients: Vec<String>,

    /// Nutrition field name to value, e.g. `calories` -> `350 kcal`
    #[serde(default, deserialize_with = "null_as_default")]
    pub nutritions: BTreeMap<String, Option<String>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeSet<String>,
}

impl Record {
    /// Creates an empty record for the given identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Returns true if the record has meaningful content
    ///
    /// A record without ingredients and without steps is a retry candidate.
    pub fn is_complete(&self) -> bool {
        !self.ingredients.is_empty() || !self.steps.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
