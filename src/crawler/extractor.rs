//! Recipe extraction from record pages
//!
//! Structured data (JSON-LD) is preferred. When it is missing or carries no
//! ingredients and no steps, the visible page markup is used instead. Rating,
//! appliance versions and page tags are always read from the markup.

use crate::crawler::Page;
use crate::record::Record;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

const INGREDIENT_SELECTORS: &[&str] = &[
    "#ingredients li",
    ".core-ingredient",
    "[class*='ingredient-item']",
    ".recipe-ingredients li",
    "[data-ingredient]",
    ".rdp-ingredients li",
];

const STEP_SELECTORS: &[&str] = &[
    "#preparation-steps li",
    ".core-step",
    "[class*='step-item']",
    ".recipe-steps li",
    ".rdp-steps li",
    "[data-step]",
];

const TITLE_SELECTORS: &[&str] = &[".recipe-card__title", "h1", "title"];

const TM_VERSIONS: [&str; 3] = ["TM5", "TM6", "TM7"];

/// Keys under which JSON-LD nests further objects
const NESTING_KEYS: [&str; 5] = [
    "@graph",
    "mainEntity",
    "mainEntityOfPage",
    "itemListElement",
    "hasPart",
];

/// Keys under which recipe instructions nest further steps
const STEP_KEYS: [&str; 4] = ["itemListElement", "steps", "step", "elements"];

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Page {url} contains no recipe")]
    EmptyPage { url: String },
}

/// Turns a record page into a [`Record`]
pub trait Extractor: Send + Sync {
    /// Extracts the record with identifier `id` from `page`
    ///
    /// `source_url` is stored on the record; when absent the page URL is used.
    fn extract(&self, page: &Page, id: &str, source_url: Option<&str>)
        -> Result<Record, ExtractError>;
}

/// Extractor for the site's recipe pages
#[derive(Debug, Clone, Copy, Default)]
pub struct PageExtractor;

impl Extractor for PageExtractor {
    fn extract(
        &self,
        page: &Page,
        id: &str,
        source_url: Option<&str>,
    ) -> Result<Record, ExtractError> {
        let document = Html::parse_document(&page.html);

        let mut record = Record::new(id);
        record.source_url = Some(source_url.unwrap_or(&page.url).to_string());

        let structured = find_json_ld_recipe(&document);
        if let Some(recipe) = &structured {
            apply_json_ld(&mut record, recipe);
        }

        if !record.is_complete() {
            tracing::debug!("No usable structured data for {}, reading markup", id);
            record.ingredients = select_texts(&document, INGREDIENT_SELECTORS);
            record.steps = select_texts(&document, STEP_SELECTORS);
            record.tags.extend(markup_tags(&document));
        }

        if record.title.is_empty() {
            record.title = TITLE_SELECTORS
                .iter()
                .find_map(|s| first_text(&document, s))
                .unwrap_or_default();
        }

        let (score, count) = markup_rating(&document);
        record.rating_score = score.or(record.rating_score);
        record.rating_count = count.or(record.rating_count);

        record.tm_versions = tm_versions(&document);

        if record.language.is_none() {
            record.language = html_lang(&document);
        }

        if structured.is_none() && record.title.is_empty() && !record.is_complete() {
            return Err(ExtractError::EmptyPage {
                url: page.url.clone(),
            });
        }

        tracing::debug!(
            "Extracted {}: {} ingredients, {} steps",
            id,
            record.ingredients.len(),
            record.steps.len()
        );
        Ok(record)
    }
}

// ===== JSON-LD =====

/// Returns the first JSON-LD object typed `Recipe`
fn find_json_ld_recipe(document: &Html) -> Option<Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    document.select(&selector).find_map(|script| {
        let raw = script.text().collect::<String>();
        let data: Value = serde_json::from_str(raw.trim()).ok()?;
        let mut objects = Vec::new();
        collect_objects(&data, &mut objects);
        objects.into_iter().find(|o| is_recipe(o)).cloned()
    })
}

fn collect_objects<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            out.push(node);
            for key in NESTING_KEYS {
                if let Some(child) = map.get(key) {
                    collect_objects(child, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_objects(item, out)),
        _ => {}
    }
}

fn is_recipe(object: &Value) -> bool {
    match object.get("@type") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("recipe"),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| t.eq_ignore_ascii_case("recipe")),
        _ => false,
    }
}

fn apply_json_ld(record: &mut Record, recipe: &Value) {
    record.title = recipe
        .get("name")
        .and_then(Value::as_str)
        .map(clean_text)
        .unwrap_or_default();

    record.ingredients = as_list(recipe.get("recipeIngredient"))
        .into_iter()
        .filter_map(scalar_string)
        .map(|s| clean_text(&s))
        .filter(|s| !s.is_empty())
        .collect();

    let mut steps = Vec::new();
    flatten_steps(recipe.get("recipeInstructions"), &mut steps);
    record.steps = steps;

    if let Some(Value::Object(nutrition)) = recipe.get("nutrition") {
        for (key, value) in nutrition.iter().filter(|(k, _)| !k.starts_with('@')) {
            let value = match value {
                Value::Null => None,
                other => scalar_string(other),
            };
            record.nutritions.insert(key.to_lowercase(), value);
        }
    }

    record.tags.extend(json_ld_tags(recipe));

    if let Some(rating) = recipe.get("aggregateRating") {
        record.rating_score = rating.get("ratingValue").and_then(as_f64);
        record.rating_count = rating
            .get("ratingCount")
            .and_then(as_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64);
    }

    record.language = recipe
        .get("inLanguage")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
}

fn flatten_steps(node: Option<&Value>, out: &mut Vec<String>) {
    match node {
        Some(Value::String(text)) => {
            let text = clean_text(text);
            if !text.is_empty() {
                out.push(text);
            }
        }
        Some(Value::Array(items)) => items.iter().for_each(|item| flatten_steps(Some(item), out)),
        Some(object @ Value::Object(_)) => {
            if let Some(text) = object.get("text").and_then(Value::as_str) {
                let text = clean_text(text);
                if !text.is_empty() {
                    out.push(text);
                }
            }
            for key in STEP_KEYS {
                flatten_steps(object.get(key), out);
            }
        }
        _ => {}
    }
}

/// Lowercased tags from `keywords`, `recipeCategory` and `recipeCuisine`
fn json_ld_tags(recipe: &Value) -> Vec<String> {
    let mut raw = Vec::new();

    match recipe.get("keywords") {
        Some(Value::String(keywords)) => raw.extend(keywords.split(',').map(str::to_string)),
        Some(Value::Array(keywords)) => raw.extend(keywords.iter().filter_map(scalar_string)),
        _ => {}
    }

    for key in ["recipeCategory", "recipeCuisine"] {
        for value in as_list(recipe.get(key)) {
            if let Some(text) = value.as_str() {
                raw.extend(text.split(',').map(str::to_string));
            }
        }
    }

    raw.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

// ===== Markup =====

/// Texts of the first selector that yields any non-empty text
fn select_texts(document: &Html, selectors: &[&str]) -> Vec<String> {
    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(selector) => selector,
            Err(_) => continue,
        };

        let texts: Vec<String> = document
            .select(&selector)
            .map(|el| element_text(&el))
            .filter(|t| !t.is_empty())
            .collect();
        if !texts.is_empty() {
            return texts;
        }
    }
    Vec::new()
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

fn markup_tags(document: &Html) -> BTreeSet<String> {
    let selector = match Selector::parse(".core-tags-wrapper__tags-container a") {
        Ok(selector) => selector,
        Err(_) => return BTreeSet::new(),
    };

    document
        .select(&selector)
        .map(|a| element_text(&a).replace('#', "").trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Score from `.core-rating__counter`, count from `.core-rating__label`
fn markup_rating(document: &Html) -> (Option<f64>, Option<u64>) {
    let container = match Selector::parse("core-rating")
        .ok()
        .and_then(|s| document.select(&s).next())
    {
        Some(container) => container,
        None => return (None, None),
    };

    let score = child_text(&container, ".core-rating__counter")
        .and_then(|t| t.replace(',', ".").parse::<f64>().ok());

    let count = child_text(&container, ".core-rating__label").and_then(|label| {
        let digits: String = label
            .replace(['.', ','], "")
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse::<u64>().ok()
    });

    (score, count)
}

/// TM5/TM6/TM7 badges, sorted and de-duplicated
///
/// Falls back to the first recipe header when there are no badges.
fn tm_versions(document: &Html) -> Vec<String> {
    let mut versions = BTreeSet::new();

    if let Ok(selector) = Selector::parse(".rdp-tm-versions__name, [class*='tm-version']") {
        for el in document.select(&selector) {
            versions.extend(versions_in(&el.text().collect::<String>()));
        }
    }

    if versions.is_empty() {
        if let Some(header) = Selector::parse(".recipe-card__header, .rdp-header")
            .ok()
            .and_then(|s| document.select(&s).next())
        {
            versions.extend(versions_in(&header.text().collect::<String>()));
        }
    }

    versions.into_iter().collect()
}

fn versions_in(text: &str) -> Vec<String> {
    TM_VERSIONS
        .iter()
        .filter(|tm| text.contains(**tm))
        .map(|tm| tm.to_string())
        .collect()
}

fn html_lang(document: &Html) -> Option<String> {
    document
        .root_element()
        .value()
        .attr("lang")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn child_text(element: &ElementRef, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    element
        .select(&selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

fn element_text(element: &ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Decodes HTML entities left in structured data and collapses whitespace
fn clean_text(raw: &str) -> String {
    if raw.contains('&') || raw.contains('<') {
        let fragment = Html::parse_fragment(raw);
        collapse_whitespace(&fragment.root_element().text().collect::<String>())
    } else {
        collapse_whitespace(raw)
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
