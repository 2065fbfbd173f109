//! Crawler module for downloading records
//!
//! This module contains the core scraping logic, including:
//! - The authenticated session used for every page load
//! - Recipe extraction from record pages
//! - Overall run coordination (discovery, download, retry, checkpointing)

mod coordinator;
mod extractor;
mod session;

pub use coordinator::{run_scrape, Coordinator};
pub use extractor::{ExtractError, Extractor, PageExtractor};
pub use session::{build_http_client, is_logged_in, FetchError, HttpSession, Page, Session};
