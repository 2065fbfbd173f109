//! Authenticated browsing session
//!
//! This module handles all page requests for the crawler, including:
//! - Building the HTTP client with a cookie store
//! - Logging in through the site's login form
//! - Fetching record and search pages
//! - Error classification

use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Element only rendered for signed-in users
const PROFILE_SELECTOR: &str = "core-user-profile";

/// A fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Final URL after redirects
    pub url: String,
    pub html: String,
}

/// Page fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// A logged-in view of the site
///
/// Implementations are driven by a single task at a time.
#[async_trait]
pub trait Session: Send {
    /// Signs in; `Ok(false)` means the credentials were not accepted
    async fn login(&mut self) -> Result<bool, FetchError>;

    async fn logout(&mut self) -> Result<(), FetchError>;

    /// Loads a page and returns its final URL and HTML
    async fn fetch_page(&mut self, url: &str) -> Result<Page, FetchError>;

    /// URL of the last page loaded, if any
    fn current_url(&self) -> Option<String>;
}

/// Builds an HTTP client with a cookie store
///
/// # Arguments
///
/// * `timeout` - Per-request timeout
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Session over plain HTTP requests
pub struct HttpSession {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    current_url: Option<String>,
}

impl HttpSession {
    /// Creates a session for the configured site and credentials
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let base_url = config.base_url();
        Url::parse(&base_url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            client: build_http_client(config.timing.page_load_timeout())?,
            base_url,
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
            current_url: None,
        })
    }

    /// Submits the first login form found on `page`
    ///
    /// Returns `Ok(None)` if the page has no login form.
    async fn submit_login(
        &mut self,
        page: &Page,
        username: &str,
        password: &str,
    ) -> Result<Option<Page>, FetchError> {
        let form = match find_login_form(&page.html, &page.url, username, password) {
            Some(form) => form,
            None => return Ok(None),
        };

        tracing::debug!("Submitting login form to {}", form.action);
        let action = form.action.to_string();
        let response = self
            .client
            .post(form.action)
            .form(&form.fields)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: action.clone(),
                source,
            })?;

        self.read_page(response, &action).await.map(Some)
    }

    async fn read_page(
        &mut self,
        response: reqwest::Response,
        requested: &str,
    ) -> Result<Page, FetchError> {
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: requested.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(|source| FetchError::Http {
            url: final_url.clone(),
            source,
        })?;

        self.current_url = Some(final_url.clone());
        Ok(Page {
            url: final_url,
            html,
        })
    }
}

#[async_trait]
impl Session for HttpSession {
    /// Signs in through the site's login form
    ///
    /// # Flow
    ///
    /// 1. Load `{base}profile/login`, then `{base}` if that has no form
    /// 2. If the page already shows the user profile, the session is valid
    /// 3. Submit the form with the credentials (hidden fields preserved)
    /// 4. Verify the profile element on the response, then on `{base}`
    async fn login(&mut self) -> Result<bool, FetchError> {
        let (username, password) = match (&self.username, &self.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => {
                tracing::warn!("No credentials configured");
                return Ok(false);
            }
        };

        let candidates = [format!("{}profile/login", self.base_url), self.base_url.clone()];
        for url in &candidates {
            let page = match self.fetch_page(url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!("Login page {} unavailable: {}", url, e);
                    continue;
                }
            };

            if is_logged_in(&page.html) {
                tracing::info!("Session already authenticated");
                return Ok(true);
            }

            let response = match self.submit_login(&page, &username, &password).await? {
                Some(response) => response,
                None => continue,
            };

            if is_logged_in(&response.html) {
                tracing::info!("Logged in as {}", username);
                return Ok(true);
            }

            let home = self.base_url.clone();
            let verified = self
                .fetch_page(&home)
                .await
                .map(|page| is_logged_in(&page.html))
                .unwrap_or(false);
            if verified {
                tracing::info!("Logged in as {}", username);
            }
            return Ok(verified);
        }

        tracing::warn!("No login form found");
        Ok(false)
    }

    async fn logout(&mut self) -> Result<(), FetchError> {
        let url = format!("{}profile/logout", self.base_url);
        self.fetch_page(&url).await?;
        tracing::debug!("Logged out");
        Ok(())
    }

    async fn fetch_page(&mut self, url: &str) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        self.read_page(response, url).await
    }

    fn current_url(&self) -> Option<String> {
        self.current_url.clone()
    }
}

/// Returns true if the page belongs to a signed-in user
pub fn is_logged_in(html: &str) -> bool {
    let document = Html::parse_document(html);
    Selector::parse(PROFILE_SELECTOR)
        .map(|selector| document.select(&selector).next().is_some())
        .unwrap_or(false)
}

/// A login form ready to submit
#[derive(Debug, Clone, PartialEq)]
struct LoginForm {
    action: Url,
    fields: Vec<(String, String)>,
}

/// Finds the first form with a password input and an identity input
///
/// Hidden inputs keep their values; the identity and password inputs are
/// filled with the credentials.
fn find_login_form(html: &str, page_url: &str, username: &str, password: &str) -> Option<LoginForm> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").ok()?;
    let input_selector = Selector::parse("input").ok()?;
    let page_url = Url::parse(page_url).ok()?;

    for form in document.select(&form_selector) {
        let inputs: Vec<ElementRef> = form.select(&input_selector).collect();

        let has_password = inputs.iter().any(|i| input_type(i) == "password");
        let has_identity = inputs.iter().any(is_identity_input);
        if !has_password || !has_identity {
            continue;
        }

        let mut fields = Vec::new();
        let mut identity_filled = false;
        for input in &inputs {
            let name = match input.value().attr("name") {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue,
            };

            let value = match input_type(input).as_str() {
                "password" => password.to_string(),
                _ if !identity_filled && is_identity_input(input) => {
                    identity_filled = true;
                    username.to_string()
                }
                "hidden" | "text" => input.value().attr("value").unwrap_or_default().to_string(),
                _ => continue,
            };
            fields.push((name, value));
        }

        let action = match form.value().attr("action").map(str::trim) {
            Some(action) if !action.is_empty() => page_url.join(action).ok()?,
            _ => page_url.clone(),
        };

        return Some(LoginForm { action, fields });
    }

    None
}

fn input_type(input: &ElementRef) -> String {
    input
        .value()
        .attr("type")
        .unwrap_or("text")
        .to_ascii_lowercase()
}

fn is_identity_input(input: &ElementRef) -> bool {
    let kind = input_type(input);
    if kind == "email" {
        return true;
    }
    if kind != "text" {
        return false;
    }

    let attrs = [
        input.value().attr("name"),
        input.value().attr("id"),
        input.value().attr("autocomplete"),
    ];
    attrs.iter().flatten().any(|attr| {
        let attr = attr.to_ascii_lowercase();
        attr.contains("email") || attr.contains("user") || attr == "login"
    })
}
