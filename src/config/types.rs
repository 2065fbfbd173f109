use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// File name of the recovery file inside the output directory
pub const STATE_FILE_NAME: &str = ".scraper_state.json";

/// Main configuration structure for the scraper
///
/// Built from defaults, an optional TOML file, environment variables and CLI
/// flags (in that order of precedence), then treated as immutable for the run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub credentials: CredentialsConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
    pub timing: TimingConfig,
}

/// Which site to scrape
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Site locale, e.g. "de" or "en-GB"
    pub locale: String,

    /// Overrides the locale-derived base URL
    pub base_url: Option<String>,

    /// Overrides the search endpoint derived from the bootstrap page
    pub search_endpoint: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            locale: "de".to_string(),
            base_url: None,
            search_endpoint: None,
        }
    }
}

/// Account credentials
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving one JSON file per record
    pub directory: PathBuf,

    /// Recovery file location (defaults to `<directory>/.scraper_state.json`)
    pub state_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/data"),
            state_file: None,
        }
    }
}

/// Run behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunConfig {
    pub mode: RunMode,

    /// Explicit identifiers to download instead of running discovery
    pub recipe_ids: Vec<String>,

    /// Passed to browser-backed sessions; the HTTP session has no window
    pub headless: bool,

    pub debug: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            recipe_ids: Vec::new(),
            headless: true,
            debug: false,
        }
    }
}

/// Timeouts, throttles, retry budget and checkpointing (seconds unless noted)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TimingConfig {
    /// Timeout for a single page fetch
    pub page_load_timeout: f64,

    /// Timeout for a single search query
    pub request_timeout: f64,

    /// Pause after each successful download
    pub download_delay: f64,

    /// Pause after each discovery query
    pub query_delay: f64,

    /// Pause between download attempts of the same record
    pub retry_delay: f64,

    /// Extra attempts after the first one
    pub max_retries: u32,

    /// Checkpoint the crawl state every N processed records
    pub save_interval: u32,

    /// Capacity of the discovery -> download queue (identifiers)
    pub queue_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_load_timeout: 3.0,
            request_timeout: 30.0,
            download_delay: 0.2,
            query_delay: 0.1,
            retry_delay: 2.0,
            max_retries: 2,
            save_interval: 10,
            queue_capacity: 10_000,
        }
    }
}

impl TimingConfig {
    pub fn page_load_timeout(&self) -> Duration {
        secs(self.page_load_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout)
    }

    pub fn download_delay(&self) -> Duration {
        secs(self.download_delay)
    }

    pub fn query_delay(&self) -> Duration {
        secs(self.query_delay)
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// How existing records are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Skip records that were already downloaded
    #[default]
    #[serde(alias = "skip-existing")]
    Skip,

    /// Re-download and update existing records
    Update,

    /// Force re-download of everything
    #[serde(alias = "force-redownload")]
    Redownload,

    /// Only process what the recovery file lists as pending or failed
    #[serde(alias = "continue-from-state")]
    Continue,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Update => "update",
            Self::Redownload => "redownload",
            Self::Continue => "continue",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "skip-existing" => Ok(Self::Skip),
            "update" => Ok(Self::Update),
            "redownload" | "force-redownload" => Ok(Self::Redownload),
            "continue" | "continue-from-state" => Ok(Self::Continue),
            other => Err(format!(
                "unknown run mode '{}' (expected skip, update, redownload or continue)",
                other
            )),
        }
    }
}

impl Config {
    /// Site base URL with a trailing slash, e.g. `https://cookidoo.de/`
    pub fn base_url(&self) -> String {
        let base = match &self.site.base_url {
            Some(url) => url.clone(),
            None => format!("https://cookidoo.{}/", self.site.locale),
        };

        if base.ends_with('/') {
            base
        } else {
            format!("{}/", base)
        }
    }

    /// Language part of the locale ("en-GB" -> "en")
    pub fn language_code(&self) -> &str {
        self.site
            .locale
            .split('-')
            .next()
            .unwrap_or(&self.site.locale)
    }

    /// Locale as used in recipe URLs ("de" -> "de-DE", "en-GB" -> "en-GB")
    pub fn url_locale(&self) -> String {
        let lang = self.language_code();
        if lang.len() == 2 && lang == self.site.locale {
            format!("{}-{}", lang, lang.to_uppercase())
        } else {
            self.site.locale.clone()
        }
    }

    /// Page URL of a single recipe
    pub fn record_url(&self, id: &str) -> String {
        format!(
            "{}recipes/recipe/{}/{}",
            self.base_url(),
            self.url_locale(),
            id
        )
    }

    pub fn state_file(&self) -> PathBuf {
        self.output
            .state_file
            .clone()
            .unwrap_or_else(|| self.output.directory.join(STATE_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_locale(locale: &str) -> Config {
        let mut config = Config::default();
        config.site.locale = locale.to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.site.locale, "de");
        assert_eq!(config.run.mode, RunMode::Skip);
        assert!(config.run.headless);
        assert_eq!(config.timing.max_retries, 2);
        assert_eq!(config.timing.save_interval, 10);
        assert_eq!(config.state_file(), PathBuf::from("/data/.scraper_state.json"));
    }

    #[test]
    fn test_url_locale() {
        assert_eq!(config_with_locale("de").url_locale(), "de-DE");
        assert_eq!(config_with_locale("en-GB").url_locale(), "en-GB");
        assert_eq!(config_with_locale("en-GB").language_code(), "en");
    }

    #[test]
    fn test_record_url() {
        let config = config_with_locale("de");
        assert_eq!(
            config.record_url("r123"),
            "https://cookidoo.de/recipes/recipe/de-DE/r123"
        );
    }

    #[test]
    fn test_base_url_override_gets_trailing_slash() {
        let mut config = config_with_locale("de");
        config.site.base_url = Some("http://127.0.0.1:8080".to_string());
        assert_eq!(config.base_url(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!("skip".parse::<RunMode>(), Ok(RunMode::Skip));
        assert_eq!("UPDATE".parse::<RunMode>(), Ok(RunMode::Update));
        assert_eq!(
            "force-redownload".parse::<RunMode>(),
            Ok(RunMode::Redownload)
        );
        assert_eq!("continue".parse::<RunMode>(), Ok(RunMode::Continue));
        assert!("sometimes".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = CredentialsConfig {
            username: Some("cook@example.com".to_string()),
            password: Some("hunter2".to_string()),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("cook@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_negative_duration_clamps_to_zero() {
        let mut timing = TimingConfig::default();
        timing.retry_delay = -1.0;
        assert_eq!(timing.retry_delay(), Duration::ZERO);
    }
}
