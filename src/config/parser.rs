use crate::config::types::{Config, RunMode};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Loads and parses a configuration file from the given path
///
/// Validation is deferred to [`crate::config::validate`] because credentials
/// usually arrive through the environment or the command line afterwards.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully parsed configuration
/// * `Err(ConfigError)` - Failed to read or parse the file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use thermomix_scraper::config::load_config;
///
/// let config = load_config(Path::new("scraper.toml")).unwrap();
/// println!("Locale: {}", config.site.locale);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be correlated with the config they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Applies environment variable overrides to a configuration
///
/// `lookup` returns the value of a variable, if set. Blank values are ignored.
/// The first name in each list wins; the `COOKIDOO_*` names are legacy aliases.
///
/// | Variables | Field |
/// |-----------|-------|
/// | `THERMOMIX_LOCALE`, `COOKIDOO_LOCALE` | `site.locale` |
/// | `THERMOMIX_USERNAME`, `COOKIDOO_EMAIL`, `COOKIDOO_USERNAME` | `credentials.username` |
/// | `THERMOMIX_PASSWORD`, `COOKIDOO_PASSWORD` | `credentials.password` |
/// | `THERMOMIX_OUTPUT` | `output.directory` |
/// | `THERMOMIX_MODE` | `run.mode` |
/// | `THERMOMIX_RECIPE_IDS` | `run.recipe-ids` (comma separated) |
/// | `THERMOMIX_HEADLESS` | `run.headless` |
/// | `THERMOMIX_DEBUG` | `run.debug` |
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |names: &[&str]| -> Option<String> {
        names
            .iter()
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    };

    if let Some(locale) = get(&["THERMOMIX_LOCALE", "COOKIDOO_LOCALE"]) {
        config.site.locale = locale;
    }

    if let Some(username) = get(&[
        "THERMOMIX_USERNAME",
        "COOKIDOO_EMAIL",
        "COOKIDOO_USERNAME",
    ]) {
        config.credentials.username = Some(username);
    }

    if let Some(password) = get(&["THERMOMIX_PASSWORD", "COOKIDOO_PASSWORD"]) {
        config.credentials.password = Some(password);
    }

    if let Some(output) = get(&["THERMOMIX_OUTPUT"]) {
        config.output.directory = PathBuf::from(output);
    }

    if let Some(mode) = get(&["THERMOMIX_MODE"]) {
        config.run.mode = mode.parse::<RunMode>().map_err(ConfigError::Validation)?;
    }

    if let Some(ids) = get(&["THERMOMIX_RECIPE_IDS"]) {
        config.run.recipe_ids = split_list(&ids);
    }

    if let Some(headless) = get(&["THERMOMIX_HEADLESS"]) {
        config.run.headless = parse_flag(&headless);
    }

    if let Some(debug) = get(&["THERMOMIX_DEBUG"]) {
        config.run.debug = parse_flag(&debug);
    }

    Ok(())
}

/// Applies overrides from the process environment
pub fn apply_process_env(config: &mut Config) -> Result<(), ConfigError> {
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
