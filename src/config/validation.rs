use crate::config::types::{Config, CredentialsConfig, OutputConfig, SiteConfig, TimingConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_credentials(&config.credentials)?;
    validate_output_config(&config.output)?;
    validate_timing_config(&config.timing)?;
    Ok(())
}

/// Validates locale and URL overrides
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if config.locale.is_empty() {
        return Err(ConfigError::Validation(
            "locale is required (THERMOMIX_LOCALE or --locale)".to_string(),
        ));
    }

    if !config
        .locale
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c == '-')
        || config.locale.starts_with('-')
        || config.locale.ends_with('-')
    {
        return Err(ConfigError::Validation(format!(
            "locale must look like 'de' or 'en-GB', got '{}'",
            config.locale
        )));
    }

    if let Some(base_url) = &config.base_url {
        Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;
    }

    if let Some(endpoint) = &config.search_endpoint {
        Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid search-endpoint: {}", e)))?;
    }

    Ok(())
}

/// Validates that both credentials are present
fn validate_credentials(config: &CredentialsConfig) -> Result<(), ConfigError> {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

    if !present(&config.username) || !present(&config.password) {
        return Err(ConfigError::Validation(
            "credentials required (THERMOMIX_USERNAME/THERMOMIX_PASSWORD or --username/--password)"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if let Some(state_file) = &config.state_file {
        if state_file.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "state-file cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates timeouts, delays and counters
fn validate_timing_config(config: &TimingConfig) -> Result<(), ConfigError> {
    let seconds = [
        ("page-load-timeout", config.page_load_timeout),
        ("request-timeout", config.request_timeout),
        ("download-delay", config.download_delay),
        ("query-delay", config.query_delay),
        ("retry-delay", config.retry_delay),
    ];

    for (name, value) in seconds {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be a non-negative number of seconds, got {}",
                name, value
            )));
        }
    }

    if config.page_load_timeout == 0.0 || config.request_timeout == 0.0 {
        return Err(ConfigError::Validation(
            "timeouts must be greater than zero".to_string(),
        ));
    }

    if config.save_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "save-interval must be >= 1, got {}",
            config.save_interval
        )));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "queue-capacity must be >= 1, got {}",
            config.queue_capacity
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.credentials.username = Some("cook@example.com".to_string());
        config.credentials.password = Some("secret".to_string());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = valid_config();
        config.credentials.password = None;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        let mut config = valid_config();
        config.credentials.username = Some("  ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_locale_validation() {
        let mut config = valid_config();
        config.site.locale = String::new();
        assert!(validate(&config).is_err());

        config.site.locale = "en-GB".to_string();
        assert!(validate(&config).is_ok());

        config.site.locale = "de/../x".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_urls() {
        let mut config = valid_config();
        config.site.base_url = Some("not a url".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        let mut config = valid_config();
        config.site.search_endpoint = Some("::".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_timing_validation() {
        let mut config = valid_config();
        config.timing.save_interval = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.timing.retry_delay = -0.5;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.timing.download_delay = f64::NAN;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.timing.queue_capacity = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.timing.request_timeout = 0.0;
        assert!(validate(&config).is_err());
    }
}
