use crate::config::types::{
    Config, CrawlerConfig, FetcherConfig, RetentionConfig, StorageConfig, WorkerConfig,
};
use crate::ConfigError;

/// Longest accepted freshness window: ten years
const MAX_PAGE_EXPIRY_HOURS: u64 = 24 * 365 * 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_worker_config(&config.workers)?;
    validate_storage_config(&config.storage)?;
    validate_retention_config(&config.retention)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.sla_duration_secs < 1 {
        return Err(ConfigError::Validation(
            "sla_duration_secs must be >= 1".to_string(),
        ));
    }

    if !(1..=MAX_PAGE_EXPIRY_HOURS).contains(&config.page_expiry_hours) {
        return Err(ConfigError::Validation(format!(
            "page_expiry_hours must be between 1 and {}, got {}",
            MAX_PAGE_EXPIRY_HOURS, config.page_expiry_hours
        )));
    }

    if config.default_max_depth < 1 {
        return Err(ConfigError::Validation(format!(
            "default_max_depth must be >= 1, got {}",
            config.default_max_depth
        )));
    }

    if config.default_max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "default_max_pages must be >= 1, got {}",
            config.default_max_pages
        )));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch timeouts must be >= 1s, got timeout={}s connect={}s",
            config.timeout_secs, config.connect_timeout_secs
        )));
    }

    Ok(())
}

fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.count < 1 || config.count > 64 {
        return Err(ConfigError::Validation(format!(
            "worker count must be between 1 and 64, got {}",
            config.count
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("database_path", &config.database_path),
        ("blob_dir", &config.blob_dir),
        ("index_path", &config.index_path),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

fn validate_retention_config(config: &RetentionConfig) -> Result<(), ConfigError> {
    if config.max_age_days < 1 {
        return Err(ConfigError::Validation(
            "max_age_days must be >= 1".to_string(),
        ));
    }
    Ok(())
}
