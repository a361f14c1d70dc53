use crate::models::ProviderConfig;
use anyhow::{Context, Result};
use keyring::Entry;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_MODEL: &str = "black-forest-labs/FLUX.1-schnell";
pub const DEFAULT_API_KEY_REF: &str = "env:TOGETHER_API_KEY";
pub const DEFAULT_DB_FILE: &str = "imagestory.sqlite";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Runtime settings for the host, read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub provider: ProviderConfig,
    pub debounce: Duration,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            provider: ProviderConfig {
                name: "together".to_string(),
                api_url: DEFAULT_API_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                api_key_ref: Some(DEFAULT_API_KEY_REF.to_string()),
            },
            debounce: DEFAULT_DEBOUNCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// Loads the config from `IMAGESTORY_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("IMAGESTORY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("IMAGESTORY_API_URL") {
            config.provider.api_url = url;
        }
        if let Some(model) = lookup("IMAGESTORY_MODEL") {
            config.provider.model = model;
        }
        if let Some(key_ref) = lookup("IMAGESTORY_API_KEY_REF") {
            config.provider.api_key_ref = if key_ref.trim().is_empty() {
                None
            } else {
                Some(key_ref)
            };
        }
        if let Some(ms) = lookup("IMAGESTORY_DEBOUNCE_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .context(format!("Invalid IMAGESTORY_DEBOUNCE_MS value '{}'", ms))?;
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("IMAGESTORY_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .context(format!("Invalid IMAGESTORY_TIMEOUT_SECS value '{}'", secs))?;
            if secs == 0 {
                anyhow::bail!("IMAGESTORY_TIMEOUT_SECS must be greater than zero");
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        log::debug!("Loaded config: {:?}", config);
        Ok(config)
    }
}

// --- API Key Retrieval ---

const KEYRING_SERVICE_PREFIX: &str = "imagestory_api_key";

/// Retrieves the API key for the image service.
/// It checks the `api_key_ref` field to determine whether to read from
/// environment variables or the OS keyring.
pub fn get_api_key(config: &ProviderConfig) -> Result<String> {
    match config.api_key_ref.as_deref() {
        Some(ref_str) if ref_str.starts_with("env:") => {
            let env_var_name = ref_str.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            let key = std::env::var(env_var_name).context(format!(
                "Failed to get API key from environment variable '{}'",
                env_var_name
            ))?;
            if key.trim().is_empty() {
                anyhow::bail!("Environment variable '{}' is empty", env_var_name);
            }
            Ok(key)
        }
        Some("keyring") => {
            let service_name = format!("{}-{}", KEYRING_SERVICE_PREFIX, config.name);
            let entry = Entry::new(&service_name, &config.name)
                .context("Failed to create keyring entry")?;
            log::debug!("Retrieving API key from keyring for service: {}", service_name);
            entry.get_password().context(format!(
                "Failed to get API key from keyring for '{}'. Please set it in settings.",
                config.name
            ))
        }
        Some(other) => Err(anyhow::anyhow!("Unsupported api_key_ref format: {}", other)),
        None => Err(anyhow::anyhow!(
            "API key reference not set for provider '{}'",
            config.name
        )),
    }
}

/// Stores an API key in the OS keyring for the given provider.
pub fn set_api_key_in_keyring(config: &ProviderConfig, api_key: &str) -> Result<()> {
    let service_name = format!("{}-{}", KEYRING_SERVICE_PREFIX, config.name);
    let entry = Entry::new(&service_name, &config.name)
        .context("Failed to create keyring entry for setting password")?;
    log::info!("Setting API key in keyring for service: {}", service_name);
    entry.set_password(api_key).context(format!(
        "Failed to set API key in keyring for '{}'",
        config.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() -> Result<()> {
        let config = AppConfig::from_lookup(|_| None)?;
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_FILE));
        assert_eq!(config.provider.api_url, DEFAULT_API_URL);
        assert_eq!(config.provider.api_key_ref.as_deref(), Some(DEFAULT_API_KEY_REF));
        assert_eq!(config.debounce, Duration::from_millis(300));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn overrides_from_lookup() -> Result<()> {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("IMAGESTORY_DB_PATH", "/tmp/stories.sqlite"),
            ("IMAGESTORY_DEBOUNCE_MS", "150"),
            ("IMAGESTORY_TIMEOUT_SECS", "5"),
            ("IMAGESTORY_API_KEY_REF", "keyring"),
        ]))?;
        assert_eq!(config.db_path, PathBuf::from("/tmp/stories.sqlite"));
        assert_eq!(config.debounce, Duration::from_millis(150));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.provider.api_key_ref.as_deref(), Some("keyring"));
        Ok(())
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(AppConfig::from_lookup(lookup_from(&[("IMAGESTORY_DEBOUNCE_MS", "soon")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("IMAGESTORY_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn missing_key_ref_is_an_error() {
        let config = ProviderConfig {
            name: "test".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_ref: None,
        };
        assert!(get_api_key(&config).is_err());

        let config = ProviderConfig {
            api_key_ref: Some("vault:abc".to_string()),
            ..config
        };
        let err = get_api_key(&config).unwrap_err();
        assert!(err.to_string().contains("Unsupported api_key_ref"));
    }

    #[test]
    fn unset_env_var_is_an_error() {
        let config = ProviderConfig {
            name: "test".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_ref: Some("env:IMAGESTORY_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
        };
        assert!(get_api_key(&config).is_err());
    }
}
