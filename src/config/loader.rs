//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;
use tracing::info;

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        info!(
            path = %path.display(),
            token_types = config.token_types.len(),
            keys = config.secrets.keys.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR_NAME}` and `${VAR_NAME:-default}`.
    ///
    /// Unset variables without a default are left as written.
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex_lite::Captures<'_>| {
                match std::env::var(&caps[1]) {
                    Ok(value) => value,
                    Err(_) => caps
                        .get(2)
                        .map(|default| default.as_str().to_string())
                        .unwrap_or_else(|| caps[0].to_string()),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("WARDEN_TEST_VAR", "test_value");
        let content = "key: ${WARDEN_TEST_VAR}";
        let expanded = ConfigLoader::expand_env_vars(content);
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("WARDEN_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_default() {
        std::env::remove_var("WARDEN_UNSET_VAR");
        assert_eq!(
            ConfigLoader::expand_env_vars("a: ${WARDEN_UNSET_VAR:-fallback}"),
            "a: fallback"
        );
        assert_eq!(
            ConfigLoader::expand_env_vars("a: ${WARDEN_UNSET_VAR}"),
            "a: ${WARDEN_UNSET_VAR}"
        );
    }

    #[test]
    #[serial]
    fn test_parse_with_secret_from_env() {
        std::env::set_var("WARDEN_TEST_SECRET", "from-env");
        let yaml = r#"
secrets:
  default_key_id: k1
  keys:
    k1: ${WARDEN_TEST_SECRET}
token_types:
  access: { header_name: Authorization, expires_in: 60 }
"#;
        let config = ConfigLoader::parse(yaml).unwrap();
        let store = config.build_secret_store().unwrap();
        assert_eq!(
            secrecy::ExposeSecret::expose_secret(store.get("k1").unwrap()),
            "from-env"
        );
        std::env::remove_var("WARDEN_TEST_SECRET");
    }
}
