//! Configuration module for jwt-warden
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, and turns them into a ready
//! [`JwtService`] and [`RequirementResolver`].

use crate::auth::{
    AuthError, ClaimSchema, HeaderClaims, JwtService, SecretStore, TokenTypeConfig,
    TokenTypeRegistry,
};
use crate::guard::RequirementResolver;
use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Duration Parsing
// ============================================================================

/// Parse a token lifetime.
///
/// Accepts whole seconds (`3600`) or a number with a unit suffix:
/// `s`, `m`, `h`, `d` or `w` (`15m`, `7d`).
///
/// # Examples
///
/// ```
/// use jwt_warden::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
/// assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration '{}': expected e.g. 900, 15m or 7d", input))?;
    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        other => {
            return Err(format!(
                "Invalid duration unit '{}' in '{}': must be s, m, h, d or w",
                other, input
            ))
        }
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration '{}' is too large", input))
}

/// Deserialize a lifetime given as integer seconds or a suffixed string.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Diagnostics mode: verbose error messages for development
    #[serde(default)]
    pub debug: bool,
    pub secrets: SecretsConfig,
    pub token_types: BTreeMap<String, TokenTypeSettings>,
    /// Token types every route requires unless verification is disabled
    #[serde(default)]
    pub mandatory_types: Vec<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_secret_store()?;
        let registry = self.build_registry()?;

        for name in &self.mandatory_types {
            if !registry.contains(name) {
                return Err(ConfigError::ValidationError(format!(
                    "Mandatory token type '{}' is not configured",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn build_secret_store(&self) -> Result<SecretStore, ConfigError> {
        Ok(SecretStore::from_secrets(
            self.secrets.keys.clone(),
            self.secrets.default_key_id.clone(),
        )?)
    }

    pub fn build_registry(&self) -> Result<TokenTypeRegistry, ConfigError> {
        let types = self
            .token_types
            .iter()
            .map(|(name, settings)| Ok((name.clone(), settings.to_token_type(name)?)))
            .collect::<Result<Vec<_>, AuthError>>()?;
        Ok(TokenTypeRegistry::new(types)?)
    }

    /// Build the JWT service this configuration describes
    pub fn build_service(&self) -> Result<JwtService, ConfigError> {
        Ok(JwtService::new(self.build_secret_store()?, self.build_registry()?)
            .with_debug(self.debug))
    }

    /// Build a resolver around a fresh service
    pub fn build_resolver(&self) -> Result<RequirementResolver, ConfigError> {
        self.validate()?;
        let service = Arc::new(self.build_service()?);
        Ok(RequirementResolver::new(
            service,
            self.mandatory_types.iter().cloned(),
        ))
    }
}

/// Signing secrets keyed by key id
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Key id used for new signatures
    pub default_key_id: String,
    /// Every key id that may still verify. Values never appear in Debug output.
    pub keys: BTreeMap<String, SecretString>,
}

/// Token type configuration
///
/// # Example
///
/// ```yaml
/// access:
///   header_name: Authorization
///   expires_in: 15m
///   algorithm: HS256
///   issuer: auth.example.com
///   allowed_issuers: [auth.example.com]
///   header_claims:
///     typ: JWT
///     extra: { env: prod }
///   payload_schema:
///     required: { sub: string }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TokenTypeSettings {
    pub header_name: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub expires_in: Duration,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub allowed_issuers: Vec<String>,
    #[serde(default)]
    pub header_claims: Option<HeaderClaims>,
    #[serde(default)]
    pub payload_schema: Option<ClaimSchema>,
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

impl TokenTypeSettings {
    /// Convert into a registry entry
    pub fn to_token_type(&self, name: &str) -> Result<TokenTypeConfig, AuthError> {
        let algorithm = Algorithm::from_str(&self.algorithm).map_err(|_| {
            AuthError::Configuration(format!(
                "Token type '{}' has unknown algorithm '{}'",
                name, self.algorithm
            ))
        })?;

        let mut config = TokenTypeConfig::new(self.header_name.clone(), self.expires_in)
            .with_algorithm(algorithm)
            .with_allowed_issuers(self.allowed_issuers.iter().cloned());
        if let Some(issuer) = &self.issuer {
            config = config.with_issuer(issuer.clone());
        }
        if let Some(audience) = &self.audience {
            config = config.with_audience(audience.clone());
        }
        if let Some(claims) = self.header_claims.as_ref().filter(|c| !c.is_empty()) {
            config = config.with_header_claims(claims.clone());
        }
        if let Some(schema) = &self.payload_schema {
            config = config.with_claim_schema(schema.clone());
        }
        Ok(config)
    }
}
