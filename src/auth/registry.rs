//! Token type registry
//!
//! Each logical token type (`access`, `refresh`, `service`, ...) has its own
//! header, lifetime, algorithm and trust policy.

use super::{AuthError, ClaimSchema, HeaderClaims, PayloadSchema};
use jsonwebtoken::Algorithm;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Configuration of a single token type.
///
/// # Example
///
/// ```
/// use jwt_warden::auth::TokenTypeConfig;
/// use std::time::Duration;
///
/// let access = TokenTypeConfig::new("Authorization", Duration::from_secs(900))
///     .with_issuer("auth.example.com")
///     .with_allowed_issuers(["auth.example.com"]);
/// assert_eq!(access.header_name, "Authorization");
/// ```
#[derive(Debug, Clone)]
pub struct TokenTypeConfig {
    /// Request header carrying the token as `Bearer <token>`
    pub header_name: String,
    pub expires_in: Duration,
    pub algorithm: Algorithm,
    /// Written as `iss` when signing
    pub issuer: Option<String>,
    /// Written as `aud` when signing
    pub audience: Option<String>,
    /// Accepted `iss` values when verifying; empty means no issuer check
    pub allowed_issuers: BTreeSet<String>,
    pub header_claims: Option<HeaderClaims>,
    pub payload_schema: Option<Arc<dyn PayloadSchema>>,
}

impl TokenTypeConfig {
    pub fn new(header_name: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            header_name: header_name.into(),
            expires_in,
            algorithm: Algorithm::HS256,
            issuer: None,
            audience: None,
            allowed_issuers: BTreeSet::new(),
            header_claims: None,
            payload_schema: None,
        }
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    #[must_use]
    pub fn with_allowed_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_issuers = issuers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_header_claims(mut self, claims: HeaderClaims) -> Self {
        self.header_claims = Some(claims);
        self
    }

    #[must_use]
    pub fn with_payload_schema(mut self, schema: impl PayloadSchema + 'static) -> Self {
        let schema: Arc<dyn PayloadSchema> = Arc::new(schema);
        self.payload_schema = Some(schema);
        self
    }

    /// Shorthand for a [`ClaimSchema`] payload schema
    #[must_use]
    pub fn with_claim_schema(self, schema: ClaimSchema) -> Self {
        self.with_payload_schema(schema)
    }

    /// Whether the token travels in the standard `Authorization` header
    pub fn uses_authorization_header(&self) -> bool {
        self.header_name.eq_ignore_ascii_case("authorization")
    }

    /// Check the invariants a type must hold before it can be registered.
    pub fn validate(&self, name: &str) -> Result<(), AuthError> {
        if self.header_name.is_empty() {
            return Err(AuthError::Configuration(format!(
                "Token type '{}' has no header name",
                name
            )));
        }
        if !self.header_name.bytes().all(is_header_name_byte) {
            return Err(AuthError::Configuration(format!(
                "Token type '{}' has invalid header name '{}'",
                name, self.header_name
            )));
        }
        if !matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Configuration(format!(
                "Token type '{}' uses {:?}; only HS256, HS384 and HS512 work with shared secrets",
                name, self.algorithm
            )));
        }
        if let Some(claims) = &self.header_claims {
            claims.validate().map_err(|e| match e {
                AuthError::Configuration(msg) => {
                    AuthError::Configuration(format!("Token type '{}': {}", name, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

/// RFC 7230 `tchar`
fn is_header_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Non-empty, immutable mapping of type name to [`TokenTypeConfig`].
#[derive(Debug, Clone)]
pub struct TokenTypeRegistry {
    types: BTreeMap<String, TokenTypeConfig>,
}

impl TokenTypeRegistry {
    /// Build a registry, validating every entry.
    ///
    /// # Errors
    ///
    /// [`AuthError::Configuration`] if no types are given or any type is
    /// invalid.
    pub fn new<I, N>(types: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (N, TokenTypeConfig)>,
        N: Into<String>,
    {
        let mut registered = BTreeMap::new();
        for (name, config) in types {
            let name = name.into();
            if name.is_empty() {
                return Err(AuthError::Configuration(
                    "Token type name must not be empty".into(),
                ));
            }
            config.validate(&name)?;
            if registered.insert(name.clone(), config).is_some() {
                return Err(AuthError::Configuration(format!(
                    "Token type '{}' is registered twice",
                    name
                )));
            }
        }

        if registered.is_empty() {
            return Err(AuthError::Configuration(
                "At least one token type must be configured".into(),
            ));
        }

        Ok(Self { types: registered })
    }

    pub fn get(&self, name: &str) -> Option<&TokenTypeConfig> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TokenTypeConfig)> {
        self.types.iter().map(|(name, config)| (name.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
