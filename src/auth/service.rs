//! JWT service
//!
//! Facade over [`SecretStore`], [`TokenTypeRegistry`] and the codec. Every
//! operation is keyed by token type name and is a pure function of the
//! immutable configuration plus its arguments, so one service can be shared
//! across request handlers without locking.

use super::codec::{self, SignOptions, VerifyConstraints};
use super::{AuthError, Payload, SecretStore, TokenTypeConfig, TokenTypeRegistry};
use crate::metrics;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// Generates, verifies and extracts tokens for registered token types.
///
/// # Example
///
/// ```
/// use jwt_warden::auth::{JwtService, SecretStore, TokenTypeConfig, TokenTypeRegistry};
/// use std::time::Duration;
///
/// let secrets = SecretStore::new([("k1", "a-long-random-secret")], "k1").unwrap();
/// let registry = TokenTypeRegistry::new([(
///     "access",
///     TokenTypeConfig::new("Authorization", Duration::from_secs(900)),
/// )])
/// .unwrap();
/// let service = JwtService::new(secrets, registry);
///
/// let mut claims = serde_json::Map::new();
/// claims.insert("sub".into(), "user123".into());
/// let token = service.generate_token("access", &claims).unwrap();
/// let verified = service.verify_token("access", &token).unwrap();
/// assert_eq!(verified["sub"], "user123");
/// ```
#[derive(Debug, Clone)]
pub struct JwtService {
    secrets: SecretStore,
    registry: TokenTypeRegistry,
    debug: bool,
}

impl JwtService {
    pub fn new(secrets: SecretStore, registry: TokenTypeRegistry) -> Self {
        Self {
            secrets,
            registry,
            debug: false,
        }
    }

    /// Enable diagnostics mode (verbose, implementation-revealing errors)
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Configuration of a registered token type
    pub fn token_type_config(&self, token_type: &str) -> Option<&TokenTypeConfig> {
        self.registry.get(token_type)
    }

    /// Registered token type names in sorted order
    pub fn token_type_names(&self) -> impl Iterator<Item = &str> {
        self.registry.names()
    }

    fn config(&self, token_type: &str) -> Result<&TokenTypeConfig, AuthError> {
        self.registry
            .get(token_type)
            .ok_or_else(|| AuthError::UnknownTokenType(token_type.to_string()))
    }

    /// Sign `payload` as a `token_type` token with the default key.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnknownTokenType`] for unregistered types,
    /// [`AuthError::MissingDefaultSecret`] if the default key has no secret.
    #[tracing::instrument(name = "jwt.generate", skip(self, payload))]
    pub fn generate_token(&self, token_type: &str, payload: &Payload) -> Result<String, AuthError> {
        let config = self.config(token_type)?;
        let (kid, secret) = self.secrets.signing_secret()?;

        let options = SignOptions {
            algorithm: config.algorithm,
            issuer: config.issuer.as_deref(),
            audience: config.audience.as_deref(),
            header_claims: config.header_claims.as_ref(),
        };
        let token = codec::sign(payload, secret, kid, config.expires_in, &options)?;

        debug!(kid, "Issued token");
        metrics::record_token_issued(token_type);
        Ok(token)
    }

    /// Sign any serializable claims struct.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidPayloadShape`] if `claims` does not serialize to a
    /// JSON object, plus everything [`JwtService::generate_token`] returns.
    pub fn generate_token_for<T: Serialize>(
        &self,
        token_type: &str,
        claims: &T,
    ) -> Result<String, AuthError> {
        match serde_json::to_value(claims) {
            Ok(Value::Object(payload)) => self.generate_token(token_type, &payload),
            Ok(_) => Err(AuthError::InvalidPayloadShape(
                "claims must serialize to a JSON object".into(),
            )),
            Err(e) => Err(AuthError::InvalidPayloadShape(e.to_string())),
        }
    }

    /// Verify a `token_type` token and return its claims.
    ///
    /// Applies the type's algorithm, allowed issuers and header claims, then
    /// its payload schema if one is configured.
    #[tracing::instrument(name = "jwt.verify", skip(self, token))]
    pub fn verify_token(&self, token_type: &str, token: &str) -> Result<Payload, AuthError> {
        let config = self.config(token_type)?;
        let started = Instant::now();

        let result = self.verify_with(config, token);

        metrics::record_verification(
            token_type,
            result.as_ref().err().map_or("ok", AuthError::code),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    fn verify_with(&self, config: &TokenTypeConfig, token: &str) -> Result<Payload, AuthError> {
        let constraints = VerifyConstraints {
            algorithm: config.algorithm,
            allowed_issuers: Some(&config.allowed_issuers).filter(|set| !set.is_empty()),
            header_claims: config.header_claims.as_ref(),
        };
        let payload = codec::verify(token, &self.secrets, &constraints)?;

        if let Some(schema) = &config.payload_schema {
            schema.validate(&payload).map_err(|reason| {
                debug!(%reason, "Rejecting token with invalid payload shape");
                AuthError::InvalidPayloadShape(reason)
            })?;
        }

        Ok(payload)
    }

    /// Verify and deserialize into a claims struct.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidPayloadShape`] when the verified claims do not
    /// deserialize into `T`.
    pub fn verify_token_as<T: DeserializeOwned>(
        &self,
        token_type: &str,
        token: &str,
    ) -> Result<T, AuthError> {
        let payload = self.verify_token(token_type, token)?;
        serde_json::from_value(Value::Object(payload))
            .map_err(|e| AuthError::InvalidPayloadShape(e.to_string()))
    }

    /// Strip the `Bearer ` prefix (case-insensitive) from a header value.
    ///
    /// An absent header yields `Ok(None)`. A present header in any other
    /// format also yields `Ok(None)`, except in diagnostics mode where it is
    /// reported as [`AuthError::InvalidAuthorizationFormat`].
    pub fn extract_token(
        &self,
        header_value: Option<&str>,
        token_type: &str,
    ) -> Result<Option<String>, AuthError> {
        let Some(value) = header_value else {
            return Ok(None);
        };

        match parse_bearer(value) {
            Some(token) => Ok(Some(token.to_string())),
            None if self.debug => Err(AuthError::InvalidAuthorizationFormat {
                token_type: token_type.to_string(),
            }),
            None => Ok(None),
        }
    }
}

/// `Bearer <token>` with a single non-empty token
fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, rest) = value.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}
