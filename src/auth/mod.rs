//! Authentication module
//!
//! Provides the token type registry, the kid-aware token codec and the
//! [`JwtService`] facade that ties them together.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod claims;
pub mod codec;
pub mod registry;
pub mod schema;
pub mod secrets;
pub mod service;

pub use claims::{DecodedHeader, HeaderClaims};
pub use registry::{TokenTypeConfig, TokenTypeRegistry};
pub use schema::{ClaimSchema, ClaimType, PayloadSchema};
pub use secrets::SecretStore;
pub use service::JwtService;

/// Decoded JWT claims, keyed by claim name.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token header is missing a key id")]
    MissingKeyId,

    #[error("Unknown key id: {0}")]
    UnknownKeyId(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired at {expired_at}")]
    TokenExpired { expired_at: DateTime<Utc> },

    #[error("Header claim '{field}' mismatch: expected {expected}, got {}", actual.as_deref().unwrap_or("nothing"))]
    HeaderMismatch {
        field: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("Token has no issuer")]
    MissingIssuer,

    #[error("Issuer not allowed: {0}")]
    IssuerNotAllowed(String),

    #[error("Invalid payload shape: {0}")]
    InvalidPayloadShape(String),

    #[error("Unknown token type: {0}")]
    UnknownTokenType(String),

    #[error("Default key id '{0}' has no registered secret")]
    MissingDefaultSecret(String),

    #[error("Missing {0} token")]
    MissingCredential(String),

    #[error("Invalid {token_type} token: {reason}")]
    InvalidCredential {
        token_type: String,
        reason: String,
        #[source]
        source: Box<AuthError>,
    },

    #[error("Header for {token_type} token must use the 'Bearer <token>' format")]
    InvalidAuthorizationFormat { token_type: String },
}

impl AuthError {
    /// HTTP status the surrounding error layer should answer with.
    ///
    /// Misconfiguration is a server fault (500); everything else is a client
    /// authentication failure (401).
    pub fn status_code(&self) -> u16 {
        if self.is_server_error() {
            500
        } else {
            401
        }
    }

    /// Whether this error stems from deployment misconfiguration rather than
    /// from the credentials a client sent.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::Configuration(_)
                | AuthError::UnknownTokenType(_)
                | AuthError::MissingDefaultSecret(_)
        )
    }

    /// Stable machine-readable identifier of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "CONFIGURATION_ERROR",
            AuthError::MalformedToken(_) => "MALFORMED_TOKEN",
            AuthError::MissingKeyId => "MISSING_KEY_ID",
            AuthError::UnknownKeyId(_) => "UNKNOWN_KEY_ID",
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
            AuthError::TokenExpired { .. } => "TOKEN_EXPIRED",
            AuthError::HeaderMismatch { .. } => "HEADER_MISMATCH",
            AuthError::MissingIssuer => "MISSING_ISSUER",
            AuthError::IssuerNotAllowed(_) => "ISSUER_NOT_ALLOWED",
            AuthError::InvalidPayloadShape(_) => "INVALID_PAYLOAD_SHAPE",
            AuthError::UnknownTokenType(_) => "UNKNOWN_TOKEN_TYPE",
            AuthError::MissingDefaultSecret(_) => "MISSING_DEFAULT_SECRET",
            AuthError::MissingCredential(_) => "MISSING_CREDENTIAL",
            AuthError::InvalidCredential { .. } => "INVALID_CREDENTIAL",
            AuthError::InvalidAuthorizationFormat { .. } => "INVALID_AUTHORIZATION_FORMAT",
        }
    }

    /// Message safe to hand to a client.
    ///
    /// In diagnostics mode this is the full Display text. Otherwise only a
    /// generic message per category is returned so verification internals
    /// (issuer values, header field names, key ids) never leak.
    pub fn public_message(&self, debug: bool) -> String {
        if debug {
            return self.to_string();
        }
        match self {
            AuthError::MissingCredential(token_type) => {
                format!("Missing {} token", token_type)
            }
            AuthError::InvalidCredential { token_type, .. } => {
                format!("Invalid {} token", token_type)
            }
            AuthError::TokenExpired { .. } => "Token expired".to_string(),
            e if e.is_server_error() => "Internal server error".to_string(),
            _ => "Invalid token".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::InvalidSignature.status_code(), 401);
        assert_eq!(AuthError::MissingCredential("access".into()).status_code(), 401);
        assert_eq!(AuthError::UnknownTokenType("nope".into()).status_code(), 500);
        assert_eq!(AuthError::Configuration("bad".into()).status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_details() {
        let err = AuthError::IssuerNotAllowed("svc-b".into());
        assert_eq!(err.public_message(false), "Invalid token");
        assert!(err.public_message(true).contains("svc-b"));
    }

    #[test]
    fn test_header_mismatch_display() {
        let err = AuthError::HeaderMismatch {
            field: "env".into(),
            expected: "\"staging\"".into(),
            actual: None,
        };
        assert_eq!(
            err.to_string(),
            "Header claim 'env' mismatch: expected \"staging\", got nothing"
        );
    }
}
