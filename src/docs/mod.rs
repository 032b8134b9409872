//! API documentation support
//!
//! Describes each registered token type as an OpenAPI security scheme. Types
//! carried in `Authorization` become HTTP bearer schemes; any other header
//! becomes an `apiKey` scheme naming that header.

use crate::auth::TokenTypeRegistry;
use serde::Serialize;
use std::collections::BTreeMap;

/// OpenAPI 3 security scheme object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SecurityScheme {
    #[serde(rename = "http")]
    Bearer {
        scheme: String,
        #[serde(rename = "bearerFormat")]
        bearer_format: String,
        description: String,
    },
    #[serde(rename = "apiKey")]
    Header {
        #[serde(rename = "in")]
        location: String,
        name: String,
        description: String,
    },
}

/// One security scheme per registered token type, keyed by type name.
pub fn security_schemes(registry: &TokenTypeRegistry) -> BTreeMap<String, SecurityScheme> {
    registry
        .iter()
        .map(|(name, config)| {
            let scheme = if config.uses_authorization_header() {
                SecurityScheme::Bearer {
                    scheme: "bearer".into(),
                    bearer_format: "JWT".into(),
                    description: format!("{} token", name),
                }
            } else {
                SecurityScheme::Header {
                    location: "header".into(),
                    name: config.header_name.clone(),
                    description: format!("{} token as 'Bearer <token>'", name),
                }
            };
            (name.to_string(), scheme)
        })
        .collect()
}
