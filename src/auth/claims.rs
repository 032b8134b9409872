//! JWT header claims
//!
//! [`HeaderClaims`] are the extra header fields a token type writes when
//! signing and demands when verifying. [`DecodedHeader`] is the parsed first
//! segment of a token, read before its signature is checked.

use super::AuthError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Header fields the signer controls and a custom claim may not redefine.
const RESERVED_HEADER_FIELDS: [&str; 4] = ["alg", "kid", "typ", "cty"];

/// Expected JWT header fields beyond `alg` and `kid`.
///
/// # Example
///
/// ```
/// use jwt_warden::auth::HeaderClaims;
///
/// let claims = HeaderClaims::new()
///     .with_typ("JWT")
///     .with_extra("env", "prod");
/// assert_eq!(claims.typ.as_deref(), Some("JWT"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl HeaderClaims {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }

    #[must_use]
    pub fn with_cty(mut self, cty: impl Into<String>) -> Self {
        self.cty = Some(cty.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.typ.is_none() && self.cty.is_none() && self.extra.is_empty()
    }

    /// Reject extension claims that would shadow a reserved header field.
    pub fn validate(&self) -> Result<(), AuthError> {
        match self
            .extra
            .keys()
            .find(|name| RESERVED_HEADER_FIELDS.contains(&name.as_str()) || name.is_empty())
        {
            Some(name) => Err(AuthError::Configuration(format!(
                "Header claim '{}' cannot be configured as an extra claim",
                name
            ))),
            None => Ok(()),
        }
    }

    /// Every expected field as `(name, value)`, well-known fields first.
    pub fn expected_fields(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        let typ = self.typ.as_ref().map(|v| ("typ", Value::String(v.clone())));
        let cty = self.cty.as_ref().map(|v| ("cty", Value::String(v.clone())));
        typ.into_iter()
            .chain(cty)
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }

    /// Check every expected field against a decoded header.
    ///
    /// Stops at the first field that is absent or differs.
    pub fn check(&self, header: &DecodedHeader) -> Result<(), AuthError> {
        for (field, expected) in self.expected_fields() {
            let actual = header.field(field);
            if actual != Some(&expected) {
                return Err(AuthError::HeaderMismatch {
                    field: field.to_string(),
                    expected: display_value(&expected),
                    actual: actual.map(display_value),
                });
            }
        }
        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parsed JWT header.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedHeader {
    pub alg: String,
    pub kid: Option<String>,
    fields: Map<String, Value>,
}

impl DecodedHeader {
    /// Interpret a JSON object as a JWT header.
    ///
    /// `alg` must be a string. A non-string `kid` is treated as absent.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, AuthError> {
        let alg = fields
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::MalformedToken("header has no 'alg'".into()))?
            .to_string();
        let kid = fields
            .get("kid")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self { alg, kid, fields })
    }

    pub fn typ(&self) -> Option<&str> {
        self.fields.get("typ").and_then(Value::as_str)
    }

    pub fn cty(&self) -> Option<&str> {
        self.fields.get("cty").and_then(Value::as_str)
    }

    /// Raw header field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header(value: Value) -> DecodedHeader {
        match value {
            Value::Object(map) => DecodedHeader::from_fields(map).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_reserved_extra_rejected() {
        let claims = HeaderClaims::new().with_extra("kid", "evil");
        assert!(matches!(claims.validate(), Err(AuthError::Configuration(_))));

        let claims = HeaderClaims::new().with_extra("env", "prod");
        assert!(claims.validate().is_ok());
    }

    #[test]
    fn test_check_matches() {
        let claims = HeaderClaims::new().with_typ("JWT").with_extra("env", "prod");
        let decoded = header(json!({"alg": "HS256", "kid": "k1", "typ": "JWT", "env": "prod"}));
        assert!(claims.check(&decoded).is_ok());
    }

    #[test]
    fn test_check_reports_first_mismatch() {
        let claims = HeaderClaims::new().with_typ("JWT").with_extra("env", "staging");
        let decoded = header(json!({"alg": "HS256", "typ": "JWT", "env": "prod"}));
        match claims.check(&decoded) {
            Err(AuthError::HeaderMismatch {
                field,
                expected,
                actual,
            }) => {
                assert_eq!(field, "env");
                assert_eq!(expected, "staging");
                assert_eq!(actual.as_deref(), Some("prod"));
            }
            other => panic!("Expected HeaderMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_check_missing_field() {
        let claims = HeaderClaims::new().with_cty("application/json");
        let decoded = header(json!({"alg": "HS256"}));
        assert!(matches!(
            claims.check(&decoded),
            Err(AuthError::HeaderMismatch { actual: None, .. })
        ));
    }

    #[test]
    fn test_header_requires_alg() {
        let mut map = Map::new();
        map.insert("kid".into(), json!("k1"));
        assert!(matches!(
            DecodedHeader::from_fields(map),
            Err(AuthError::MalformedToken(_))
        ));
    }
}
