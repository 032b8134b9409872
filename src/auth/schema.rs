//! Payload schemas
//!
//! A token type may carry a [`PayloadSchema`] that every verified payload must
//! satisfy. [`ClaimSchema`] covers the common "these claims must exist with
//! these JSON types" case and can be read from configuration.

use super::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Validates the shape of a decoded payload.
///
/// Returns a human-readable description of the first problem found.
pub trait PayloadSchema: Send + Sync + fmt::Debug {
    fn validate(&self, payload: &Payload) -> Result<(), String>;
}

/// JSON type a claim is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Any non-null value
    Any,
}

impl ClaimType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ClaimType::String => value.is_string(),
            ClaimType::Number => value.is_number(),
            ClaimType::Integer => value.is_i64() || value.is_u64(),
            ClaimType::Boolean => value.is_boolean(),
            ClaimType::Array => value.is_array(),
            ClaimType::Object => value.is_object(),
            ClaimType::Any => !value.is_null(),
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimType::String => "string",
            ClaimType::Number => "number",
            ClaimType::Integer => "integer",
            ClaimType::Boolean => "boolean",
            ClaimType::Array => "array",
            ClaimType::Object => "object",
            ClaimType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Required and optional claims with their JSON types.
///
/// ```yaml
/// payload_schema:
///   required: { sub: string, roles: array }
///   optional: { tenant: string }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimSchema {
    #[serde(default)]
    pub required: BTreeMap<String, ClaimType>,
    /// Claims that may be absent but must have this type when present
    #[serde(default)]
    pub optional: BTreeMap<String, ClaimType>,
}

impl ClaimSchema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require(mut self, claim: impl Into<String>, kind: ClaimType) -> Self {
        self.required.insert(claim.into(), kind);
        self
    }

    #[must_use]
    pub fn allow(mut self, claim: impl Into<String>, kind: ClaimType) -> Self {
        self.optional.insert(claim.into(), kind);
        self
    }
}

impl PayloadSchema for ClaimSchema {
    fn validate(&self, payload: &Payload) -> Result<(), String> {
        for (claim, kind) in &self.required {
            match payload.get(claim) {
                None => return Err(format!("missing required claim '{}'", claim)),
                Some(value) if !kind.matches(value) => {
                    return Err(format!("claim '{}' must be {}", claim, kind))
                }
                Some(_) => {}
            }
        }
        for (claim, kind) in &self.optional {
            if let Some(value) = payload.get(claim) {
                if !kind.matches(value) {
                    return Err(format!("claim '{}' must be {}", claim, kind));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_required_claims() {
        let schema = ClaimSchema::new()
            .require("sub", ClaimType::String)
            .require("roles", ClaimType::Array);

        assert!(schema
            .validate(&payload(json!({"sub": "u1", "roles": ["admin"]})))
            .is_ok());
        assert_eq!(
            schema.validate(&payload(json!({"sub": "u1"}))),
            Err("missing required claim 'roles'".to_string())
        );
        assert_eq!(
            schema.validate(&payload(json!({"sub": 7, "roles": []}))),
            Err("claim 'sub' must be string".to_string())
        );
    }

    #[test]
    fn test_optional_claims() {
        let schema = ClaimSchema::new().allow("tenant", ClaimType::String);
        assert!(schema.validate(&payload(json!({}))).is_ok());
        assert!(schema.validate(&payload(json!({"tenant": true}))).is_err());
    }

    #[test]
    fn test_integer_vs_number() {
        let schema = ClaimSchema::new().require("level", ClaimType::Integer);
        assert!(schema.validate(&payload(json!({"level": 3}))).is_ok());
        assert!(schema.validate(&payload(json!({"level": 3.5}))).is_err());
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let schema: ClaimSchema =
            serde_yaml::from_str("required:\n  sub: string\n  admin: boolean\n").unwrap();
        assert_eq!(schema.required.get("admin"), Some(&ClaimType::Boolean));
        assert!(schema.optional.is_empty());
    }
}
