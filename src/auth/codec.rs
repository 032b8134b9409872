//! Token codec
//!
//! Signs payloads into compact `header.payload.signature` tokens and runs the
//! ordered verification pipeline:
//!
//! 1. structure (three non-empty segments, size limit)
//! 2. header decode
//! 3. `kid` presence
//! 4. expected header claims
//! 5. secret lookup by `kid`
//! 6. signature, then `exp`
//! 7. issuer allow-list (only when one is supplied)
//!
//! Each step returns early with its own [`AuthError`] kind.

use super::{AuthError, DecodedHeader, HeaderClaims, Payload, SecretStore};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Maximum accepted token length (8KB).
///
/// Longer tokens are rejected before any base64 or JSON decoding.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Signing parameters beyond the payload, secret and lifetime.
#[derive(Debug, Clone, Copy)]
pub struct SignOptions<'a> {
    pub algorithm: Algorithm,
    pub issuer: Option<&'a str>,
    pub audience: Option<&'a str>,
    pub header_claims: Option<&'a HeaderClaims>,
}

impl Default for SignOptions<'_> {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            issuer: None,
            audience: None,
            header_claims: None,
        }
    }
}

/// What a token must satisfy beyond a valid signature and expiry.
#[derive(Debug, Clone, Copy)]
pub struct VerifyConstraints<'a> {
    /// Algorithm the token must be signed with
    pub algorithm: Algorithm,
    /// Accepted `iss` values. `None` or an empty set skips issuer checks.
    pub allowed_issuers: Option<&'a BTreeSet<String>>,
    pub header_claims: Option<&'a HeaderClaims>,
}

impl Default for VerifyConstraints<'_> {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            allowed_issuers: None,
            header_claims: None,
        }
    }
}

/// Sign `payload` with the secret owned by `key_id`.
///
/// `exp` is set to now + `expires_in` and `iat` to now. `iss`/`aud` are set
/// when the options carry them.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] when the algorithm cannot be used with
/// the secret or the lifetime does not fit a timestamp, and
/// [`AuthError::InvalidPayloadShape`] when the signed token would exceed
/// [`MAX_TOKEN_SIZE_BYTES`].
pub fn sign(
    payload: &Payload,
    secret: &SecretString,
    key_id: &str,
    expires_in: Duration,
    options: &SignOptions<'_>,
) -> Result<String, AuthError> {
    sign_at(
        payload,
        secret,
        key_id,
        expires_in,
        options,
        Utc::now().timestamp(),
    )
}

/// [`sign`] with an explicit issue time (seconds since the epoch).
pub fn sign_at(
    payload: &Payload,
    secret: &SecretString,
    key_id: &str,
    expires_in: Duration,
    options: &SignOptions<'_>,
    now: i64,
) -> Result<String, AuthError> {
    let lifetime = i64::try_from(expires_in.as_secs())
        .map_err(|_| AuthError::Configuration("expires_in is too large".into()))?;
    let exp = now
        .checked_add(lifetime)
        .ok_or_else(|| AuthError::Configuration("expires_in is too large".into()))?;

    let mut header = Map::new();
    header.insert("alg".into(), algorithm_value(options.algorithm)?);
    header.insert("kid".into(), Value::String(key_id.to_string()));
    if let Some(claims) = options.header_claims {
        for (field, value) in claims.expected_fields() {
            header.insert(field.to_string(), value);
        }
    }

    let mut claims = payload.clone();
    claims.insert("iat".into(), Value::from(now));
    claims.insert("exp".into(), Value::from(exp));
    if let Some(issuer) = options.issuer {
        claims.insert("iss".into(), Value::String(issuer.to_string()));
    }
    if let Some(audience) = options.audience {
        claims.insert("aud".into(), Value::String(audience.to_string()));
    }

    let message = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    let signature = crypto::sign(message.as_bytes(), &key, options.algorithm)
        .map_err(|e| AuthError::Configuration(format!("Failed to sign token: {}", e)))?;

    let token = format!("{}.{}", message, signature);
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        return Err(AuthError::InvalidPayloadShape(format!(
            "signed token is {} bytes, limit is {}",
            token.len(),
            MAX_TOKEN_SIZE_BYTES
        )));
    }
    Ok(token)
}

/// Run the structural checks and parse the header, without touching keys.
pub fn decode_header(token: &str) -> Result<DecodedHeader, AuthError> {
    let (header, _, _) = split_token(token)?;
    parse_header(header)
}

/// Verify `token` against `secrets` and `constraints`, returning its claims.
///
/// # Errors
///
/// One of the token-level [`AuthError`] kinds, from the first pipeline step
/// that fails.
pub fn verify(
    token: &str,
    secrets: &SecretStore,
    constraints: &VerifyConstraints<'_>,
) -> Result<Payload, AuthError> {
    verify_at(token, secrets, constraints, Utc::now().timestamp())
}

/// [`verify`] against an explicit current time (seconds since the epoch).
pub fn verify_at(
    token: &str,
    secrets: &SecretStore,
    constraints: &VerifyConstraints<'_>,
    now: i64,
) -> Result<Payload, AuthError> {
    let (header_segment, payload_segment, signature) = split_token(token)?;
    let header = parse_header(header_segment)?;

    let kid = match header.kid.as_deref() {
        Some(kid) if !kid.is_empty() => kid,
        _ => {
            debug!("Rejecting token without kid");
            return Err(AuthError::MissingKeyId);
        }
    };

    if let Some(expected) = constraints.header_claims {
        expected.check(&header).inspect_err(|e| {
            debug!(kid, error = %e, "Rejecting token with unexpected header claims");
        })?;
    }

    let secret = secrets.get(kid).ok_or_else(|| {
        debug!(kid, "Rejecting token signed with unknown key id");
        AuthError::UnknownKeyId(kid.to_string())
    })?;

    if header.alg != algorithm_name(constraints.algorithm)? {
        debug!(kid, alg = %header.alg, "Rejecting token with unexpected algorithm");
        return Err(AuthError::InvalidSignature);
    }

    let message_len = header_segment.len() + 1 + payload_segment.len();
    let message = token
        .get(..message_len)
        .ok_or_else(|| AuthError::MalformedToken("token is not valid UTF-8".into()))?;
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let valid = crypto::verify(signature, message.as_bytes(), &key, constraints.algorithm)
        .unwrap_or(false);
    if !valid {
        debug!(kid, "Rejecting token with invalid signature");
        return Err(AuthError::InvalidSignature);
    }

    let payload = decode_segment(payload_segment, "payload")?;
    let exp = payload
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or_else(|| AuthError::MalformedToken("payload has no integer 'exp'".into()))?;
    let expired_at = DateTime::<Utc>::from_timestamp(exp, 0)
        .ok_or_else(|| AuthError::MalformedToken(format!("'exp' {} is out of range", exp)))?;
    if now >= exp {
        debug!(kid, exp, "Rejecting expired token");
        return Err(AuthError::TokenExpired { expired_at });
    }

    if let Some(allowed) = constraints.allowed_issuers.filter(|set| !set.is_empty()) {
        match payload.get("iss").and_then(Value::as_str) {
            None => {
                debug!(kid, "Rejecting token without issuer");
                return Err(AuthError::MissingIssuer);
            }
            Some(iss) if !allowed.contains(iss) => {
                debug!(kid, iss, "Rejecting token from disallowed issuer");
                return Err(AuthError::IssuerNotAllowed(iss.to_string()));
            }
            Some(_) => {}
        }
    }

    Ok(payload)
}

/// Canonical name of an algorithm as written in the `alg` header
pub fn algorithm_name(algorithm: Algorithm) -> Result<String, AuthError> {
    match algorithm_value(algorithm)? {
        Value::String(name) => Ok(name),
        other => Err(AuthError::Configuration(format!(
            "Unexpected algorithm encoding: {}",
            other
        ))),
    }
}

fn algorithm_value(algorithm: Algorithm) -> Result<Value, AuthError> {
    serde_json::to_value(algorithm)
        .map_err(|e| AuthError::Configuration(format!("Invalid algorithm: {}", e)))
}

fn split_token(token: &str) -> Result<(&str, &str, &str), AuthError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        debug!(len = token.len(), "Rejecting oversized token");
        return Err(AuthError::MalformedToken(format!(
            "token exceeds {} bytes",
            MAX_TOKEN_SIZE_BYTES
        )));
    }

    let mut segments = token.split('.');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok((header, payload, signature))
        }
        _ => Err(AuthError::MalformedToken(
            "expected three non-empty dot-separated segments".into(),
        )),
    }
}

fn parse_header(segment: &str) -> Result<DecodedHeader, AuthError> {
    DecodedHeader::from_fields(decode_segment(segment, "header")?)
}

fn decode_segment(segment: &str, what: &str) -> Result<Map<String, Value>, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("{} is not base64url: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("{} is not a JSON object: {}", what, e)))
}

fn encode_segment(value: &Map<String, Value>) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| AuthError::Configuration(format!("Failed to encode token: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn store() -> SecretStore {
        SecretStore::new([("k1", "secret-one"), ("k2", "secret-two")], "k1").unwrap()
    }

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn sign_with(kid: &str, options: &SignOptions<'_>, now: i64) -> String {
        let store = store();
        sign_at(
            &payload(json!({"sub": "user123"})),
            store.get(kid).unwrap(),
            kid,
            Duration::from_secs(3600),
            options,
            now,
        )
        .unwrap()
    }

    /// Correctly signed with k1 but with caller-controlled claims
    fn sign_raw(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "HS256", "kid": "k1"}).to_string());
        let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
        let message = format!("{}.{}", header, claims);
        let key = EncodingKey::from_secret(b"secret-one");
        let signature = crypto::sign(message.as_bytes(), &key, Algorithm::HS256).unwrap();
        format!("{}.{}", message, signature)
    }

    fn forge(header: Value, claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.c2ln", header, claims)
    }

    #[test]
    fn test_sign_sets_standard_claims() {
        let token = sign_with(
            "k1",
            &SignOptions {
                issuer: Some("svc-a"),
                audience: Some("api"),
                ..Default::default()
            },
            NOW,
        );
        let claims = verify_at(&token, &store(), &VerifyConstraints::default(), NOW).unwrap();
        assert_eq!(claims["sub"], "user123");
        assert_eq!(claims["iat"], NOW);
        assert_eq!(claims["exp"], NOW + 3600);
        assert_eq!(claims["iss"], "svc-a");
        assert_eq!(claims["aud"], "api");
    }

    #[test]
    fn test_header_carries_kid_and_claims() {
        let header_claims = HeaderClaims::new().with_typ("JWT").with_extra("env", "prod");
        let token = sign_with(
            "k2",
            &SignOptions {
                algorithm: Algorithm::HS384,
                header_claims: Some(&header_claims),
                ..Default::default()
            },
            NOW,
        );
        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, "HS384");
        assert_eq!(header.kid.as_deref(), Some("k2"));
        assert_eq!(header.typ(), Some("JWT"));
        assert_eq!(header.field("env"), Some(&json!("prod")));
    }

    #[test]
    fn test_structural_failures() {
        let constraints = VerifyConstraints::default();
        for token in ["", "abc", "a.b", "a..c", "a.b.c.d", ".b.c"] {
            assert!(
                matches!(
                    verify_at(token, &store(), &constraints, NOW),
                    Err(AuthError::MalformedToken(_))
                ),
                "{:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_oversized_token_rejected() {
        let token = format!("{}.b.c", "a".repeat(MAX_TOKEN_SIZE_BYTES));
        assert!(matches!(
            decode_header(&token),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_undecodable_header_is_malformed() {
        assert!(matches!(
            decode_header("!!!.e30.c2ln"),
            Err(AuthError::MalformedToken(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode("not json");
        assert!(matches!(
            decode_header(&format!("{}.e30.c2ln", not_json)),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_missing_kid() {
        let token = forge(json!({"alg": "HS256"}), json!({"exp": NOW + 10}));
        assert!(matches!(
            verify_at(&token, &store(), &VerifyConstraints::default(), NOW),
            Err(AuthError::MissingKeyId)
        ));

        let token = forge(json!({"alg": "HS256", "kid": ""}), json!({"exp": NOW + 10}));
        assert!(matches!(
            verify_at(&token, &store(), &VerifyConstraints::default(), NOW),
            Err(AuthError::MissingKeyId)
        ));
    }

    #[test]
    fn test_unknown_kid() {
        let token = forge(json!({"alg": "HS256", "kid": "k9"}), json!({"exp": NOW + 10}));
        match verify_at(&token, &store(), &VerifyConstraints::default(), NOW) {
            Err(AuthError::UnknownKeyId(kid)) => assert_eq!(kid, "k9"),
            other => panic!("Expected UnknownKeyId, got {:?}", other),
        }
    }

    #[test]
    fn test_header_claims_checked_before_signature() {
        let expected = HeaderClaims::new().with_extra("env", "staging");
        let token = forge(
            json!({"alg": "HS256", "kid": "k1", "env": "prod"}),
            json!({"exp": NOW + 10}),
        );
        let constraints = VerifyConstraints {
            header_claims: Some(&expected),
            ..Default::default()
        };
        assert!(matches!(
            verify_at(&token, &store(), &constraints, NOW),
            Err(AuthError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn test_header_claims_checked_before_key_lookup() {
        let expected = HeaderClaims::new().with_extra("env", "staging");
        let token = forge(
            json!({"alg": "HS256", "kid": "k9", "env": "prod"}),
            json!({"exp": NOW + 10}),
        );
        let constraints = VerifyConstraints {
            header_claims: Some(&expected),
            ..Default::default()
        };
        match verify_at(&token, &store(), &constraints, NOW) {
            Err(AuthError::HeaderMismatch { field, .. }) => assert_eq!(field, "env"),
            other => panic!("Expected HeaderMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let token = sign_with("k1", &SignOptions::default(), NOW);
        let tampered = format!("{}x", token);
        assert!(matches!(
            verify_at(&tampered, &store(), &VerifyConstraints::default(), NOW),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_secret_swap_detected() {
        // kid says k2 but the signature was made with k1's secret
        let store = store();
        let token = sign_at(
            &Payload::new(),
            store.get("k1").unwrap(),
            "k2",
            Duration::from_secs(60),
            &SignOptions::default(),
            NOW,
        )
        .unwrap();
        assert!(matches!(
            verify_at(&token, &store, &VerifyConstraints::default(), NOW),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_algorithm_pinned() {
        let token = sign_with(
            "k1",
            &SignOptions {
                algorithm: Algorithm::HS512,
                ..Default::default()
            },
            NOW,
        );
        assert!(matches!(
            verify_at(&token, &store(), &VerifyConstraints::default(), NOW),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let token = sign_with("k1", &SignOptions::default(), NOW);
        let constraints = VerifyConstraints::default();
        assert!(verify_at(&token, &store(), &constraints, NOW + 3599).is_ok());
        match verify_at(&token, &store(), &constraints, NOW + 3600) {
            Err(AuthError::TokenExpired { expired_at }) => {
                assert_eq!(expired_at.timestamp(), NOW + 3600)
            }
            other => panic!("Expected TokenExpired, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_lifetime_expires_immediately() {
        let store = store();
        let token = sign_at(
            &Payload::new(),
            store.get("k1").unwrap(),
            "k1",
            Duration::ZERO,
            &SignOptions::default(),
            NOW,
        )
        .unwrap();
        assert!(matches!(
            verify_at(&token, &store, &VerifyConstraints::default(), NOW),
            Err(AuthError::TokenExpired { .. })
        ));
    }

    #[test]
    fn test_issuer_gating() {
        let allowed: BTreeSet<String> = ["svc-a".to_string()].into();
        let gated = VerifyConstraints {
            allowed_issuers: Some(&allowed),
            ..Default::default()
        };

        let from_b = sign_with(
            "k1",
            &SignOptions {
                issuer: Some("svc-b"),
                ..Default::default()
            },
            NOW,
        );
        match verify_at(&from_b, &store(), &gated, NOW) {
            Err(AuthError::IssuerNotAllowed(iss)) => assert_eq!(iss, "svc-b"),
            other => panic!("Expected IssuerNotAllowed, got {:?}", other),
        }

        let anonymous = sign_with("k1", &SignOptions::default(), NOW);
        assert!(matches!(
            verify_at(&anonymous, &store(), &gated, NOW),
            Err(AuthError::MissingIssuer)
        ));

        let open = VerifyConstraints::default();
        assert!(verify_at(&from_b, &store(), &open, NOW).is_ok());
        assert!(verify_at(&anonymous, &store(), &open, NOW).is_ok());

        let empty = BTreeSet::new();
        let empty_set = VerifyConstraints {
            allowed_issuers: Some(&empty),
            ..Default::default()
        };
        assert!(verify_at(&anonymous, &store(), &empty_set, NOW).is_ok());
    }

    #[test]
    fn test_non_integer_exp_is_malformed() {
        for exp in [json!(NOW as f64 + 10.5), json!("1700000010"), json!(u64::MAX)] {
            let token = sign_raw(json!({"exp": exp}));
            assert!(
                matches!(
                    verify_at(&token, &store(), &VerifyConstraints::default(), NOW),
                    Err(AuthError::MalformedToken(_))
                ),
                "exp {} should be malformed",
                exp
            );
        }
    }

    #[test]
    fn test_unrepresentable_exp_is_malformed() {
        let token = sign_raw(json!({"exp": i64::MIN}));
        assert!(matches!(
            verify_at(&token, &store(), &VerifyConstraints::default(), NOW),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_sign_rejects_oversized_token() {
        let store = store();
        let big = payload(json!({"blob": "x".repeat(MAX_TOKEN_SIZE_BYTES)}));
        assert!(matches!(
            sign_at(
                &big,
                store.get("k1").unwrap(),
                "k1",
                Duration::from_secs(60),
                &SignOptions::default(),
                NOW,
            ),
            Err(AuthError::InvalidPayloadShape(_))
        ));
    }
}
