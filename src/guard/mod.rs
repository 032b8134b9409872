//! Request guard
//!
//! Resolves which token types a request must present, combining the
//! service-wide mandatory types with what the route declares, and verifies
//! each of them from the request headers.
//!
//! The resolver never touches the request itself: it returns a
//! [`VerificationOutcome`] the caller threads into handler context.

use crate::auth::{AuthError, JwtService, Payload};
use crate::metrics;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Route-level token requirement supplied by the routing layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RouteRequirement {
    /// No verification at all, mandatory types included
    Disabled,
    /// Only the mandatory types
    #[default]
    Implicit,
    /// These types on top of the mandatory ones
    Explicit(Vec<String>),
}

impl RouteRequirement {
    pub fn explicit<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RouteRequirement::Explicit(types.into_iter().map(Into::into).collect())
    }
}

/// Case-insensitive access to request headers
pub trait HeaderLookup {
    fn header(&self, name: &str) -> Option<&str>;

    /// Request method, recorded on the guard span when known
    fn method(&self) -> Option<&str> {
        None
    }

    /// Request path, recorded on the guard span when known
    fn path(&self) -> Option<&str> {
        None
    }
}

impl HeaderLookup for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

impl HeaderLookup for [(String, String)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl HeaderLookup for Vec<(String, String)> {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Authentication request context
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub headers: Vec<(String, String)>,
    pub method: String,
    pub path: String,
}

impl AuthRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            headers: Vec::new(),
            method: method.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl HeaderLookup for AuthRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.header(name)
    }

    fn method(&self) -> Option<&str> {
        Some(self.method.as_str())
    }

    fn path(&self) -> Option<&str> {
        Some(self.path.as_str())
    }
}

/// Verified payloads of one request, keyed by token type name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationOutcome {
    payloads: BTreeMap<String, Payload>,
}

impl VerificationOutcome {
    pub fn get(&self, token_type: &str) -> Option<&Payload> {
        self.payloads.get(token_type)
    }

    pub fn contains(&self, token_type: &str) -> bool {
        self.payloads.contains_key(token_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.payloads.iter().map(|(name, payload)| (name.as_str(), payload))
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Payload> {
        self.payloads
    }
}

/// Combines mandatory and route-declared requirements and checks them.
///
/// # Example
///
/// ```
/// use jwt_warden::auth::{JwtService, SecretStore, TokenTypeConfig, TokenTypeRegistry};
/// use jwt_warden::guard::{AuthRequest, RequirementResolver, RouteRequirement};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let secrets = SecretStore::new([("k1", "a-long-random-secret")], "k1").unwrap();
/// let registry = TokenTypeRegistry::new([(
///     "access",
///     TokenTypeConfig::new("Authorization", Duration::from_secs(900)),
/// )])
/// .unwrap();
/// let service = Arc::new(JwtService::new(secrets, registry));
/// let resolver = RequirementResolver::new(service.clone(), Vec::<String>::new());
///
/// let token = service.generate_token("access", &Default::default()).unwrap();
/// let request = AuthRequest::new("GET", "/me")
///     .with_header("authorization", format!("Bearer {}", token));
///
/// let outcome = resolver
///     .evaluate(&RouteRequirement::explicit(["access"]), &request)
///     .unwrap()
///     .expect("access is required");
/// assert!(outcome.contains("access"));
/// ```
#[derive(Debug, Clone)]
pub struct RequirementResolver {
    service: Arc<JwtService>,
    mandatory: Vec<String>,
}

impl RequirementResolver {
    pub fn new<I, S>(service: Arc<JwtService>, mandatory: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut resolved = Vec::new();
        for name in mandatory {
            let name = name.into();
            if !resolved.contains(&name) {
                resolved.push(name);
            }
        }
        Self {
            service,
            mandatory: resolved,
        }
    }

    pub fn service(&self) -> &JwtService {
        &self.service
    }

    /// Types every route requires unless it disables verification
    pub fn mandatory_types(&self) -> &[String] {
        &self.mandatory
    }

    /// Ordered, deduplicated token types a route requires.
    ///
    /// Mandatory types come first, then route-declared types not already
    /// present. `Disabled` always resolves to nothing.
    pub fn required_types(&self, route: &RouteRequirement) -> Vec<String> {
        match route {
            RouteRequirement::Disabled => Vec::new(),
            RouteRequirement::Implicit => self.mandatory.clone(),
            RouteRequirement::Explicit(declared) => {
                let mut required = self.mandatory.clone();
                for name in declared {
                    if !required.contains(name) {
                        required.push(name.clone());
                    }
                }
                required
            }
        }
    }

    /// Verify every required token type against the request headers.
    ///
    /// Returns `Ok(None)` when nothing is required, `Ok(Some(outcome))` when
    /// all required types verified, and the first failure otherwise. Later
    /// types are not attempted once one fails.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnknownTokenType`] for a required type that is not
    ///   registered (a server misconfiguration)
    /// - [`AuthError::MissingCredential`] when no usable token was sent
    /// - [`AuthError::InvalidCredential`] when a token fails verification
    #[tracing::instrument(
        name = "jwt.guard",
        skip_all,
        fields(route = ?route, method = headers.method(), path = headers.path())
    )]
    pub fn evaluate<H>(
        &self,
        route: &RouteRequirement,
        headers: &H,
    ) -> Result<Option<VerificationOutcome>, AuthError>
    where
        H: HeaderLookup + ?Sized,
    {
        let required = self.required_types(route);
        if required.is_empty() {
            return Ok(None);
        }

        let mut outcome = VerificationOutcome::default();
        for token_type in required {
            let payload = self
                .verify_one(&token_type, headers)
                .inspect_err(|e| metrics::record_requirement_rejection(e.code()))?;
            outcome.payloads.insert(token_type, payload);
        }

        Ok(Some(outcome))
    }

    fn verify_one<H>(&self, token_type: &str, headers: &H) -> Result<Payload, AuthError>
    where
        H: HeaderLookup + ?Sized,
    {
        let config = self.service.token_type_config(token_type).ok_or_else(|| {
            warn!(token_type, "Route requires a token type that is not registered");
            AuthError::UnknownTokenType(token_type.to_string())
        })?;

        let header_value = headers.header(&config.header_name);
        let token = self
            .service
            .extract_token(header_value, token_type)
            .map_err(|e| self.invalid(token_type, e))?
            .ok_or_else(|| {
                debug!(token_type, header = %config.header_name, "No token presented");
                AuthError::MissingCredential(token_type.to_string())
            })?;

        self.service
            .verify_token(token_type, &token)
            .map_err(|e| self.invalid(token_type, e))
    }

    fn invalid(&self, token_type: &str, source: AuthError) -> AuthError {
        let reason = if self.service.is_debug() {
            source.to_string()
        } else {
            "token verification failed".to_string()
        };
        AuthError::InvalidCredential {
            token_type: token_type.to_string(),
            reason,
            source: Box::new(source),
        }
    }
}
