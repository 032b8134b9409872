//! Signing secret store
//!
//! Maps key identifiers to shared secrets. Every new signature uses the
//! default key id; verification picks the secret named by the token's `kid`.

use super::AuthError;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;

/// Immutable kid -> secret mapping with a designated signing key.
///
/// `Debug` output never contains secret material.
#[derive(Debug, Clone)]
pub struct SecretStore {
    secrets: BTreeMap<String, SecretString>,
    default_key_id: String,
}

impl SecretStore {
    /// Build a store, failing if `default_key_id` has no registered secret.
    ///
    /// # Example
    ///
    /// ```
    /// use jwt_warden::auth::SecretStore;
    ///
    /// let store = SecretStore::new(
    ///     [("2024-06", "current-secret"), ("2024-01", "previous-secret")],
    ///     "2024-06",
    /// )
    /// .unwrap();
    /// assert_eq!(store.default_key_id(), "2024-06");
    /// ```
    pub fn new<I, K, S>(secrets: I, default_key_id: impl Into<String>) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Into<String>,
    {
        let secrets = secrets
            .into_iter()
            .map(|(kid, secret)| {
                let secret: String = secret.into();
                (kid.into(), SecretString::from(secret))
            })
            .collect();
        Self::from_secrets(secrets, default_key_id.into())
    }

    /// Build a store from already-wrapped secrets.
    pub fn from_secrets(
        secrets: BTreeMap<String, SecretString>,
        default_key_id: String,
    ) -> Result<Self, AuthError> {
        if let Some(kid) = secrets.keys().find(|kid| kid.is_empty()) {
            return Err(AuthError::Configuration(format!(
                "Key id must not be empty (got {:?})",
                kid
            )));
        }
        if let Some((kid, _)) = secrets
            .iter()
            .find(|(_, secret)| secret.expose_secret().is_empty())
        {
            return Err(AuthError::Configuration(format!(
                "Secret for key id '{}' is empty",
                kid
            )));
        }
        if !secrets.contains_key(&default_key_id) {
            return Err(AuthError::Configuration(format!(
                "Default key id '{}' is not among the configured secrets",
                default_key_id
            )));
        }

        Ok(Self {
            secrets,
            default_key_id,
        })
    }

    /// Key id used for new signatures
    pub fn default_key_id(&self) -> &str {
        &self.default_key_id
    }

    /// Secret registered under `kid`
    pub fn get(&self, kid: &str) -> Option<&SecretString> {
        self.secrets.get(kid)
    }

    /// The default key id together with its secret.
    pub fn signing_secret(&self) -> Result<(&str, &SecretString), AuthError> {
        self.secrets
            .get(&self.default_key_id)
            .map(|secret| (self.default_key_id.as_str(), secret))
            .ok_or_else(|| AuthError::MissingDefaultSecret(self.default_key_id.clone()))
    }

    /// Registered key ids in sorted order
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }
}
