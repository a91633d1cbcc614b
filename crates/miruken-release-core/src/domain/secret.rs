//! Secret values that never render in plaintext.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;

/// Fixed placeholder rendered wherever a secret would appear.
pub const MASK: &str = "********";

/// A secret read once from the environment and held only in memory.
///
/// `Debug` and `Display` both render [`MASK`]; the value is reachable only
/// through [`SecretValue::expose`].
#[derive(Clone)]
pub struct SecretValue {
    inner: Arc<SecretString>,
}

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SecretString::from(value.into())),
        }
    }

    /// The plaintext value. Only for handing to a transport.
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }

    /// Replace every occurrence of this secret in `text` with [`MASK`].
    pub fn redact(&self, text: &str) -> String {
        let value = self.expose();
        if value.is_empty() {
            return text.to_string();
        }
        text.replace(value, MASK)
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

/// Redact every secret in `secrets` from `text`.
pub fn redact_all(secrets: &[SecretValue], text: &str) -> String {
    secrets
        .iter()
        .fold(text.to_string(), |acc, secret| secret.redact(&acc))
}
