//! Credentials read from configuration
//!
//! Two values in `quarry.toml` are sensitive: the service-account secret used
//! for the analytics API and the PostgreSQL connection string, which usually
//! embeds a password. Both are held as [`SecretString`]. The value is wiped on
//! drop, redacted in `Debug`, and written as `[REDACTED]` if a config is ever
//! serialized back out, so neither a log line nor a config dump carries it.
//!
//! ```rust
//! use quarry::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let secret = secret_string("service-account-secret".to_string());
//! assert_eq!(secret.expose_secret().as_ref(), "service-account-secret");
//! assert!(!format!("{:?}", secret).contains("service-account"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

const REDACTED: &str = "[REDACTED]";

/// Credential text, zeroized when dropped
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl SecretValue {
    /// True when the value is empty or only whitespace, as left by an unset
    /// `${VAR}` that expanded to nothing
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(REDACTED)
    }
}

/// A credential as stored in [`crate::config::QuarryConfig`]
pub type SecretString = Secret<SecretValue>;

/// Wrap a credential read from the environment or a config file
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue(value))
}
