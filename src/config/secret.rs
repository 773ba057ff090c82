//! Database password handling
//!
//! The password is kept in a `secrecy::Secret`, which zeroes memory on drop
//! and redacts `Debug` output. Reading it requires an explicit
//! `expose_secret()` call at the point where the connection is built.
//!
//! # Example
//!
//! ```rust
//! use tabport::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let password = secret_string("s3cret".to_string());
//! assert_eq!(password.expose_secret().as_ref(), "s3cret");
//! assert!(!format!("{password:?}").contains("s3cret"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Newtype wrapper for String that implements the required traits for Secret
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// A string held in a zeroizing, redacting container
pub type SecretString = Secret<SecretValue>;

/// Wrap a plain string as a [`SecretString`]
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_string_creation() {
        let secret = secret_string("test-password".to_string());
        assert_eq!(secret.expose_secret(), "test-password");
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("sensitive-data".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("sensitive-data"));
    }

    #[test]
    fn test_secret_toml_round_trip() {
        #[derive(Serialize, Deserialize)]
        struct Credentials {
            password: SecretString,
        }

        let parsed: Credentials = toml::from_str("password = \"hunter2\"").unwrap();
        assert_eq!(parsed.password.expose_secret(), "hunter2");

        let rendered = toml::to_string(&parsed).unwrap();
        assert!(rendered.contains("hunter2"));
    }
}
