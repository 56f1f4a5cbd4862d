//! Domain identifier types with validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_DESTINATION_LEN: usize = 63;

/// Destination name newtype wrapper
///
/// Names the table (or file) an export lands in. Restricted to a portable
/// identifier so every sink can use it verbatim.
///
/// # Examples
///
/// ```
/// use quarry::domain::ids::DestinationName;
/// use std::str::FromStr;
///
/// let dest = DestinationName::from_str("events_2024").unwrap();
/// assert_eq!(dest.as_str(), "events_2024");
/// assert!(DestinationName::from_str("drop table;").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DestinationName(String);

impl DestinationName {
    /// Creates a new DestinationName
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, longer than 63 characters, or
    /// not of the form `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.is_empty() {
            return Err("Destination name cannot be empty".to_string());
        }
        if name.len() > MAX_DESTINATION_LEN {
            return Err(format!(
                "Destination name '{name}' exceeds {MAX_DESTINATION_LEN} characters"
            ));
        }

        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "Invalid destination name '{name}'. Use letters, digits and underscores, not starting with a digit"
            ));
        }

        Ok(Self(name))
    }

    /// Returns the destination name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DestinationName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DestinationName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DestinationName> for String {
    fn from(value: DestinationName) -> Self {
        value.0
    }
}

impl AsRef<str> for DestinationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
