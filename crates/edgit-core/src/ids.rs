use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Length of a hex-encoded SHA-1 object name.
pub const OBJECT_ID_HEX_LEN: usize = 40;

/// Content address of a stored Git object: 40 lowercase hex characters.
///
/// Identity never changes when an object moves between tiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parses and normalizes (lowercases) a hex object name.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` unless the input is exactly 40 hex digits.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        if Self::is_valid(value) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(CoreError::Validation(format!(
                "invalid object id `{value}`: expected {OBJECT_ID_HEX_LEN} hex characters"
            )))
        }
    }

    /// Returns true when `value` is a syntactically valid object name.
    #[must_use]
    pub fn is_valid(value: &str) -> bool {
        value.len() == OBJECT_ID_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Returns the hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

macro_rules! define_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            #[must_use]
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(JobId, "Unique identifier for a long-running migration job.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_normalizes_case() {
        let id = ObjectId::parse("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        assert_eq!(id.as_str(), "a".repeat(40));
    }

    #[test]
    fn test_object_id_rejects_bad_input() {
        assert!(ObjectId::parse("abc").is_err());
        assert!(ObjectId::parse(&"g".repeat(40)).is_err());
        assert!(ObjectId::parse(&"a".repeat(41)).is_err());
        assert!(ObjectId::parse("").is_err());
    }

    #[test]
    fn test_object_id_serde_is_validated() {
        let id = ObjectId::parse(&"b".repeat(40)).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "b".repeat(40)));
        assert!(serde_json::from_str::<ObjectId>("\"nope\"").is_err());
    }

    #[test]
    fn test_job_id_round_trip() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
