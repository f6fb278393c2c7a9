use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ObjectId;

/// Git object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }
}

impl FromStr for ObjectType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(CoreError::Validation(format!("Invalid object type: {}", s))),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable content-addressed object as held by a tier.
///
/// Migration changes where an object lives, never its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub sha: ObjectId,
    pub object_type: ObjectType,
    pub data: Bytes,
    pub size: u64,
}

impl StoredObject {
    /// Builds an object, deriving `size` from the payload length.
    #[must_use]
    pub fn new(sha: ObjectId, object_type: ObjectType, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            sha,
            object_type,
            data,
        }
    }

    /// Returns a copy carrying a different payload (size follows the payload).
    #[must_use]
    pub fn with_data(&self, data: impl Into<Bytes>) -> Self {
        Self::new(self.sha.clone(), self.object_type, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_follows_payload() {
        let sha = ObjectId::parse(&"c".repeat(40)).unwrap();
        let object = StoredObject::new(sha, ObjectType::Blob, vec![1u8; 20]);
        assert_eq!(object.size, 20);

        let replaced = object.with_data(vec![2u8; 3]);
        assert_eq!(replaced.size, 3);
        assert_eq!(replaced.sha, object.sha);
    }

    #[test]
    fn test_object_type_parse() {
        assert_eq!("commit".parse::<ObjectType>().unwrap(), ObjectType::Commit);
        assert!("blobby".parse::<ObjectType>().is_err());
        assert_eq!(ObjectType::Tag.to_string(), "tag");
    }
}
