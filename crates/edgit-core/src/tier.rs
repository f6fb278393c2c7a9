use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ObjectId;

/// Storage tier with a distinct cost/latency profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    /// All tiers, fastest first.
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }
}

impl FromStr for Tier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cold" => Ok(Tier::Cold),
            _ => Err(CoreError::invalid_state(format!("Invalid tier: {}", s))),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical location record for one object.
///
/// Exactly one per sha at rest; rewritten only by an initial write or a
/// completed migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLocation {
    pub sha: ObjectId,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl TierLocation {
    /// Location of a loose object in `tier`.
    #[must_use]
    pub fn new(sha: ObjectId, tier: Tier) -> Self {
        Self {
            sha,
            tier,
            pack_id: None,
            offset: None,
        }
    }

    /// Location of an object packed at `offset` inside `pack_id`.
    #[must_use]
    pub fn packed(sha: ObjectId, tier: Tier, pack_id: impl Into<String>, offset: u64) -> Self {
        Self {
            sha,
            tier,
            pack_id: Some(pack_id.into()),
            offset: Some(offset),
        }
    }
}
