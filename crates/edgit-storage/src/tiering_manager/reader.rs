use async_trait::async_trait;
use edgit_core::metrics::{PROMOTIONS, TIERED_READS};
use edgit_core::{CoreResult, ObjectId, PromotionPolicy, ReaderConfig, StoredObject, Tier};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::state::{AccessKind, AccessMetrics};
use super::tracker::AccessTracker;

/// One independent object store backing a single tier of the read path.
#[async_trait]
pub trait TierBackend: Send + Sync {
    async fn get(&self, sha: &ObjectId) -> CoreResult<Option<StoredObject>>;
    async fn put(&self, object: StoredObject) -> CoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierConfig {
    pub enabled: bool,
    /// Largest object accepted by promotion (hot tier only)
    pub max_size: Option<u64>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TieredReaderConfig {
    pub hot: TierConfig,
    pub warm: TierConfig,
    pub cold: TierConfig,
    pub promotion_policy: PromotionPolicy,
}

impl From<&ReaderConfig> for TieredReaderConfig {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            hot: TierConfig {
                enabled: config.hot_enabled,
                max_size: config.hot_max_size,
            },
            warm: TierConfig {
                enabled: config.warm_enabled,
                max_size: None,
            },
            cold: TierConfig {
                enabled: config.cold_enabled,
                max_size: None,
            },
            promotion_policy: config.promotion_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredReadResult {
    pub object: Option<StoredObject>,
    /// Tier that served the object
    pub tier: Option<Tier>,
    pub promoted: bool,
    pub latency: Duration,
}

impl TieredReadResult {
    fn miss(start: Instant) -> Self {
        Self {
            object: None,
            tier: None,
            promoted: false,
            latency: start.elapsed(),
        }
    }
}

/// Fastest-first read path across three tier backends.
///
/// Never fails: a backend error counts as a miss for that tier and the next
/// tier is tried. A warm or cold hit may copy the object into hot depending
/// on the [`PromotionPolicy`].
pub struct TieredReader {
    hot: Arc<dyn TierBackend>,
    warm: Arc<dyn TierBackend>,
    cold: Arc<dyn TierBackend>,
    config: TieredReaderConfig,
    tracker: Option<Arc<AccessTracker>>,
}

impl TieredReader {
    pub fn new(
        hot: Arc<dyn TierBackend>,
        warm: Arc<dyn TierBackend>,
        cold: Arc<dyn TierBackend>,
        config: TieredReaderConfig,
    ) -> Self {
        Self {
            hot,
            warm,
            cold,
            config,
            tracker: None,
        }
    }

    /// Record every successful read (bytes and latency) on `tracker`.
    pub fn with_access_tracker(mut self, tracker: Arc<AccessTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn config(&self) -> &TieredReaderConfig {
        &self.config
    }

    /// Look `sha` up hot → warm → cold, skipping disabled tiers.
    pub async fn read(&self, sha: &str) -> TieredReadResult {
        let start = Instant::now();
        let Ok(sha) = ObjectId::parse(sha) else {
            tracing::debug!(sha, "Rejecting read of malformed sha");
            return TieredReadResult::miss(start);
        };

        for tier in Tier::ALL {
            if !self.tier_config(tier).enabled {
                continue;
            }

            match self.backend(tier).get(&sha).await {
                Ok(Some(object)) => {
                    TIERED_READS.with_label_values(&[tier.as_str(), "hit"]).inc();
                    let promoted = tier != Tier::Hot && self.try_promote(&object).await;
                    let latency = start.elapsed();
                    self.track(&object, latency).await;

                    return TieredReadResult {
                        object: Some(object),
                        tier: Some(tier),
                        promoted,
                        latency,
                    };
                }
                Ok(None) => {
                    TIERED_READS.with_label_values(&[tier.as_str(), "miss"]).inc();
                }
                Err(e) => {
                    TIERED_READS.with_label_values(&[tier.as_str(), "error"]).inc();
                    tracing::warn!(sha = %sha, tier = %tier, error = %e, "Tier read failed, trying next tier");
                }
            }
        }

        TieredReadResult::miss(start)
    }

    pub async fn read_from_hot(&self, sha: &str) -> Option<StoredObject> {
        self.read_single(Tier::Hot, sha).await
    }

    pub async fn read_from_warm(&self, sha: &str) -> Option<StoredObject> {
        self.read_single(Tier::Warm, sha).await
    }

    pub async fn read_from_cold(&self, sha: &str) -> Option<StoredObject> {
        self.read_single(Tier::Cold, sha).await
    }

    /// Copy an object from warm or cold into hot regardless of the promotion
    /// policy. Returns true when hot now holds it.
    pub async fn promote_to_hot(&self, sha: &str) -> bool {
        let Ok(sha) = ObjectId::parse(sha) else {
            return false;
        };
        if !self.config.hot.enabled {
            return false;
        }
        if matches!(self.hot.get(&sha).await, Ok(Some(_))) {
            return true;
        }

        for tier in [Tier::Warm, Tier::Cold] {
            if !self.tier_config(tier).enabled {
                continue;
            }
            match self.backend(tier).get(&sha).await {
                Ok(Some(object)) => return self.put_hot(object).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(sha = %sha, tier = %tier, error = %e, "Tier read failed during promotion");
                }
            }
        }
        false
    }

    async fn try_promote(&self, object: &StoredObject) -> bool {
        if !self.config.hot.enabled {
            return false;
        }
        match self.config.promotion_policy {
            PromotionPolicy::Aggressive => {}
            // Conservative is reserved for frequency-based promotion.
            PromotionPolicy::Conservative | PromotionPolicy::None => return false,
        }
        self.put_hot(object.clone()).await
    }

    async fn put_hot(&self, object: StoredObject) -> bool {
        if let Some(max_size) = self.config.hot.max_size {
            if object.size > max_size {
                tracing::debug!(sha = %object.sha, size = object.size, max_size, "Object too large to promote");
                return false;
            }
        }

        let sha = object.sha.clone();
        match self.hot.put(object).await {
            Ok(()) => {
                PROMOTIONS.inc();
                tracing::debug!(sha = %sha, "Promoted object to hot tier");
                true
            }
            Err(e) => {
                tracing::warn!(sha = %sha, error = %e, "Promotion to hot tier failed");
                false
            }
        }
    }

    async fn read_single(&self, tier: Tier, sha: &str) -> Option<StoredObject> {
        let sha = ObjectId::parse(sha).ok()?;
        match self.backend(tier).get(&sha).await {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(sha = %sha, tier = %tier, error = %e, "Direct tier read failed");
                None
            }
        }
    }

    async fn track(&self, object: &StoredObject, latency: Duration) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        let metrics = AccessMetrics {
            bytes_read: Some(object.size),
            latency_ms: Some(latency.as_millis() as u64),
        };
        if let Err(e) = tracker
            .record_access(&object.sha, AccessKind::Read, Some(metrics))
            .await
        {
            tracing::warn!(sha = %object.sha, error = %e, "Failed to record read access");
        }
    }

    fn backend(&self, tier: Tier) -> &Arc<dyn TierBackend> {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    fn tier_config(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Hot => &self.config.hot,
            Tier::Warm => &self.config.warm,
            Tier::Cold => &self.config.cold,
        }
    }
}
