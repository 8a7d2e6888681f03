//! Badge milestones
//!
//! A badge unlocks once the user's cumulative miles reach its threshold. The
//! on-chain mint happens in the wallet; this service records the claim and
//! asks the Discord bot for the matching role.

use super::{validate_tx_hash, RewardsError};
use crate::config::{BadgeConfig, BadgeMilestone};
use crate::errors::{ArcadeResult, PreconditionError};
use crate::metrics::ArcadeMetrics;
use crate::store::{get_field, get_i64, normalize_address, Document, PartialUpdate, ProfileStore};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeStatus {
    pub id: String,
    pub name: String,
    pub threshold: u64,
    pub eligible: bool,
    pub claimed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSyncStatus {
    Requested,
    /// No Discord account linked or no bot configured
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub address: String,
    pub badge_id: String,
    pub tx_hash: String,
    pub role_sync: RoleSyncStatus,
}

/// Discord role-sync collaborator
#[async_trait]
pub trait RoleSync: Send + Sync {
    async fn grant_role(&self, discord_id: &str, badge_id: &str) -> Result<(), RewardsError>;
}

/// Posts role grants to the bot's webhook
#[derive(Debug, Clone)]
pub struct WebhookRoleSync {
    client: reqwest::Client,
    url: String,
}

impl WebhookRoleSync {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RoleSync for WebhookRoleSync {
    async fn grant_role(&self, discord_id: &str, badge_id: &str) -> Result<(), RewardsError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "discordId": discord_id, "badgeId": badge_id }))
            .send()
            .await
            .map_err(|e| RewardsError::RoleSync(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RewardsError::RoleSync(format!("bot returned {}", response.status())));
        }
        Ok(())
    }
}

pub struct BadgeService {
    store: Arc<dyn ProfileStore>,
    config: BadgeConfig,
    role_sync: Option<Arc<dyn RoleSync>>,
    metrics: ArcadeMetrics,
}

impl BadgeService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        config: BadgeConfig,
        role_sync: Option<Arc<dyn RoleSync>>,
        metrics: ArcadeMetrics,
    ) -> Self {
        Self {
            store,
            config,
            role_sync,
            metrics,
        }
    }

    pub fn milestones(&self) -> &[BadgeMilestone] {
        &self.config.milestones
    }

    pub async fn status(&self, address: &str) -> ArcadeResult<Vec<BadgeStatus>> {
        let address = normalize_address(address)?;
        let doc = self.store.get(&address).await?;
        let miles = doc.as_ref().map(miles_of).unwrap_or(0);

        Ok(self
            .config
            .milestones
            .iter()
            .map(|m| BadgeStatus {
                id: m.id.clone(),
                name: m.name.clone(),
                threshold: m.threshold,
                eligible: miles >= m.threshold,
                claimed: doc.as_ref().map(|d| has_claimed(d, &m.id)).unwrap_or(false),
            })
            .collect())
    }

    /// Record a minted badge. Eligibility and the duplicate check run inside
    /// the store's atomic update.
    pub async fn record_claim(&self, address: &str, badge_id: &str, tx_hash: &str) -> ArcadeResult<ClaimReceipt> {
        let address = normalize_address(address)?;
        let milestone = self
            .config
            .milestones
            .iter()
            .find(|m| m.id == badge_id)
            .ok_or_else(|| RewardsError::UnknownBadge(badge_id.to_string()))?;
        let tx_hash = validate_tx_hash(tx_hash)?;

        self.store
            .run_atomic(&address, &|doc| {
                let miles = doc.map(miles_of).unwrap_or(0);
                if miles < milestone.threshold {
                    return Err(PreconditionError::InsufficientMiles {
                        required: milestone.threshold,
                        available: miles,
                    }
                    .into());
                }
                if doc.map(|d| has_claimed(d, &milestone.id)).unwrap_or(false) {
                    return Err(RewardsError::AlreadyClaimed(milestone.id.clone()).into());
                }
                Ok(PartialUpdate::new().array_union("claimedBadges", vec![Value::from(milestone.id.as_str())]))
            })
            .await?;

        self.metrics.record_badge_claim();
        info!(address = %address, badge = %milestone.id, tx_hash = %tx_hash, "badge claimed");

        let role_sync = self.sync_role(&address, &milestone.id).await;
        Ok(ClaimReceipt {
            address,
            badge_id: milestone.id.clone(),
            tx_hash,
            role_sync,
        })
    }

    /// Role grants are best effort; a failure never undoes the claim
    async fn sync_role(&self, address: &str, badge_id: &str) -> RoleSyncStatus {
        let Some(role_sync) = &self.role_sync else {
            return RoleSyncStatus::Skipped;
        };
        let discord_id = match self.store.get(address).await {
            Ok(Some(doc)) => get_field(&doc, "discordId").and_then(Value::as_str).map(str::to_string),
            Ok(None) => None,
            Err(err) => {
                warn!(address, error = %err, "could not read profile for role sync");
                return RoleSyncStatus::Failed;
            }
        };
        let Some(discord_id) = discord_id else {
            return RoleSyncStatus::Skipped;
        };

        match role_sync.grant_role(&discord_id, badge_id).await {
            Ok(()) => RoleSyncStatus::Requested,
            Err(err) => {
                warn!(address, badge = badge_id, error = %err, "role sync failed");
                RoleSyncStatus::Failed
            }
        }
    }
}

fn miles_of(doc: &Document) -> u64 {
    get_i64(doc, "miles").map(|m| m.max(0) as u64).unwrap_or(0)
}

fn has_claimed(doc: &Document, badge_id: &str) -> bool {
    get_field(doc, "claimedBadges")
        .and_then(Value::as_array)
        .map(|badges| badges.iter().any(|b| b.as_str() == Some(badge_id)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ArcadeError;
    use crate::store::MemoryProfileStore;
    use std::sync::Mutex;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

    #[derive(Default)]
    struct RecordingRoleSync {
        grants: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl RoleSync for RecordingRoleSync {
        async fn grant_role(&self, discord_id: &str, badge_id: &str) -> Result<(), RewardsError> {
            if self.fail {
                return Err(RewardsError::RoleSync("bot offline".to_string()));
            }
            self.grants
                .lock()
                .unwrap()
                .push((discord_id.to_string(), badge_id.to_string()));
            Ok(())
        }
    }

    fn tx() -> String {
        format!("0x{}", "1f".repeat(32))
    }

    async fn store_with(miles: i64, discord: bool) -> Arc<MemoryProfileStore> {
        let store = Arc::new(MemoryProfileStore::new());
        let mut update = PartialUpdate::new().increment("miles", miles);
        if discord {
            update = update.set("discordId", "998877");
        }
        store.set_merge(ADDRESS, &update).await.unwrap();
        store
    }

    fn service(store: Arc<MemoryProfileStore>, role_sync: Option<Arc<dyn RoleSync>>) -> BadgeService {
        BadgeService::new(store, BadgeConfig::default(), role_sync, ArcadeMetrics::new().unwrap())
    }

    #[tokio::test]
    async fn test_status_reports_eligibility() {
        let badges = service(store_with(600, false).await, None);
        let status = badges.status(ADDRESS).await.unwrap();

        let eligible: Vec<&str> = status.iter().filter(|b| b.eligible).map(|b| b.id.as_str()).collect();
        assert_eq!(eligible, vec!["kitten", "alley-cat"]);
        assert!(status.iter().all(|b| !b.claimed));
    }

    #[tokio::test]
    async fn test_claim_then_duplicate() {
        let sync = Arc::new(RecordingRoleSync::default());
        let badges = service(store_with(150, true).await, Some(sync.clone()));

        let receipt = badges.record_claim(ADDRESS, "kitten", &tx()).await.unwrap();
        assert_eq!(receipt.role_sync, RoleSyncStatus::Requested);
        assert_eq!(
            sync.grants.lock().unwrap().clone(),
            vec![("998877".to_string(), "kitten".to_string())]
        );

        let err = badges.record_claim(ADDRESS, "kitten", &tx()).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Rewards(RewardsError::AlreadyClaimed(_))));

        let status = badges.status(ADDRESS).await.unwrap();
        assert!(status.iter().find(|b| b.id == "kitten").unwrap().claimed);
    }

    #[tokio::test]
    async fn test_claim_below_threshold() {
        let badges = service(store_with(400, false).await, None);
        let err = badges.record_claim(ADDRESS, "alley-cat", &tx()).await.unwrap_err();
        assert!(matches!(
            err,
            ArcadeError::Precondition(PreconditionError::InsufficientMiles {
                required: 500,
                available: 400
            })
        ));

        let err = badges.record_claim(ADDRESS, "sphinx", &tx()).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Rewards(RewardsError::UnknownBadge(_))));
    }

    #[tokio::test]
    async fn test_role_sync_failure_keeps_claim() {
        let sync: Arc<dyn RoleSync> = Arc::new(RecordingRoleSync {
            fail: true,
            ..Default::default()
        });
        let store = store_with(150, true).await;
        let badges = service(store.clone(), Some(sync));

        let receipt = badges.record_claim(ADDRESS, "kitten", &tx()).await.unwrap();
        assert_eq!(receipt.role_sync, RoleSyncStatus::Failed);

        let doc = store.get(ADDRESS).await.unwrap().unwrap();
        assert!(has_claimed(&doc, "kitten"));
    }

    #[tokio::test]
    async fn test_role_sync_skipped_without_discord() {
        let sync = Arc::new(RecordingRoleSync::default());
        let badges = service(store_with(150, false).await, Some(sync.clone()));

        let receipt = badges.record_claim(ADDRESS, "kitten", &tx()).await.unwrap();
        assert_eq!(receipt.role_sync, RoleSyncStatus::Skipped);
        assert!(sync.grants.lock().unwrap().is_empty());
    }
}
