//! What miles buy: badge milestones, token redemption, and the leaderboard

pub mod badges;
pub mod leaderboard;
pub mod redeem;

pub use badges::{BadgeService, BadgeStatus, ClaimReceipt, RoleSync, RoleSyncStatus, WebhookRoleSync};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use redeem::{RedeemReceipt, Redeemer};

use crate::errors::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewardsError {
    #[error("Unknown badge: {0}")]
    UnknownBadge(String),

    #[error("Badge {0} is already claimed")]
    AlreadyClaimed(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("Role sync failed: {0}")]
    RoleSync(String),

    #[error("Redemption {tx_hash} succeeded on chain but miles were not debited: {reason}")]
    DebitFailed { tx_hash: String, reason: String },
}

impl RewardsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RewardsError::UnknownBadge(_) | RewardsError::AlreadyClaimed(_) | RewardsError::InvalidTxHash(_) => {
                ErrorCategory::Precondition
            }
            RewardsError::RoleSync(_) | RewardsError::DebitFailed { .. } => ErrorCategory::External,
        }
    }
}

/// `0x` + 64 hex digits
pub fn validate_tx_hash(tx_hash: &str) -> Result<String, RewardsError> {
    let digits = tx_hash
        .strip_prefix("0x")
        .filter(|d| d.len() == 64 && hex::decode(d).is_ok())
        .ok_or_else(|| RewardsError::InvalidTxHash(tx_hash.to_string()))?;
    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_hash_validation() {
        let hash = format!("0x{}", "AB".repeat(32));
        assert_eq!(validate_tx_hash(&hash).unwrap(), format!("0x{}", "ab".repeat(32)));
        assert!(validate_tx_hash("0x1234").is_err());
        assert!(validate_tx_hash(&"ab".repeat(32)).is_err());
    }
}
