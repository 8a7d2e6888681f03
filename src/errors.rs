//! Error types for the Meow Miles arcade
//!
//! Every failure is sorted into one of three categories, which decide how
//! callers react: precondition failures abort the transition and let the
//! user retry, external failures raise a notice and keep the optimistic local
//! state, defects end the session.

use crate::games::settlement::SettlementError;
use crate::games::types::GameError;
use crate::oauth::OAuthError;
use crate::rewards::RewardsError;
use crate::store::StoreError;
use crate::wallet::WalletError;
use serde::Serialize;
use thiserror::Error;

/// How a failure is handled by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing wallet, wrong chain, low balance: user retries
    Precondition,
    /// Store, contract or identity provider failure: local state kept
    External,
    /// Programming or configuration defect: session ends
    Defect,
}

/// Root error type for all arcade operations
#[derive(Debug, Error)]
pub enum ArcadeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Rewards error: {0}")]
    Rewards(#[from] RewardsError),
}

/// Configuration and validation errors
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Conditions the user has to fix before an action can run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("No wallet connected")]
    NoWallet,

    #[error("Connected wallet {connected} does not match {expected}")]
    WalletMismatch { expected: String, connected: String },

    #[error("Wrong network: expected chain {expected}, wallet is on {actual}")]
    WrongChain { expected: u64, actual: u64 },

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("Insufficient miles: need {required}, have {available}")]
    InsufficientMiles { required: u64, available: u64 },

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Amount must be greater than zero")]
    ZeroAmount,
}

impl ArcadeError {
    /// Category deciding how the failure is surfaced
    pub fn category(&self) -> ErrorCategory {
        match self {
            ArcadeError::Configuration(_) => ErrorCategory::Defect,
            ArcadeError::Game(e) => e.category(),
            ArcadeError::Precondition(_) => ErrorCategory::Precondition,
            ArcadeError::Store(_) => ErrorCategory::External,
            ArcadeError::Settlement(_) => ErrorCategory::External,
            ArcadeError::Wallet(e) => e.category(),
            ArcadeError::OAuth(e) => e.category(),
            ArcadeError::Rewards(e) => e.category(),
        }
    }

    /// Re-entrant triggers during an in-flight transition are dropped silently
    pub fn is_ignorable(&self) -> bool {
        matches!(self, ArcadeError::Game(GameError::Busy))
    }
}

// Convenience type alias for Results
pub type ArcadeResult<T> = Result<T, ArcadeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_error_display() {
        let config_error = ConfigurationError::ValidationFailed("mines".to_string());
        let arcade_error = ArcadeError::Configuration(config_error);

        assert!(arcade_error.to_string().contains("Configuration error"));
        assert!(arcade_error.to_string().contains("mines"));
    }

    #[test]
    fn test_precondition_details() {
        let err = PreconditionError::WrongChain {
            expected: 8453,
            actual: 1,
        };

        assert!(err.to_string().contains("expected chain 8453"));
        assert!(err.to_string().contains("on 1"));
    }

    #[test]
    fn test_error_categories() {
        let precondition: ArcadeError = PreconditionError::NoWallet.into();
        assert_eq!(precondition.category(), ErrorCategory::Precondition);

        let defect: ArcadeError = GameError::MalformedShape("3x3".to_string()).into();
        assert_eq!(defect.category(), ErrorCategory::Defect);

        let external: ArcadeError = StoreError::WriteFailed("offline".to_string()).into();
        assert_eq!(external.category(), ErrorCategory::External);
    }

    #[test]
    fn test_busy_is_ignorable() {
        let busy: ArcadeError = GameError::Busy.into();
        assert!(busy.is_ignorable());

        let not_playing: ArcadeError = GameError::NotPlaying.into();
        assert!(!not_playing.is_ignorable());
    }

    #[test]
    fn test_error_source() {
        let arcade_error: ArcadeError = ConfigurationError::MissingRequired("x".to_string()).into();
        assert!(arcade_error.source().is_some());
    }
}
