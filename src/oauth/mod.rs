//! OAuth identity linking
//!
//! Authorization-code flow for Twitter (PKCE, plain challenge), Discord and
//! Google. `begin` stores a random state token mapped to the wallet address
//! and returns the provider's authorize URL; `complete` consumes that state
//! once, exchanges the code, fetches the profile and merges the linked
//! identity into the user's profile.

pub mod linker;
pub mod provider;
pub mod state;

pub use linker::{IdentityLinker, LinkedIdentity};
pub use provider::{HttpIdentityProvider, Identity, IdentityProvider};
pub use state::{MemoryStateStore, PendingLink, RocksStateStore, StateStore};

use crate::errors::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthError {
    #[error("Unknown identity provider: {0}")]
    UnknownProvider(String),

    #[error("Identity provider {0} is not configured")]
    NotConfigured(Provider),

    #[error("OAuth state is unknown, expired or already used")]
    InvalidState,

    #[error("Code exchange with {provider} failed: {reason}")]
    Exchange { provider: Provider, reason: String },

    #[error("Fetching the {provider} profile failed: {reason}")]
    Profile { provider: Provider, reason: String },

    #[error("OAuth state store failed: {0}")]
    StateStore(String),

    #[error("Invalid OAuth URL: {0}")]
    InvalidUrl(String),
}

impl OAuthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OAuthError::UnknownProvider(_) | OAuthError::InvalidState => ErrorCategory::Precondition,
            OAuthError::NotConfigured(_) | OAuthError::InvalidUrl(_) => ErrorCategory::Defect,
            OAuthError::Exchange { .. } | OAuthError::Profile { .. } | OAuthError::StateStore(_) => {
                ErrorCategory::External
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Twitter,
    Discord,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Twitter => "twitter",
            Provider::Discord => "discord",
            Provider::Google => "google",
        }
    }

    pub fn authorize_url(&self) -> &'static str {
        match self {
            Provider::Twitter => "https://twitter.com/i/oauth2/authorize",
            Provider::Discord => "https://discord.com/api/oauth2/authorize",
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    pub fn token_url(&self) -> &'static str {
        match self {
            Provider::Twitter => "https://api.twitter.com/2/oauth2/token",
            Provider::Discord => "https://discord.com/api/oauth2/token",
            Provider::Google => "https://oauth2.googleapis.com/token",
        }
    }

    pub fn profile_url(&self) -> &'static str {
        match self {
            Provider::Twitter => "https://api.twitter.com/2/users/me",
            Provider::Discord => "https://discord.com/api/users/@me",
            Provider::Google => "https://www.googleapis.com/oauth2/v2/userinfo",
        }
    }

    pub fn scopes(&self) -> &'static str {
        match self {
            Provider::Twitter => "users.read tweet.read",
            Provider::Discord => "identify email",
            Provider::Google => "openid email profile",
        }
    }

    /// Twitter requires PKCE; the others use the client secret alone
    pub fn uses_pkce(&self) -> bool {
        matches!(self, Provider::Twitter)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Provider::Twitter),
            "discord" => Ok(Provider::Discord),
            "google" => Ok(Provider::Google),
            _ => Err(OAuthError::UnknownProvider(s.to_string())),
        }
    }
}
