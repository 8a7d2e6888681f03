use super::provider::credentials_for;
use super::{Identity, IdentityProvider, OAuthError, PendingLink, Provider, StateStore};
use crate::config::OAuthConfig;
use crate::errors::ArcadeResult;
use crate::metrics::ArcadeMetrics;
use crate::store::{normalize_address, PartialUpdate, ProfileStore};
use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedIdentity {
    pub address: String,
    pub identity: Identity,
}

pub struct IdentityLinker {
    config: OAuthConfig,
    states: Arc<dyn StateStore>,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    metrics: ArcadeMetrics,
}

impl IdentityLinker {
    pub fn new(
        config: OAuthConfig,
        states: Arc<dyn StateStore>,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        metrics: ArcadeMetrics,
    ) -> Self {
        Self {
            config,
            states,
            provider,
            store,
            metrics,
        }
    }

    pub fn redirect_uri(&self, provider: Provider) -> String {
        format!(
            "{}/api/oauth/{}/callback",
            self.config.callback_base_url.trim_end_matches('/'),
            provider
        )
    }

    /// Record a fresh state for `address` and build the provider's
    /// authorize URL
    pub async fn begin(&self, provider: Provider, address: &str) -> ArcadeResult<String> {
        let address = normalize_address(address)?;
        let creds = credentials_for(&self.config.providers, provider).ok_or(OAuthError::NotConfigured(provider))?;

        let state = random_token();
        let code_verifier = provider.uses_pkce().then(random_token);
        let redirect_uri = self.redirect_uri(provider);

        let mut params = vec![
            ("response_type", "code"),
            ("client_id", creds.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", provider.scopes()),
            ("state", state.as_str()),
        ];
        if let Some(verifier) = &code_verifier {
            params.push(("code_challenge", verifier.as_str()));
            params.push(("code_challenge_method", "plain"));
        }
        let url = Url::parse_with_params(provider.authorize_url(), &params)
            .map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;

        let ttl = Duration::from_secs(self.config.state_ttl_secs);
        self.states
            .put(&state, PendingLink::new(address.clone(), provider, code_verifier, ttl))
            .await?;

        info!(%provider, address = %address, "identity link started");
        Ok(url.into())
    }

    /// Consume the state, exchange the code and merge the identity fields
    pub async fn complete(&self, provider: Provider, code: &str, state: &str) -> ArcadeResult<LinkedIdentity> {
        let link = self.states.take(state).await?.ok_or(OAuthError::InvalidState)?;
        if link.provider != provider {
            warn!(expected = %link.provider, actual = %provider, "oauth callback for a different provider");
            return Err(OAuthError::InvalidState.into());
        }

        let redirect_uri = self.redirect_uri(provider);
        let token = self
            .provider
            .exchange_code(provider, code, &redirect_uri, link.code_verifier.as_deref())
            .await?;
        let identity = self.provider.fetch_identity(provider, &token).await?;

        self.store.set_merge(&link.address, &identity_fields(&identity)).await?;
        self.metrics.record_identity_link(provider.as_str());
        info!(%provider, address = %link.address, "identity linked");

        Ok(LinkedIdentity {
            address: link.address,
            identity,
        })
    }

    /// Where the browser goes after the callback
    pub fn app_redirect(&self, outcome: Result<Provider, &str>) -> String {
        let (key, value) = match outcome {
            Ok(provider) => ("linked", provider.as_str()),
            Err(code) => ("error", code),
        };
        match Url::parse_with_params(&self.config.app_url, &[(key, value)]) {
            Ok(url) => url.into(),
            Err(_) => self.config.app_url.clone(),
        }
    }
}

/// Profile fields written for a linked identity
pub fn identity_fields(identity: &Identity) -> PartialUpdate {
    let (id_field, username_field) = match identity.provider {
        Provider::Twitter => ("twitterId", Some("twitterUsername")),
        Provider::Discord => ("discordId", Some("discordUsername")),
        Provider::Google => ("googleId", None),
    };

    let mut update = PartialUpdate::new().set(id_field, identity.id.as_str());
    if let (Some(field), Some(username)) = (username_field, &identity.username) {
        update = update.set(field, username.as_str());
    }
    if let Some(email) = &identity.email {
        update = update.set("email", email.as_str());
    }
    update
}

/// 32 random bytes, hex encoded; also valid as a PKCE verifier
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
