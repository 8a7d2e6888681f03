use super::{OAuthError, Provider};
use crate::config::{ClientCredentials, ProviderCredentials};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Account on an identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub provider: Provider,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    /// Parse the provider's "current user" response
    pub fn from_profile(provider: Provider, profile: &Value) -> Result<Self, OAuthError> {
        let body = match provider {
            Provider::Twitter => profile.get("data").unwrap_or(profile),
            Provider::Discord | Provider::Google => profile,
        };
        let text = |field: &str| body.get(field).and_then(Value::as_str).map(str::to_string);

        let id = text("id").ok_or_else(|| OAuthError::Profile {
            provider,
            reason: "response has no id".to_string(),
        })?;
        let username = match provider {
            Provider::Google => text("name"),
            Provider::Twitter | Provider::Discord => text("username"),
        };

        Ok(Self {
            provider,
            id,
            username,
            email: text("email"),
        })
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Trade an authorization code for an access token
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<String, OAuthError>;

    async fn fetch_identity(&self, provider: Provider, access_token: &str) -> Result<Identity, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Talks to the real provider endpoints
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    credentials: ProviderCredentials,
}

impl HttpIdentityProvider {
    pub fn new(credentials: ProviderCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }

    fn credentials(&self, provider: Provider) -> Result<&ClientCredentials, OAuthError> {
        credentials_for(&self.credentials, provider).ok_or(OAuthError::NotConfigured(provider))
    }
}

pub fn credentials_for(credentials: &ProviderCredentials, provider: Provider) -> Option<&ClientCredentials> {
    match provider {
        Provider::Twitter => credentials.twitter.as_ref(),
        Provider::Discord => credentials.discord.as_ref(),
        Provider::Google => credentials.google.as_ref(),
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<String, OAuthError> {
        let creds = self.credentials(provider)?;
        let exchange_err = |reason: String| OAuthError::Exchange { provider, reason };

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", creds.client_id.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        // Twitter authenticates confidential clients with basic auth
        let request = self.client.post(provider.token_url());
        let request = if provider.uses_pkce() {
            request.basic_auth(&creds.client_id, Some(&creds.client_secret))
        } else {
            form.push(("client_secret", creds.client_secret.as_str()));
            request
        };

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| exchange_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(exchange_err(format!("token endpoint returned {}", response.status())));
        }

        let token: TokenResponse = response.json().await.map_err(|e| exchange_err(e.to_string()))?;
        debug!(%provider, "authorization code exchanged");
        Ok(token.access_token)
    }

    async fn fetch_identity(&self, provider: Provider, access_token: &str) -> Result<Identity, OAuthError> {
        let profile_err = |reason: String| OAuthError::Profile { provider, reason };

        let response = self
            .client
            .get(provider.profile_url())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| profile_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(profile_err(format!("profile endpoint returned {}", response.status())));
        }

        let profile: Value = response.json().await.map_err(|e| profile_err(e.to_string()))?;
        Identity::from_profile(provider, &profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_twitter_profile_nested_under_data() {
        let profile = json!({ "data": { "id": "42", "username": "meowcat", "name": "Meow" } });
        let identity = Identity::from_profile(Provider::Twitter, &profile).unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.username.as_deref(), Some("meowcat"));
        assert!(identity.email.is_none());
    }

    #[test]
    fn test_discord_and_google_profiles() {
        let discord = json!({ "id": "7", "username": "whiskers", "email": "w@example.com" });
        let identity = Identity::from_profile(Provider::Discord, &discord).unwrap();
        assert_eq!(identity.username.as_deref(), Some("whiskers"));
        assert_eq!(identity.email.as_deref(), Some("w@example.com"));

        let google = json!({ "id": "g-1", "email": "g@example.com", "name": "Garfield" });
        let identity = Identity::from_profile(Provider::Google, &google).unwrap();
        assert_eq!(identity.username.as_deref(), Some("Garfield"));
    }

    #[test]
    fn test_profile_without_id_rejected() {
        let err = Identity::from_profile(Provider::Discord, &json!({ "username": "x" })).unwrap_err();
        assert!(matches!(err, OAuthError::Profile { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let provider = HttpIdentityProvider::new(ProviderCredentials::default());
        let err = provider
            .exchange_code(Provider::Google, "code", "http://localhost/cb", None)
            .await
            .unwrap_err();
        assert_eq!(err, OAuthError::NotConfigured(Provider::Google));
    }
}
