//! OAuth tokens and the shared token state.
//!
//! # Design
//! `TokenStore` keeps the current token behind a `tokio::sync::Mutex`
//! together with a generation counter that increases on every replacement.
//! A request records the generation of the token it sent. When it comes back
//! with 401, `refresh_with` takes the lock and only refreshes if the
//! generation is still the one the request saw; otherwise another caller
//! already refreshed and the newer token is reused. Concurrent 401s therefore
//! cost exactly one refresh.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::PodioConfig;
use crate::error::{PodioError, Result};

/// Token issued by `POST /oauth/token`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<TokenRef>,
}

/// The object the token was issued for (a user or an app).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenRef {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: i64,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            ..Self::default()
        }
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("reference", &self.reference)
            .finish()
    }
}

/// Credentials exchanged for a token at the token endpoint.
#[derive(Clone)]
pub enum TokenGrant {
    Password { username: String, password: String },
    App { app_id: i64, app_token: String },
    RefreshToken { refresh_token: String },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::Password { .. } => "password",
            TokenGrant::App { .. } => "app",
            TokenGrant::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields for the token request, client credentials included.
    pub fn form(&self, config: &PodioConfig) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", self.grant_type().to_string()),
            ("client_id", config.client_id.clone()),
            ("client_secret", config.client_secret.clone()),
        ];
        match self {
            TokenGrant::Password { username, password } => {
                form.push(("username", username.clone()));
                form.push(("password", password.clone()));
            }
            TokenGrant::App { app_id, app_token } => {
                form.push(("app_id", app_id.to_string()));
                form.push(("app_token", app_token.clone()));
            }
            TokenGrant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.clone()));
            }
        }
        form
    }
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<OAuthToken>,
    generation: u64,
}

/// The access token shared by every request of one transport.
#[derive(Debug, Default)]
pub struct TokenStore {
    state: Mutex<TokenState>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current access token and its generation.
    pub async fn current(&self) -> (Option<String>, u64) {
        let state = self.state.lock().await;
        let access = state.token.as_ref().map(|t| t.access_token.clone());
        (access, state.generation)
    }

    pub async fn token(&self) -> Option<OAuthToken> {
        self.state.lock().await.token.clone()
    }

    /// Install a new token, returning its generation.
    pub async fn replace(&self, token: OAuthToken) -> u64 {
        let mut state = self.state.lock().await;
        state.token = Some(token);
        state.generation += 1;
        state.generation
    }

    /// Obtain a token newer than generation `seen`.
    ///
    /// If another caller already replaced the token since `seen`, that token
    /// is returned without calling `refresh`. Otherwise `refresh` is called
    /// with the stored refresh token while the lock is held, so concurrent
    /// callers wait for it instead of refreshing again.
    pub async fn refresh_with<F, Fut>(&self, seen: u64, refresh: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<OAuthToken>>,
    {
        let mut state = self.state.lock().await;
        if state.generation != seen {
            if let Some(token) = &state.token {
                return Ok(token.access_token.clone());
            }
        }

        let refresh_token = state
            .token
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| PodioError::Auth("no refresh token available".to_string()))?;

        let mut token = refresh(refresh_token.clone()).await?;
        // Keep the old refresh token when the endpoint does not rotate it.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token);
        }
        let access = token.access_token.clone();
        state.token = Some(token);
        state.generation += 1;
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn password_grant_form() {
        let config = PodioConfig::new("client", "secret");
        let grant = TokenGrant::Password {
            username: "ada@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let form = grant.form(&config);
        assert_eq!(form[0], ("grant_type", "password".to_string()));
        assert!(form.contains(&("client_id", "client".to_string())));
        assert!(form.contains(&("username", "ada@example.com".to_string())));
    }

    #[test]
    fn app_grant_form_carries_app_id() {
        let config = PodioConfig::new("client", "secret");
        let grant = TokenGrant::App {
            app_id: 77,
            app_token: "tok".to_string(),
        };
        let form = grant.form(&config);
        assert!(form.contains(&("grant_type", "app".to_string())));
        assert!(form.contains(&("app_id", "77".to_string())));
    }

    #[test]
    fn debug_redacts_secrets() {
        let token = OAuthToken::new("abc", Some("def".to_string()));
        let printed = format!("{token:?}");
        assert!(!printed.contains("abc"));
        assert!(!printed.contains("def"));
    }

    #[test]
    fn token_tolerates_missing_fields() {
        let token: OAuthToken = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(token.access_token, "a");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.expires_in, 0);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_auth_error() {
        let store = TokenStore::new();
        let seen = store.replace(OAuthToken::new("a", None)).await;
        let err = store
            .refresh_with(seen, |_| async { Ok(OAuthToken::new("b", None)) })
            .await
            .unwrap_err();
        assert!(matches!(err, PodioError::Auth(_)));
    }

    #[tokio::test]
    async fn unrotated_refresh_token_is_kept() {
        let store = TokenStore::new();
        let seen = store
            .replace(OAuthToken::new("a", Some("r1".to_string())))
            .await;
        let access = store
            .refresh_with(seen, |_| async { Ok(OAuthToken::new("b", None)) })
            .await
            .unwrap();
        assert_eq!(access, "b");
        let token = store.token().await.unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn concurrent_refreshes_collapse_into_one() {
        let store = Arc::new(TokenStore::new());
        let seen = store
            .replace(OAuthToken::new("old", Some("r1".to_string())))
            .await;
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                store
                    .refresh_with(seen, |refresh_token| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(refresh_token, "r1");
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(OAuthToken::new("new", Some("r2".to_string())))
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "new");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.current().await, (Some("new".to_string()), seen + 1));
    }
}
