//! Entry point tying configuration, authentication and services together.
//!
//! # Design
//! `PodioClient` holds the transport behind an `Arc`, so clones are cheap
//! and share one token. Services borrow the transport for the duration of a
//! call chain and carry no state of their own.

use std::sync::Arc;

use crate::auth::{OAuthToken, TokenGrant};
use crate::config::PodioConfig;
use crate::error::Result;
use crate::services::{GrantService, ItemService};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct PodioClient {
    transport: Arc<Transport>,
}

impl PodioClient {
    pub fn new(config: PodioConfig) -> Result<Self> {
        Ok(Self {
            transport: Arc::new(Transport::new(config)?),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(PodioConfig::from_env()?)
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn grants(&self) -> GrantService<'_> {
        GrantService::new(&self.transport)
    }

    pub fn items(&self) -> ItemService<'_> {
        ItemService::new(&self.transport)
    }

    /// Authenticate as a user (username/password flow).
    pub async fn authenticate_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<OAuthToken> {
        self.transport
            .authenticate(TokenGrant::Password {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await
    }

    /// Authenticate as an app (app id and app token flow).
    pub async fn authenticate_with_app(&self, app_id: i64, app_token: &str) -> Result<OAuthToken> {
        self.transport
            .authenticate(TokenGrant::App {
                app_id,
                app_token: app_token.to_string(),
            })
            .await
    }

    /// Reuse a previously issued token.
    pub async fn set_token(&self, token: OAuthToken) {
        self.transport.set_token(token).await;
    }

    pub async fn token(&self) -> Option<OAuthToken> {
        self.transport.tokens().token().await
    }
}
