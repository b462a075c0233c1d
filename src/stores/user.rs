use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::links;
use crate::storage::{TOKEN_KEY, USER_ID_KEY};
use crate::structs::{ApiClient, Profile, UserSubscription};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserState {
    pub token: Option<String>,
    pub id: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub subscription: Option<UserSubscription>,
    pub is_authenticated: bool,
}

/// Authentication and the signed in user's profile.
pub struct UserStore {
    api: Arc<ApiClient>,
    state: RwLock<UserState>,
}

impl UserStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: RwLock::new(UserState::default()),
        }
    }

    pub async fn snapshot(&self) -> UserState {
        self.state.read().await.clone()
    }

    pub async fn user_id(&self) -> Option<String> {
        self.state.read().await.id.clone()
    }

    /// Checks the stored token against the backend and loads the profile.
    /// Any failure signs the user out.
    pub async fn validate_token(&self) -> Result<bool> {
        let Some(token) = self.api.storage().get(TOKEN_KEY).await? else {
            return Ok(false);
        };

        match self.api.get::<Profile>("/users/profile").await {
            Ok(profile) if !profile.id.is_empty() => {
                debug!("Token valid for {}", profile.email);
                self.api.storage().set(USER_ID_KEY, &profile.id).await?;

                let mut state = self.state.write().await;
                state.token = Some(token);
                state.id = Some(profile.id);
                state.email = Some(profile.email);
                state.avatar = profile.avatar;
                state.subscription = profile.subscription;
                state.is_authenticated = true;
                Ok(true)
            }
            Ok(_) => {
                self.sign_out().await?;
                Ok(false)
            }
            Err(err) => {
                warn!("Token validation failed: {}", err);
                self.sign_out().await?;
                Ok(false)
            }
        }
    }

    /// Email/password sign in. Returns the access token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<String> {
        let login: LoginResponse = self
            .api
            .post("/auth/login", &json!({ "email": email, "password": password }))
            .await?;

        self.set_auth_token(&login.access_token).await?;
        self.validate_token().await?;
        info!("Signed in as {}", email);
        Ok(login.access_token)
    }

    /// Exchanges a Google ID token for an access token.
    pub async fn sign_in_google(&self, id_token: &str) -> Result<bool> {
        let login: LoginResponse = self
            .api
            .post("/auth/google", &json!({ "token": id_token }))
            .await?;

        self.set_auth_token(&login.access_token).await?;
        self.validate_token().await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        self.api
            .post::<serde_json::Value, _>("/users", &json!({ "email": email, "password": password }))
            .await?;
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        *self.state.write().await = UserState::default();
        self.clear_auth_token().await
    }

    pub async fn set_auth_token(&self, token: &str) -> Result<()> {
        self.api.storage().set(TOKEN_KEY, token).await?;

        let mut state = self.state.write().await;
        state.token = Some(token.to_string());
        state.is_authenticated = true;
        Ok(())
    }

    pub async fn clear_auth_token(&self) -> Result<()> {
        self.api.storage().remove(TOKEN_KEY).await?;
        self.api.storage().remove(USER_ID_KEY).await?;

        let mut state = self.state.write().await;
        state.token = None;
        state.is_authenticated = false;
        Ok(())
    }

    /// Handles an incoming deep link. Auth callbacks store their token and
    /// validate it; returns whether the user is now signed in.
    pub async fn handle_deep_link(&self, url: &str) -> Result<bool> {
        let Some(token) = links::auth_token_from_deep_link(url) else {
            return Ok(false);
        };

        debug!("Received auth token through deep link");
        self.api.storage().set(TOKEN_KEY, &token).await?;
        self.validate_token().await
    }
}
