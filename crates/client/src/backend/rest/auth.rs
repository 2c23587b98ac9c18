//! GoTrue session flows for the REST backend.
//!
//! Sign-up and sign-in both end with a resolved [`Identity`] held in
//! the shared session slot; subsequent REST calls pick up the access
//! token from there. Role resolution is strict: an account whose role
//! claim is missing or unrecognised does not get a session.

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shopconnect_core::{Email, Role, UserId};
use tracing::{info, warn};
use uuid::Uuid;

use super::{BackendError, RestBackend};
use crate::backend::SessionStore;
use crate::types::Identity;

/// An established session: the bearer token plus who it belongs to.
pub(crate) struct AuthSession {
    pub access_token: String,
    pub identity: Identity,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: Uuid,
    email: String,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Deserialize, Default)]
struct UserMetadata {
    role: Option<String>,
}

#[derive(Serialize)]
struct SignUpPayload<'a> {
    email: &'a str,
    password: &'a str,
    data: RoleClaim,
}

#[derive(Serialize)]
struct RoleClaim {
    role: Role,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

/// Resolve the closed role set from the account's claims.
fn resolve_identity(user: &AuthUser) -> Result<Identity, BackendError> {
    let raw_role = user
        .user_metadata
        .role
        .as_deref()
        .ok_or_else(|| BackendError::Parse("account has no role claim".to_string()))?;
    let role = Role::from_str(raw_role).map_err(|e| BackendError::Parse(e.to_string()))?;
    let email = Email::parse(&user.email)
        .map_err(|e| BackendError::Parse(format!("account email: {e}")))?;
    Ok(Identity {
        user_id: UserId::new(user.id),
        email,
        role,
    })
}

impl RestBackend {
    async fn auth_post<T, B>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = format!("{}/{}", self.inner.auth_url, path);
        let response = self.inner.client.post(&url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn establish(&self, token: TokenResponse) -> Result<Identity, BackendError> {
        let identity = resolve_identity(&token.user)?;
        let mut session = self.inner.session.write().await;
        *session = Some(AuthSession {
            access_token: token.access_token,
            identity: identity.clone(),
        });
        info!(user_id = %identity.user_id, role = %identity.role, "session established");
        Ok(identity)
    }
}

#[async_trait]
impl SessionStore for RestBackend {
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        role: Role,
    ) -> Result<Identity, BackendError> {
        let payload = SignUpPayload {
            email: email.as_str(),
            password,
            data: RoleClaim { role },
        };
        let token: TokenResponse = self.auth_post("signup", &payload).await?;
        self.establish(token).await
    }

    async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity, BackendError> {
        let payload = PasswordGrant {
            email: email.as_str(),
            password,
        };
        let token: TokenResponse = self
            .auth_post("token?grant_type=password", &payload)
            .await?;
        self.establish(token).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let access_token = {
            let session = self.inner.session.read().await;
            session.as_ref().map(|s| s.access_token.clone())
        };

        // Best effort: the local session drops even when the server
        // call does not get through.
        if let Some(token) = access_token {
            let url = format!("{}/logout", self.inner.auth_url);
            let result = self
                .inner
                .client
                .post(&url)
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .send()
                .await;
            match result {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "logout rejected, dropping session anyway");
                }
                Err(e) => {
                    warn!(error = %e, "logout request failed, dropping session anyway");
                }
                Ok(_) => {}
            }
        }

        *self.inner.session.write().await = None;
        Ok(())
    }

    async fn current_identity(&self) -> Option<Identity> {
        let session = self.inner.session.read().await;
        session.as_ref().map(|s| s.identity.clone())
    }
}
