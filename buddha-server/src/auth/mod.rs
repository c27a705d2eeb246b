//! User accounts and session tokens.
//!
//! Users live in the `Users` collection with argon2 password hashes. Signing
//! out writes the token to `TokenBlacklist`; verification checks that list
//! before looking at the signature or expiry.

pub mod api;
pub mod token;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;

use buddha_agents::conversation::now;
use buddha_store::{Collection, Filter, Properties, StoreError, VectorStore};

use crate::web::ApiError;
pub use api::AuthUser;
use token::{hash_password, verify_password, Claims, TokenKeys};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token has been revoked")]
    Revoked,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailTaken | AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::Revoked
            | AuthError::Expired
            | AuthError::InvalidToken
            | AuthError::MissingToken
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Store(e) => e.into(),
            other => ApiError::new(other.status(), other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

pub struct AuthService {
    store: Arc<VectorStore>,
    keys: TokenKeys,
    ttl: Duration,
}

impl AuthService {
    pub fn new(store: Arc<VectorStore>, secret: &str, ttl_hours: i64) -> Self {
        Self {
            store,
            keys: TokenKeys::new(secret),
            ttl: Duration::hours(ttl_hours),
        }
    }

    async fn find_user(&self, email: &str) -> Result<Option<buddha_store::StoredObject>, AuthError> {
        Ok(self
            .store
            .find_one(Collection::Users, Filter::by_property("email", email))
            .await?)
    }

    fn issue(&self, user_id: &str, email: &str) -> Result<String, AuthError> {
        self.keys.sign(&Claims::new(user_id, email, self.ttl))
    }

    pub async fn sign_up(&self, req: SignUpRequest) -> Result<AuthResponse, AuthError> {
        let email = req.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AuthError::InvalidInput("email is required".into()));
        }
        if req.password.is_empty() {
            return Err(AuthError::InvalidInput("password is required".into()));
        }
        if self.find_user(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let ts = now();
        let mut props = Properties::new();
        props.insert("email".into(), json!(email));
        props.insert("password".into(), json!(hash_password(&req.password)?));
        props.insert("name".into(), json!(req.name));
        props.insert("created_at".into(), json!(ts));
        props.insert("updated_at".into(), json!(ts));
        let user_id = self.store.insert(Collection::Users, props, None).await?;
        tracing::info!(%user_id, %email, "User registered");

        Ok(AuthResponse {
            token: self.issue(&user_id.to_string(), &email)?,
            user: UserInfo {
                email,
                name: req.name,
            },
        })
    }

    pub async fn sign_in(&self, req: SignInRequest) -> Result<AuthResponse, AuthError> {
        let email = req.email.trim().to_lowercase();
        let user = self
            .find_user(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let stored = user.str("password").unwrap_or_default();
        if !verify_password(stored, &req.password) {
            return Err(AuthError::InvalidCredentials);
        }
        tracing::info!(user_id = %user.id, "User signed in");
        Ok(AuthResponse {
            token: self.issue(&user.id.to_string(), &email)?,
            user: UserInfo {
                email,
                name: user.str("name").unwrap_or_default().to_string(),
            },
        })
    }

    /// Revocation is checked first, then signature and expiry.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let revoked = self
            .store
            .find_one(Collection::TokenBlacklist, Filter::by_property("token", token))
            .await?;
        if revoked.is_some() {
            return Err(AuthError::Revoked);
        }
        self.keys.verify(token)
    }

    /// Revoke a token that has already been verified.
    pub async fn sign_out(&self, token: &str, user_id: &str) -> Result<(), AuthError> {
        let mut props = Properties::new();
        props.insert("token".into(), json!(token));
        props.insert("user_id".into(), json!(user_id));
        props.insert("blacklisted_at".into(), json!(now()));
        self.store
            .insert(Collection::TokenBlacklist, props, None)
            .await?;
        tracing::info!(%user_id, "Token revoked");
        Ok(())
    }

    /// Display name for the profile endpoint.
    pub async fn user_name(&self, email: &str) -> Result<String, AuthError> {
        Ok(self
            .find_user(email)
            .await?
            .and_then(|u| u.str("name").map(str::to_string))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddha_store::{Embedder, HashingEmbedder, LocalStore};

    fn service() -> AuthService {
        let local = LocalStore::open_memory(Embedder::Hashing(HashingEmbedder::default())).unwrap();
        AuthService::new(Arc::new(VectorStore::Local(local)), "test-secret", 24)
    }

    fn sign_up_req(email: &str, password: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: password.into(),
            name: "Ananda".into(),
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = service();
        let up = auth.sign_up(sign_up_req("A@B.c", "pw")).await.unwrap();
        assert_eq!(up.user.email, "a@b.c");
        let claims = auth.verify(&up.token).await.unwrap();
        assert_eq!(claims.email, "a@b.c");

        let dup = auth.sign_up(sign_up_req("a@b.c", "other")).await;
        assert!(matches!(dup, Err(AuthError::EmailTaken)));

        let ok = auth
            .sign_in(SignInRequest { email: "a@b.c".into(), password: "pw".into() })
            .await
            .unwrap();
        assert_eq!(ok.user.name, "Ananda");
        assert_eq!(auth.verify(&ok.token).await.unwrap().user_id, claims.user_id);
    }

    #[tokio::test]
    async fn bad_credentials_look_the_same() {
        let auth = service();
        auth.sign_up(sign_up_req("a@b.c", "pw")).await.unwrap();
        for (email, password) in [("a@b.c", "wrong"), ("nobody@b.c", "pw")] {
            let err = auth
                .sign_in(SignInRequest { email: email.into(), password: password.into() })
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Invalid email or password");
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn revoked_tokens_are_rejected_first() {
        let auth = service();
        let up = auth.sign_up(sign_up_req("a@b.c", "pw")).await.unwrap();
        let claims = auth.verify(&up.token).await.unwrap();
        auth.sign_out(&up.token, &claims.user_id).await.unwrap();
        assert!(matches!(auth.verify(&up.token).await, Err(AuthError::Revoked)));
    }
}
