use std::collections::HashMap;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use futures::{FutureExt, future::BoxFuture};
use tracing::debug;

use crate::{
    config::AppConfig,
    dao::models::{SYSTEM_USER_ID, UserId},
    error::AppError,
    state::SharedState,
};

/// Resolves credentials to a user identity.
pub trait Authenticator: Send + Sync {
    /// Return the user behind `token`, or `None` when it is not recognised.
    fn authenticate(&self, token: String) -> BoxFuture<'static, Option<UserId>>;
}

/// Authenticator backed by the static token table of the configuration.
///
/// With an empty table every token is read as the numeric id of the user it names.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl TokenAuthenticator {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tokens: config.auth_tokens().clone(),
        }
    }

    fn resolve(&self, token: &str) -> Option<UserId> {
        let user_id = if self.tokens.is_empty() {
            token.trim().parse::<UserId>().ok()?
        } else {
            *self.tokens.get(token)?
        };
        (user_id > SYSTEM_USER_ID).then_some(user_id)
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, token: String) -> BoxFuture<'static, Option<UserId>> {
        let resolved = self.resolve(&token);
        async move { resolved }.boxed()
    }
}

/// Extract the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticated caller of an HTTP route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?
            .to_owned();

        match state.authenticator().authenticate(token).await {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => {
                debug!("rejected unknown bearer token");
                Err(AppError::Unauthorized("invalid bearer token".into()))
            }
        }
    }
}
