//! Caller resolution from the fronting proxy's remote-user header.
//!
//! Sessions and credentials live outside this application: a reverse proxy
//! authenticates the browser and forwards the username in a trusted header.
//! This layer only looks the account up and never writes to it.

use axum::{extract::FromRequestParts, http::StatusCode, http::request::Parts};
use tracing::warn;

use crate::application::error::HttpError;
use crate::domain::policy::Caller;
use crate::infra::http::{HttpState, repo_error_to_http};

pub const REMOTE_USER_HEADER: &str = "x-remote-user";

/// The caller's identity, when the proxy forwarded one that maps to a known
/// account. Unknown usernames are treated as anonymous rather than errors.
pub struct MaybeCaller(pub Option<Caller>);

impl FromRequestParts<HttpState> for MaybeCaller {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(REMOTE_USER_HEADER) else {
            return Ok(MaybeCaller(None));
        };

        let Ok(username) = value.to_str() else {
            warn!(
                target = "agora::http::auth",
                "remote-user header is not valid UTF-8; treating as anonymous"
            );
            return Ok(MaybeCaller(None));
        };

        let username = username.trim();
        if username.is_empty() {
            return Ok(MaybeCaller(None));
        }

        let user = state
            .users
            .find_by_username(username)
            .await
            .map_err(|err| repo_error_to_http("infra::http::auth", err))?;

        match user {
            Some(user) => Ok(MaybeCaller(Some(Caller::from_user(&user)))),
            None => {
                warn!(
                    target = "agora::http::auth",
                    username, "remote-user header named an unknown account"
                );
                Ok(MaybeCaller(None))
            }
        }
    }
}

/// Rejects the request when no authenticated caller is present.
pub struct RequireCaller(pub Caller);

impl FromRequestParts<HttpState> for RequireCaller {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeCaller(caller) = MaybeCaller::from_request_parts(parts, state).await?;
        caller.map(RequireCaller).ok_or_else(|| {
            HttpError::new(
                "infra::http::auth",
                StatusCode::UNAUTHORIZED,
                "Sign in required",
                "request carried no authenticated identity",
            )
        })
    }
}
