//! Per-request session resolution and admin route protection.
//!
//! The guard fails open: a missing, unknown or expired token, a store error
//! and a lookup timeout all leave the request anonymous. Store errors and
//! timeouts are logged at `warn` so an outage can be told apart from ordinary
//! logged-out traffic.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthenticatedUser, SESSION_COOKIE},
    error::AppError,
    store::{SessionStore, UserStore},
};

pub const ADMIN_PREFIX: &str = "/admin";
pub const LOGIN_PATH: &str = "/admin/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated(AuthenticatedUser),
}

impl AuthState {
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            AuthState::Anonymous => None,
            AuthState::Authenticated(user) => Some(user),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(&'static str),
}

#[derive(Clone)]
pub struct SessionGuard {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    lookup_timeout: Duration,
}

impl SessionGuard {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            users,
            lookup_timeout,
        }
    }

    pub async fn resolve(&self, token: Option<&str>) -> AuthState {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return AuthState::Anonymous;
        };

        match tokio::time::timeout(self.lookup_timeout, self.lookup(token)).await {
            Ok(Ok(Some(user))) => {
                debug!(user_id = user.id, role = %user.role, "session resolved");
                AuthState::Authenticated(user)
            }
            Ok(Ok(None)) => {
                debug!("session token invalid or expired");
                AuthState::Anonymous
            }
            Ok(Err(err)) => {
                warn!(error = %err, "session store lookup failed, continuing as anonymous");
                AuthState::Anonymous
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "session store lookup timed out, continuing as anonymous"
                );
                AuthState::Anonymous
            }
        }
    }

    async fn lookup(&self, token: &str) -> Result<Option<AuthenticatedUser>, AppError> {
        let Some(session) = self.sessions.find_by_token(token).await? else {
            return Ok(None);
        };
        if session.is_expired_at(Utc::now()) {
            debug!(user_id = session.user_id, expired_at = %session.expires_at, "session expired");
            return Ok(None);
        }
        let user = self.users.find_by_id(session.user_id).await?;
        Ok(user.map(AuthenticatedUser::from))
    }

    pub fn authorize(&self, path: &str, state: &AuthState) -> GuardDecision {
        if is_admin_path(path) && path != LOGIN_PATH && state.user().is_none() {
            GuardDecision::Redirect(LOGIN_PATH)
        } else {
            GuardDecision::Proceed
        }
    }
}

/// `/admin` and anything below it, but not `/administrator`.
pub fn is_admin_path(path: &str) -> bool {
    match path.strip_prefix(ADMIN_PREFIX) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// `302 Found` with a `Location` header.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

pub async fn session_guard(
    State(guard): State<SessionGuard>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let token = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned());
    let auth = guard.resolve(token.as_deref()).await;
    let path = request.uri().path().to_owned();

    if let GuardDecision::Redirect(location) = guard.authorize(&path, &auth) {
        info!(%path, "unauthenticated admin request, redirecting to login");
        return found(location);
    }

    if let AuthState::Authenticated(user) = auth {
        if is_admin_path(&path) {
            debug!(%path, user_id = user.id, "admin access");
        }
        request.extensions_mut().insert(user);
    }

    next.run(request).await
}
