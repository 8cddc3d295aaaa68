use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    config::AdminSeed,
    error::AppError,
    models::{
        session::Session,
        user::{User, UserRole},
    },
    state::AppState,
    store::UserStore,
};

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL_DAYS: i64 = 7;

/// Identity attached to a request once its session resolved. Carries no
/// credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        let role = user.role();
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Populated by the session guard middleware.
        Ok(Self(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }

    pub fn require_admin(&self) -> Result<&AuthenticatedUser, AppError> {
        let user = self.require_user()?;
        if user.role.can_manage_content() {
            Ok(user)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| AppError::Other(anyhow::anyhow!("argon2 hash_password: {err}")))?
        .to_string();
    Ok(hash)
}

/// Creates the configured admin account unless that email is already
/// registered. Returns whether a user was inserted.
pub async fn seed_admin(users: &dyn UserStore, seed: &AdminSeed) -> Result<bool, AppError> {
    if users.find_by_email(&seed.email).await?.is_some() {
        return Ok(false);
    }
    let hash = hash_password(&seed.password)?;
    let user = users
        .insert(&seed.email, None, &hash, UserRole::Admin)
        .await?;
    info!(user_id = user.id, email = %user.email, "seeded admin user");
    Ok(true)
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| AppError::Other(anyhow::anyhow!("argon2 parse hash: {err}")))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Checks email and password. Unknown email and wrong password are both
/// `Unauthorized`.
pub async fn authenticate_user(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "Email and password are required".into(),
        ));
    }

    let Some(user) = state.users.find_by_email(email).await? else {
        info!(email, "login attempt for unknown email");
        return Err(AppError::Unauthorized);
    };

    match verify_password(password, &user.password_hash) {
        Ok(true) => Ok(AuthenticatedUser::from(user)),
        Ok(false) => {
            info!(user_id = user.id, "login attempt with wrong password");
            Err(AppError::Unauthorized)
        }
        Err(err) => {
            error!(user_id = user.id, error = %err, "stored password hash is unreadable");
            Err(AppError::Unauthorized)
        }
    }
}

pub async fn create_session(state: &AppState, user_id: i64) -> Result<Session, AppError> {
    let now = Utc::now();
    match state.sessions.delete_expired(now).await {
        Ok(0) => {}
        Ok(pruned) => debug!(pruned, "removed expired sessions"),
        Err(err) => warn!(error = %err, "failed to prune expired sessions"),
    }

    let session = Session {
        token: generate_token(),
        user_id,
        created_at: now,
        expires_at: now + Duration::days(SESSION_TTL_DAYS),
    };
    state.sessions.insert(&session).await?;
    info!(user_id, expires_at = %session.expires_at, "session created");
    Ok(session)
}

/// Removes a session. Failures are logged and reported as `false`.
pub async fn destroy_session(state: &AppState, token: &str) -> bool {
    match state.sessions.delete(token).await {
        Ok(deleted) => deleted,
        Err(err) => {
            warn!(error = %err, "failed to delete session");
            false
        }
    }
}

pub fn apply_session_cookie(jar: CookieJar, token: &str, secure: bool) -> CookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, token.to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(time::Duration::days(SESSION_TTL_DAYS));
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// 64 random bytes, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
