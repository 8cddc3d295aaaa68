use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{self, AuthenticatedUser, CurrentUser},
    error::AppError,
    guard::{found, LOGIN_PATH},
    markdown::{extract_first_image_url, RawMarkdown},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/login", get(login_form).post(login_submit))
        .route("/logout", post(logout))
        .route("/markdown/preview", post(markdown_preview))
}

async fn dashboard(current: CurrentUser) -> Result<Json<AuthenticatedUser>, AppError> {
    let user = current.require_admin()?;
    Ok(Json(user.clone()))
}

const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Admin login</title></head>
<body>
<form method="post" action="/admin/login">
<label>Email <input type="email" name="email" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">Sign in</button>
</form>
</body>
</html>
"#;

async fn login_form(current: CurrentUser) -> Response {
    if current.require_admin().is_ok() {
        return found("/admin");
    }
    Html(LOGIN_PAGE).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let email = form.email.unwrap_or_default();
    let password = form.password.unwrap_or_default();

    let user = match auth::authenticate_user(&state, &email, &password).await {
        Ok(user) => user,
        Err(AppError::Unauthorized) => {
            return Ok((StatusCode::UNAUTHORIZED, "Invalid email or password").into_response())
        }
        Err(err) => return Err(err),
    };

    if !user.role.can_manage_content() {
        info!(user_id = user.id, role = %user.role, "login refused for role");
        return Ok((
            StatusCode::FORBIDDEN,
            "You do not have permission to access the admin area",
        )
            .into_response());
    }

    let session = auth::create_session(&state, user.id).await?;
    let jar = auth::apply_session_cookie(jar, &session.token, state.config.secure_cookies);
    Ok((jar, found("/admin")).into_response())
}

async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Response {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        let deleted = auth::destroy_session(&state, cookie.value()).await;
        info!(
            user_id = ?current.0.as_ref().map(|user| user.id),
            deleted,
            "logged out"
        );
    }
    (auth::clear_session_cookie(jar), found(LOGIN_PATH)).into_response()
}

#[derive(Deserialize)]
struct PreviewForm {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub html: String,
    pub cover_image: Option<String>,
}

async fn markdown_preview(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<PreviewForm>,
) -> Result<Json<PreviewResponse>, AppError> {
    current.require_admin()?;
    let cover_image = extract_first_image_url(&form.content);
    let html = state
        .renderer
        .render(&RawMarkdown::from(form.content))
        .into_string();
    Ok(Json(PreviewResponse { html, cover_image }))
}
