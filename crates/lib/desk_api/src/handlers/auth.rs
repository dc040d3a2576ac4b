//! Authentication request handlers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use desk_core::auth::AuthError;
use desk_core::auth::sessions::Registration;
use tracing::warn;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, ProfileResponse,
    RefreshResponse, RegisterRequest,
};
use crate::services::client::session_metadata;
use crate::services::cookies::REFRESH_COOKIE;

/// `POST /auth/register`: create an account and sign it in.
pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let outcome = state
        .auth
        .register(
            Registration {
                email: body.email,
                password: body.password,
                full_name: body.full_name,
                role: body.role,
            },
            session_metadata(&headers),
        )
        .await?;
    let jar = state.cookies.set_pair(
        jar,
        &outcome.tokens.access_token,
        &outcome.tokens.refresh_token,
    );
    Ok((StatusCode::CREATED, jar, Json(outcome.into())))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let outcome = state
        .auth
        .login(&body.email, &body.password, session_metadata(&headers))
        .await?;
    let jar = state.cookies.set_pair(
        jar,
        &outcome.tokens.access_token,
        &outcome.tokens.refresh_token,
    );
    Ok((jar, Json(outcome.into())))
}

/// `POST /auth/refresh`: rotate the refresh token from the cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<RefreshResponse>)> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Refresh token required".into()))?;

    let pair = state
        .auth
        .refresh(&token, session_metadata(&headers))
        .await?;
    let jar = state
        .cookies
        .set_pair(jar, &pair.access_token, &pair.refresh_token);
    Ok((
        jar,
        Json(RefreshResponse {
            message: "Token refreshed".into(),
            access_token: pair.access_token,
        }),
    ))
}

/// `POST /auth/logout`: revoke the session behind the refresh cookie.
///
/// Always succeeds and always clears the cookies.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    if let Some(cookie) = jar.get(REFRESH_COOKIE)
        && let Err(e) = state.auth.logout(cookie.value()).await
    {
        warn!(error = %e, "logout could not revoke session");
    }
    let jar = state.cookies.clear(jar);
    (jar, Json(MessageResponse::new("Logged out successfully")))
}

/// `GET /auth/me`: profile and permissions of the current user.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state.auth.profile(&user.0.user_id).await?;
    Ok(Json(profile.into()))
}

/// `POST /auth/change-password`
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    if body.old_password.is_empty() || body.new_password.is_empty() {
        return Err(AppError::Validation(
            "Old and new password are required".into(),
        ));
    }
    state
        .auth
        .change_password(&user.0.user_id, &body.old_password, &body.new_password)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredential => AppError::Validation("Invalid old password".into()),
            other => other.into(),
        })?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}
