//! Authentication and authorization middleware.
//!
//! [`require_auth`] resolves the principal from the `Authorization: Bearer`
//! header, or the `accessToken` cookie when no header is sent, and stores it in
//! request extensions.
//! [`require_permission`] is layered per route on top of it.

use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum::http::header::AUTHORIZATION;
use desk_core::auth::AuthError;
use desk_core::auth::gate::{authorize, bearer_token, select_token};
use desk_core::models::auth::Principal;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::{ACCESS_COOKIE, cookie_value};

/// Key used to store the resolved `Principal` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

/// Status mapping for the authentication gate: a bad token or a missing user
/// is 403, a revoked session 401.
fn gate_error(e: AuthError) -> AppError {
    match e {
        AuthError::InvalidCredential | AuthError::InvalidToken => {
            AppError::Forbidden("Invalid or expired token".into())
        }
        AuthError::PrincipalNotFound => AppError::Forbidden("User not found".into()),
        other => AppError::from(other),
    }
}

/// Axum middleware: extracts the access token, verifies it against its
/// session and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| {
            v.to_str()
                .map_err(|_| AuthError::InvalidCredential)
                .and_then(bearer_token)
        })
        .transpose()
        .map_err(gate_error)?;
    let cookie = cookie_value(request.headers(), ACCESS_COOKIE);

    let principal = state
        .gate
        .authenticate(select_token(header, cookie.as_deref()))
        .await
        .map_err(gate_error)?;

    request.extensions_mut().insert(AuthenticatedUser(principal));
    Ok(next.run(request).await)
}

/// Permission guard for a route group.
///
/// Must run after [`require_auth`]; without a principal it fails with 401.
pub fn require_permission(
    permission: &'static str,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>
+ Clone {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let principal = req.extensions().get::<AuthenticatedUser>().map(|u| &u.0);
            authorize(principal, permission)?;
            Ok(next.run(req).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn gate_statuses() {
        let status = |e| gate_error(e).into_response().status();
        assert_eq!(status(AuthError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidCredential), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthError::SessionRevoked), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::PrincipalNotFound), StatusCode::FORBIDDEN);
    }
}
