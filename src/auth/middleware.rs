use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::{AuthContext, Role};
use crate::error::ErrorResponse;

/// Header carrying the session user id.
pub const X_USER_ID: &str = "x-user-id";
/// Header carrying the session role.
pub const X_USER_ROLE: &str = "x-user-role";

/// Extractor that requires an authenticated actor.
///
/// The session gateway in front of this service authenticates the user and
/// forwards identity out-of-band in `x-user-id` / `x-user-role` headers.
///
/// Example:
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {}", auth.user_id)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingIdentity,
    InvalidUserId,
    InvalidRole,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingIdentity => {
                (StatusCode::UNAUTHORIZED, "Missing session identity headers")
            }
            AuthError::InvalidUserId => (StatusCode::UNAUTHORIZED, "Invalid session user id"),
            AuthError::InvalidRole => (StatusCode::UNAUTHORIZED, "Invalid session role"),
        };

        let body = ErrorResponse {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            request_id: None,
        };

        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(X_USER_ID)
            .ok_or(AuthError::MissingIdentity)?
            .to_str()
            .map_err(|_| AuthError::InvalidUserId)?;
        let user_id = Uuid::parse_str(user_id).map_err(|_| AuthError::InvalidUserId)?;

        let role = parts
            .headers
            .get(X_USER_ROLE)
            .ok_or(AuthError::MissingIdentity)?
            .to_str()
            .map_err(|_| AuthError::InvalidRole)?;
        let role = Role::parse(role).ok_or(AuthError::InvalidRole)?;

        Ok(RequireAuth(AuthContext::new(user_id, role)))
    }
}
