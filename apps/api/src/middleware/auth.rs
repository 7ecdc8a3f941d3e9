//! Authentication extractors for Axum handlers
//!
//! Access tokens are issued by the identity provider; the API only verifies
//! them, so there is no user lookup on the request path.
//!
//! ```rust,ignore
//! async fn balance(auth: AuthUser) -> impl IntoResponse {
//!     format!("credits for {}", auth.user_id)
//! }
//!
//! async fn queue_stats(_admin: AdminUser) -> impl IntoResponse { ... }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ErrorResponse};
use crate::models::Claims;
use crate::services::AuthService;

/// Authenticated caller; 401 when the bearer token is missing or invalid
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub claims: Claims,
}

impl AuthUser {
    /// Whether the caller may act on resources owned by `owner`
    pub fn can_access(&self, owner: Option<Uuid>) -> bool {
        self.claims.is_admin() || owner == Some(self.user_id)
    }
}

/// Admin-only extractor; 401 without a valid token, 403 without the admin role
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: Uuid,
    pub claims: Claims,
}

/// Authentication rejection types
#[derive(Debug)]
pub enum AuthRejection {
    /// Missing or non-bearer Authorization header
    MissingToken,
    /// Token is malformed, expired or signed with another key
    InvalidToken(String),
    /// Caller lacks the admin role
    InsufficientPermissions,
    /// `AuthService` extension not installed on the router
    MissingServices,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AuthRejection::MissingToken => {
                tracing::debug!("Authentication rejected: missing token");
                (StatusCode::UNAUTHORIZED, ApiError::Unauthorized)
            }
            AuthRejection::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Authentication rejected: invalid token");
                (StatusCode::UNAUTHORIZED, ApiError::InvalidToken(reason))
            }
            AuthRejection::InsufficientPermissions => {
                tracing::warn!("Authentication rejected: insufficient permissions");
                (
                    StatusCode::FORBIDDEN,
                    ApiError::Forbidden("admin access required".to_string()),
                )
            }
            AuthRejection::MissingServices => {
                tracing::error!("Authentication rejected: AuthService extension missing");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::Internal("Authentication services not configured".to_string()),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: error.error_code(),
            message: error.to_string(),
            details: None,
        });

        (status, body).into_response()
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn verified_claims(parts: &Parts) -> Result<Claims, AuthRejection> {
    let token = extract_bearer_token(parts).ok_or(AuthRejection::MissingToken)?;

    let auth_service = parts
        .extensions
        .get::<AuthService>()
        .ok_or(AuthRejection::MissingServices)?;

    auth_service
        .verify_access_token(token)
        .map_err(|e| AuthRejection::InvalidToken(e.to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = verified_claims(parts)?;
        Ok(AuthUser {
            user_id: claims.sub,
            claims,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = verified_claims(parts)?;
        if !claims.is_admin() {
            tracing::debug!(user_id = %claims.sub, "Admin route refused");
            return Err(AuthRejection::InsufficientPermissions);
        }

        Ok(AdminUser {
            user_id: claims.sub,
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::services::AuthConfig;
    use axum::http::Request;

    const SECRET: &str = "test-secret-key-that-is-at-least-32-chars";

    fn parts_with(header: Option<&str>, auth: Option<AuthService>) -> Parts {
        let mut builder = Request::builder();
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        if let Some(service) = auth {
            parts.extensions.insert(service);
        }
        parts
    }

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(SECRET.to_string()))
    }

    fn token(service: &AuthService, role: UserRole) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let token = service
            .issue_token(Claims::new(user_id, None, role, 3600))
            .unwrap();
        (user_id, token)
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        let parts = parts_with(Some("Bearer test_token_123"), None);
        assert_eq!(extract_bearer_token(&parts), Some("test_token_123"));
    }

    #[test]
    fn test_extract_bearer_token_missing() {
        let parts = parts_with(None, None);
        assert_eq!(extract_bearer_token(&parts), None);
    }

    #[test]
    fn test_extract_bearer_token_invalid_scheme() {
        let parts = parts_with(Some("Basic dXNlcjpwYXNz"), None);
        assert_eq!(extract_bearer_token(&parts), None);

        let parts = parts_with(Some("Bearer "), None);
        assert_eq!(extract_bearer_token(&parts), None);
    }

    #[test]
    fn test_auth_rejection_responses() {
        let response = AuthRejection::MissingToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthRejection::InvalidToken("expired".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthRejection::InsufficientPermissions.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AuthRejection::MissingServices.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_auth_user_from_valid_token() {
        let service = service();
        let (user_id, token) = token(&service, UserRole::User);
        let mut parts = parts_with(Some(format!("Bearer {}", token).as_str()), Some(service));

        let auth = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(auth.user_id, user_id);
        assert!(auth.can_access(Some(user_id)));
        assert!(!auth.can_access(Some(Uuid::new_v4())));
        assert!(!auth.can_access(None));
    }

    #[tokio::test]
    async fn test_missing_service_is_server_error() {
        let mut parts = parts_with(Some("Bearer whatever"), None);
        let rejection = AuthUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(rejection, AuthRejection::MissingServices));
    }

    #[tokio::test]
    async fn test_admin_requires_role() {
        let service = service();
        let (_, user_token) = token(&service, UserRole::User);
        let mut parts = parts_with(Some(format!("Bearer {}", user_token).as_str()), Some(service.clone()));
        let rejection = AdminUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(rejection, AuthRejection::InsufficientPermissions));

        let (admin_id, admin_token) = token(&service, UserRole::Admin);
        let mut parts = parts_with(Some(format!("Bearer {}", admin_token).as_str()), Some(service));
        let admin = AdminUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(admin.user_id, admin_id);
    }
}
