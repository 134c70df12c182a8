//! User JWT authentication middleware.
//!
//! Provides middleware for requiring JWT-based user authentication on routes.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::config::JwtAuthConfig;
use shared::jwt::{extract_user_id, JwtVerifier};

/// Authenticated user information extracted from JWT.
#[derive(Debug, Clone)]
pub struct UserAuth {
    /// User ID from the JWT subject claim.
    pub user_id: Uuid,
    /// JWT ID (jti) for session tracking.
    pub jti: String,
}

impl UserAuth {
    /// Validates an access token and returns user authentication info.
    pub fn validate(verifier: &JwtVerifier, token: &str) -> Result<Self, String> {
        let claims = verifier
            .validate(token)
            .map_err(|e| format!("Invalid token: {}", e))?;

        let user_id =
            extract_user_id(&claims).map_err(|_| "Invalid user ID in token".to_string())?;

        Ok(UserAuth {
            user_id,
            jti: claims.jti,
        })
    }

    /// Creates a token verifier from the JWT auth configuration.
    pub fn create_verifier(config: &JwtAuthConfig) -> Result<JwtVerifier, String> {
        JwtVerifier::from_rsa_pem(&config.public_key, config.leeway_secs)
            .map_err(|e| format!("Failed to initialize JWT verifier: {}", e))
    }
}

/// Middleware that requires JWT user authentication.
///
/// Validates the Bearer token in the Authorization header and rejects
/// requests without a valid JWT. Authenticated user information is stored
/// in request extensions for use by downstream handlers.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    // The verifier is built once at startup; a missing one means the
    // configured public key was unusable.
    let verifier = match state.jwt_verifier.as_deref() {
        Some(verifier) => verifier,
        None => {
            tracing::error!("JWT verifier not configured");
            return internal_error_response("Authentication service unavailable");
        }
    };

    match UserAuth::validate(verifier, token) {
        Ok(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("JWT validation failed: {}", e);
            unauthorized_response("Invalid or expired token")
        }
    }
}

/// Helper to create unauthorized response.
fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": message
        })),
    )
        .into_response()
}

/// Helper to create internal error response.
fn internal_error_response(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "internal_error",
            "message": message
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use shared::jwt::Claims;

    const TEST_SECRET: &str = "middleware_test_secret_0123456789";

    fn mint_token(user_id: Uuid, expires_in_secs: i64) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_good_token() {
        let verifier = JwtVerifier::new_for_testing(TEST_SECRET);
        let user_id = Uuid::new_v4();

        let auth = UserAuth::validate(&verifier, &mint_token(user_id, 900)).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert!(!auth.jti.is_empty());
    }

    #[test]
    fn test_validate_expired_token() {
        let verifier = JwtVerifier::new_for_testing(TEST_SECRET);
        let result = UserAuth::validate(&verifier, &mint_token(Uuid::new_v4(), -300));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_garbage_token() {
        let verifier = JwtVerifier::new_for_testing(TEST_SECRET);
        assert!(UserAuth::validate(&verifier, "not.a.token").is_err());
    }

    #[test]
    fn test_create_verifier_bad_key() {
        let config = JwtAuthConfig {
            public_key: "not a pem".to_string(),
            leeway_secs: 30,
        };
        assert!(UserAuth::create_verifier(&config).is_err());
    }

    #[test]
    fn test_unauthorized_response() {
        let response = unauthorized_response("Missing or invalid Authorization header");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_internal_error_response() {
        let response = internal_error_response("Authentication service unavailable");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_user_auth_clone() {
        let auth = UserAuth {
            user_id: Uuid::new_v4(),
            jti: "test_jti".to_string(),
        };
        let cloned = auth.clone();
        assert_eq!(auth.user_id, cloned.user_id);
        assert_eq!(auth.jti, cloned.jti);
    }
}
