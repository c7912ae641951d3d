use crate::config::JwtConfig;
use crate::error::{ApiError, ACCESS_COOKIE};
use crate::flash;
use crate::handlers::AppState;
use crate::models::{Claims, Role, User};
use crate::user_service;
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use anyhow::{anyhow, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use sqlx::PgPool;
use uuid::Uuid;

pub const RESTRICTED_NOTICE: &str = "Restricted access to this page.";

pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiration_minutes: i64,
}

impl JwtAuth {
    pub fn new(config: &JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let validation = Validation::default();

        Self {
            encoding_key,
            decoding_key,
            validation,
            expiration_minutes: config.expiration_minutes,
        }
    }

    pub fn expiration_minutes(&self) -> i64 {
        self.expiration_minutes
    }

    /// Generate a new JWT token for a user
    pub fn generate_token(&self, user_id: Uuid, email: &str, role: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.expiration_minutes * 60);

        let claims = Claims {
            sub: email.to_string(),
            user_id,
            role: role.to_string(),
            exp,
            iat: now,
            jti: Uuid::new_v4(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Token generation failed: {}", e))
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| anyhow!("Token validation failed: {}", e))
    }

    pub async fn is_token_revoked(&self, jti: Uuid, pool: &PgPool) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = $1 AND expires_at > now())"
        )
        .bind(jti)
        .fetch_one(pool)
        .await
    }

    /// Revoke a token (for logout)
    pub async fn revoke_token(&self, claims: &Claims, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO revoked_tokens (jti, user_id, expires_at) VALUES ($1, $2, to_timestamp($3))
             ON CONFLICT (jti) DO NOTHING"
        )
        .bind(claims.jti)
        .bind(claims.user_id)
        .bind(claims.exp as f64)
        .execute(pool)
        .await?;

        Ok(())
    }
}

// ============ Passwords ============

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Password hashing failed: {}", e))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ============ Token transport ============

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(auth_header: Option<&str>) -> Result<String> {
    match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            Ok(header.trim_start_matches("Bearer ").to_string())
        }
        _ => Err(anyhow!("Missing or invalid Authorization header")),
    }
}

/// Token from the session cookie, falling back to the Authorization header.
/// The cookie may carry a `Bearer ` prefix.
pub fn token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(ACCESS_COOKIE) {
        let value = cookie.value().trim();
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    let auth_header = req.headers().get("Authorization").and_then(|h| h.to_str().ok());
    extract_bearer_token(auth_header).ok()
}

// ============ Current user ============

/// The authenticated caller, resolved from the token's email.
#[derive(Debug)]
pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
    /// Notices already pending on the request.
    pub notices: Vec<String>,
}

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn has_role(&self, allowed: &[Role]) -> bool {
        self.user.role().map(|role| allowed.contains(&role)).unwrap_or(false)
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if self.has_role(allowed) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(self.with_notice(RESTRICTED_NOTICE)))
        }
    }

    /// Pending notices followed by `message`.
    pub fn with_notice(&self, message: &str) -> Vec<String> {
        let mut notices = self.notices.clone();
        notices.push(message.to_string());
        notices
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = token_from_request(req);
        let notices = flash::take(req);

        Box::pin(async move {
            let state = state.ok_or_else(|| ApiError::Internal("Application state missing".to_string()))?;
            let token = token.ok_or(ApiError::Unauthorized)?;

            let claims = state
                .jwt_auth
                .validate_token(&token)
                .map_err(|_| ApiError::Unauthorized)?;

            if state.jwt_auth.is_token_revoked(claims.jti, &state.pool).await? {
                return Err(ApiError::Unauthorized);
            }

            let mut conn = state.pool.acquire().await?;
            let user = user_service::get_by_email(&mut conn, &state.cipher, &claims.sub)
                .await?
                .ok_or(ApiError::Unauthorized)?;

            Ok(CurrentUser { user, claims, notices })
        })
    }
}
