//! Authentication — account endpoints and bearer-token plumbing.
//!
//! Tokens are HS256 JWTs carrying `{sub, username, exp}` with a 7-day
//! expiry, accepted either as an `Authorization: Bearer` header or as the
//! `flowtalk_token` cookie (set on register/login, cleared on logout).

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, State};
use axum::http::HeaderValue;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use flowtalk_pipeline::Language;
use flowtalk_store::{ProfileUpdate, User};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Cookie carrying the token for browser clients.
const COOKIE_NAME: &str = "flowtalk_token";

/// Token lifetime: 7 days.
const TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

// ── token signing ────────────────────────────────────────────────────

/// JWT claims for an authenticated session.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Username at issue time (display convenience; the id is canonical).
    pub username: String,
    /// Expiry as Unix seconds.
    pub exp: i64,
}

/// Signs and verifies session tokens.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenSigner {
    /// Build a signer from the shared secret (`JWT_SECRET`).
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for a user.
    pub fn sign(&self, user: &User) -> ApiResult<String> {
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            exp: Utc::now().timestamp() + TOKEN_TTL_SECS,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    /// Verify a token and return its claims.  Expired or tampered tokens
    /// are rejected.
    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized)
    }
}

// ── extractor ────────────────────────────────────────────────────────

/// The authenticated caller, extracted from header or cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// User id from the token's `sub`.
    pub user_id: String,
    /// Username from the token.
    pub username: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or(ApiError::Unauthorized)?;
        let claims = state.tokens.verify(&token)?;
        Ok(AuthUser {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == COOKIE_NAME).then(|| value.to_owned())
    })
}

/// `Set-Cookie` value installing the token.
fn session_cookie(token: &str) -> String {
    format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={TOKEN_TTL_SECS}")
}

/// `Set-Cookie` value clearing the token.
fn clear_cookie() -> String {
    format!("{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Wrap a JSON body with a `Set-Cookie` header.
fn with_cookie(cookie: String, body: serde_json::Value) -> ApiResult<Response> {
    let mut response = Json(body).into_response();
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::Internal(format!("bad cookie header: {e}")))?;
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

// ── views ────────────────────────────────────────────────────────────

/// The caller's own account, as returned by auth endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub username: String,
    pub primary_language: Language,
    pub avatar: Option<String>,
    pub status: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            primary_language: user.primary_language,
            avatar: user.avatar,
            status: user.status_message,
        }
    }
}

// ── handlers ─────────────────────────────────────────────────────────

/// Body for `POST /auth/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    pub username: String,
    pub primary_language: String,
}

/// Register a new account and start a session.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<Response> {
    let language = Language::from_code(&body.primary_language)
        .ok_or_else(|| ApiError::invalid(format!("unsupported language: {}", body.primary_language)))?;

    let user = state
        .users
        .create(&body.email, &body.password, &body.username, language)
        .await?;

    debug!(user_id = %user.id, "registered");
    let token = state.tokens.sign(&user)?;
    with_cookie(
        session_cookie(&token),
        serde_json::json!({ "user": UserView::from(user), "token": token }),
    )
}

/// Body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// Check credentials and start a session.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Response> {
    let user = state
        .users
        .authenticate(&body.email, &body.password)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let token = state.tokens.sign(&user)?;
    with_cookie(
        session_cookie(&token),
        serde_json::json!({ "user": UserView::from(user), "token": token }),
    )
}

/// End the session by clearing the cookie.  Stateless tokens cannot be
/// revoked server-side before expiry.
pub async fn logout(_auth: AuthUser) -> ApiResult<Response> {
    with_cookie(clear_cookie(), serde_json::json!({}))
}

/// Return the caller's account.
pub async fn me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let user = state
        .users
        .get(&auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(serde_json::json!({ "user": UserView::from(user) })))
}

/// Body for `PUT /auth/profile`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBody {
    pub primary_language: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<String>,
}

/// Update the caller's profile.  Language changes affect future fan-outs
/// only; already-translated messages are untouched.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ProfileBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let primary_language = body
        .primary_language
        .map(|code| {
            Language::from_code(&code)
                .ok_or_else(|| ApiError::invalid(format!("unsupported language: {code}")))
        })
        .transpose()?;

    let user = state
        .users
        .update_profile(
            &auth.user_id,
            ProfileUpdate {
                primary_language,
                avatar: body.avatar,
                status_message: body.status,
            },
        )
        .await?;
    Ok(Json(serde_json::json!({ "user": UserView::from(user) })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret")
    }

    fn test_user() -> User {
        User {
            id: "u-1".into(),
            email: "a@b.com".into(),
            username: "ana".into(),
            primary_language: Language::Es,
            avatar: None,
            status_message: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn sign_verify_round_trip() {
        let signer = signer();
        let token = signer.sign(&test_user()).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.username, "ana");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn tampered_token_rejected() {
        let signer = signer();
        let token = signer.sign(&test_user()).unwrap();
        let tampered = format!("{token}x");
        assert!(signer.verify(&tampered).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = signer().sign(&test_user()).unwrap();
        let other = TokenSigner::new("different-secret");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn cookie_value_round_trips() {
        let cookie = session_cookie("abc123");
        assert!(cookie.starts_with("flowtalk_token=abc123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(clear_cookie().contains("Max-Age=0"));
    }
}
