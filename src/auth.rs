use std::env;
use std::future::Future;

use axum::{
    body::Body,
    extract::{FromRequestParts, Json, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, RedirectUrl,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;

const SESSION_COOKIE: &str = "zwc_session";

/// The signed-in identity attached to a request. Note there is no role in
/// here: donor vs. organization is a client-side display preference and is
/// never consulted for authorization.
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
}

#[derive(Serialize, Clone)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    exp: usize,
    email: String,
    name: String,
    provider: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    exp: usize,
    provider: String,
    nonce: String,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync + 'static,
{
    type Rejection = (StatusCode, String);

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let token = token_from_headers(&parts.headers)
                .ok_or((StatusCode::UNAUTHORIZED, "Missing auth token".to_string()))?;

            let claims = decode_session(&token).map_err(|e| {
                tracing::warn!("Session token rejected: {}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            })?;

            Ok(AuthenticatedUser {
                id: claims.sub,
                email: claims.email,
                name: claims.name,
                provider: claims.provider,
            })
        }
    }
}

/// Router-level guard: API requests carry a valid session, everything else
/// is a document/asset request for the SPA.
pub async fn require_auth(req: Request<Body>, next: Next) -> impl IntoResponse {
    let path = req.uri().path();
    if req.method() == axum::http::Method::OPTIONS || !path.starts_with("/api/") {
        return next.run(req).await;
    }

    if let Some(token) = token_from_headers(req.headers()) {
        if decode_session(&token).is_ok() {
            return next.run(req).await;
        }
    }

    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

pub async fn login(Path(provider): Path<String>) -> impl IntoResponse {
    let cfg = match provider_config(&provider) {
        Ok(cfg) => cfg,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    let state = match issue_state_token(&provider) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("OAuth state creation failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Auth failed").into_response();
        }
    };

    let client = BasicClient::new(ClientId::new(cfg.client_id))
        .set_client_secret(ClientSecret::new(cfg.client_secret))
        .set_auth_uri(AuthUrl::new(cfg.auth_url).expect("valid auth url"))
        .set_token_uri(TokenUrl::new(cfg.token_url).expect("valid token url"))
        .set_redirect_uri(RedirectUrl::new(cfg.redirect_url).expect("valid redirect url"));

    let (authorize_url, _csrf) = client
        .authorize_url(|| oauth2::CsrfToken::new(state))
        .url();

    Redirect::to(authorize_url.as_str()).into_response()
}

#[derive(Deserialize)]
pub struct AuthCallback {
    code: String,
    state: String,
}

pub async fn callback(
    Path(provider): Path<String>,
    Query(params): Query<AuthCallback>,
    State(_state): State<AppState>,
) -> impl IntoResponse {
    let cfg = match provider_config(&provider) {
        Ok(cfg) => cfg,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    if let Err(e) = validate_state_token(&params.state, &provider) {
        tracing::warn!("OAuth state invalid: {}", e);
        return (StatusCode::UNAUTHORIZED, "Invalid state").into_response();
    }

    let http_client = match reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("HTTP client build failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Auth failed").into_response();
        }
    };

    let client = BasicClient::new(ClientId::new(cfg.client_id.clone()))
        .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
        .set_auth_uri(AuthUrl::new(cfg.auth_url.clone()).expect("valid auth url"))
        .set_token_uri(TokenUrl::new(cfg.token_url.clone()).expect("valid token url"))
        .set_redirect_uri(RedirectUrl::new(cfg.redirect_url.clone()).expect("valid redirect url"));

    let token_result = client
        .exchange_code(AuthorizationCode::new(params.code.clone()))
        .request_async(&http_client)
        .await;
    let token_result = match token_result {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("OAuth token exchange failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "OAuth token exchange failed").into_response();
        }
    };

    let profile = match fetch_profile(&cfg.userinfo_url, token_result.access_token().secret()).await
    {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!("Userinfo fetch failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "Userinfo fetch failed").into_response();
        }
    };

    let user = UserProfile {
        id: profile.id,
        email: profile.email,
        name: profile.name,
        provider,
    };

    match issue_session_token(&user) {
        Ok(token) => {
            let mut response = Redirect::to("/").into_response();
            set_cookie(&mut response, &session_cookie(&token));
            response
        }
        Err(e) => {
            tracing::error!("Session token creation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Auth failed").into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct DevLoginRequest {
    username: String,
    password: String,
}

/// Local development entry that skips the provider round-trip. Refuses to
/// run in production or with the placeholder password.
pub async fn dev_login(Json(payload): Json<DevLoginRequest>) -> impl IntoResponse {
    let env_mode = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());
    if env_mode == "production" || env::var("ALLOW_DEV_LOGIN").unwrap_or_default() != "true" {
        return (StatusCode::FORBIDDEN, "Dev login disabled").into_response();
    }

    let dev_user = env::var("DEV_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let dev_pass = env::var("DEV_PASSWORD").unwrap_or_else(|_| "password".to_string());
    if dev_pass == "password" {
        tracing::warn!("Default DEV_PASSWORD is not allowed");
        return (StatusCode::FORBIDDEN, "Dev login misconfigured").into_response();
    }

    if payload.username != dev_user || payload.password != dev_pass {
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    let user = UserProfile {
        id: "dev-1".to_string(),
        email: "dev@local".to_string(),
        name: "Developer".to_string(),
        provider: "local".to_string(),
    };
    match issue_session_token(&user) {
        Ok(token) => {
            let mut response = Json(serde_json::json!({ "user": user })).into_response();
            set_cookie(&mut response, &session_cookie(&token));
            response
        }
        Err(e) => {
            tracing::error!("Session token creation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to create token").into_response()
        }
    }
}

pub async fn logout() -> impl IntoResponse {
    let mut response = (StatusCode::OK, "OK").into_response();
    set_cookie(&mut response, &expired_cookie());
    response
}

pub async fn me(user: AuthenticatedUser) -> impl IntoResponse {
    Json(UserProfile {
        id: user.id,
        email: user.email,
        name: user.name,
        provider: user.provider,
    })
}

fn issue_session_token(user: &UserProfile) -> anyhow::Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| anyhow::anyhow!("timestamp overflow"))?
        .timestamp();

    let claims = SessionClaims {
        sub: user.id.clone(),
        exp: expiration as usize,
        email: user.email.clone(),
        name: user.name.clone(),
        provider: user.provider.clone(),
    };

    let secret = jwt_secret()?;
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

fn decode_session(token: &str) -> anyhow::Result<SessionClaims> {
    let secret = jwt_secret()?;
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;
    Ok(data.claims)
}

fn issue_state_token(provider: &str) -> anyhow::Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::minutes(10))
        .ok_or_else(|| anyhow::anyhow!("timestamp overflow"))?
        .timestamp();
    let claims = StateClaims {
        exp: expiration as usize,
        provider: provider.to_string(),
        nonce: uuid::Uuid::new_v4().to_string(),
    };
    let secret = jwt_secret()?;
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

fn validate_state_token(token: &str, provider: &str) -> anyhow::Result<()> {
    let secret = jwt_secret()?;
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<StateClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;
    if data.claims.provider.to_lowercase() != provider.to_lowercase() {
        return Err(anyhow::anyhow!("provider mismatch"));
    }
    Ok(())
}

fn jwt_secret() -> anyhow::Result<String> {
    env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))
}

pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(bearer) = auth_header.strip_prefix("Bearer ") {
            return Some(bearer.to_string());
        }
    }

    let cookie_header = headers.get(header::COOKIE).and_then(|h| h.to_str().ok())?;
    for cookie in cookie_header.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=') {
            if name == SESSION_COOKIE {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn set_cookie(response: &mut axum::response::Response, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
}

fn session_cookie(token: &str) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age=86400",
        SESSION_COOKIE, token
    );
    if is_production() {
        cookie.push_str("; Secure");
    }
    cookie
}

fn expired_cookie() -> String {
    let mut cookie = format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", SESSION_COOKIE);
    if is_production() {
        cookie.push_str("; Secure");
    }
    cookie
}

fn is_production() -> bool {
    env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string()) == "production"
}

struct ProviderConfig {
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    redirect_url: String,
}

fn provider_config(provider: &str) -> Result<ProviderConfig, String> {
    let allowed = env::var("OAUTH_PROVIDERS").unwrap_or_default();
    let allowed_list: Vec<String> = allowed
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if allowed_list.is_empty() || !allowed_list.contains(&provider.to_lowercase()) {
        return Err("OAuth provider not allowed".to_string());
    }

    let prefix = provider.to_uppercase();
    let var = |suffix: &str| -> Result<String, String> {
        env::var(format!("{}_{}", prefix, suffix)).map_err(|_| format!("Missing {} for {}", suffix, provider))
    };

    Ok(ProviderConfig {
        client_id: var("CLIENT_ID")?,
        client_secret: var("CLIENT_SECRET")?,
        auth_url: var("AUTH_URL")?,
        token_url: var("TOKEN_URL")?,
        userinfo_url: var("USERINFO_URL")?,
        redirect_url: env::var(format!("{}_REDIRECT_URL", prefix))
            .unwrap_or_else(|_| format!("http://localhost:8080/auth/callback/{}", provider)),
    })
}

struct ProviderProfile {
    id: String,
    email: String,
    name: String,
}

async fn fetch_profile(userinfo_url: &str, access_token: &str) -> anyhow::Result<ProviderProfile> {
    let client = reqwest::Client::new();
    let resp = client
        .get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(anyhow::anyhow!("userinfo response status {}", resp.status()));
    }

    let json: Value = resp.json().await?;
    let id = json
        .get("sub")
        .or_else(|| json.get("id"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing user id"))?
        .to_string();
    let email = json
        .get("email")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown@example.com")
        .to_string();
    let name = json
        .get("name")
        .or_else(|| json.get("login"))
        .and_then(|v| v.as_str())
        .unwrap_or("User")
        .to_string();

    Ok(ProviderProfile { id, email, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tokens_round_trip() {
        std::env::set_var("JWT_SECRET", "test-secret-for-auth-tests");
        let user = UserProfile {
            id: "user-1".to_string(),
            email: "donor@example.com".to_string(),
            name: "Donor".to_string(),
            provider: "google".to_string(),
        };
        let token = issue_session_token(&user).expect("token");
        let claims = decode_session(&token).expect("claims");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.name, "Donor");
    }

    #[test]
    fn cookie_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; zwc_session=abc.def.ghi"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("zwc_session=other"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("tok"));
    }
}
