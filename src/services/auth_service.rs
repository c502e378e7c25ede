use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation, TokenData};
use tracing::info;
use crate::ws::connctx::SessionIdentity;

pub const AUTH_COOKIE: &str = "auth_token";

// Get the auth token from the request headers, falling back to a query parameter.
// Browsers cannot set headers on a WebSocket handshake, hence the query fallback.
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = headers.get(http::header::COOKIE) {
        let cookie_str = cookie_header.to_str().map_err(|_| "Invalid Cookie header".to_string())?;
        for cookie in cookie::Cookie::split_parse(cookie_str).flatten() {
            if cookie.name() == AUTH_COOKIE {
                return Ok(cookie.value().to_string());
            }
        }
    }

    // 3. Query string
    match query_token {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err("Missing Authorization header, auth_token cookie or token parameter".to_string()),
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

// Resolve the session identity from validated claims.
// `sub` is the user id; the display name comes from `name`, defaulting to the id.
pub fn identity_from_claims(claims: &serde_json::Value) -> Result<SessionIdentity, String> {
    let user_id = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "JWT token does not contain 'sub' claim".to_string())?;

    let user_name = claims
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(user_id);

    info!("Session identity resolved for user: {}", user_id);
    Ok(SessionIdentity {
        user_id: user_id.to_string(),
        user_name: user_name.to_string(),
    })
}

// Roles carried in the token's `roles` claim
pub fn roles_from_claims(claims: &serde_json::Value) -> Vec<String> {
    match claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles_array) => roles_array.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect(),
        None => Vec::new(),
    }
}

// Validate the token and return identity plus roles in one go
pub fn authenticate(token: &str, secret: &str) -> Result<(SessionIdentity, Vec<String>), String> {
    let token_data = validate_jwt(token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;
    let identity = identity_from_claims(&token_data.claims)?;
    let roles = roles_from_claims(&token_data.claims);
    Ok((identity, roles))
}
