use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::{error, info};
use crate::state::AppState;
use crate::services::auth_service::{authenticate, get_auth_token};
use crate::ws::connctx::SessionIdentity;

/// Query string carrying a session token, for clients that cannot set headers.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Resolve the session behind a request, from headers or a `token` query value.
pub fn resolve_session(state: &AppState, headers: &HeaderMap, query_token: Option<&str>) -> Result<(SessionIdentity, Vec<String>), StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(headers, query_token) {
        Ok(token) => token,
        Err(e) => {
            info!("Unauthenticated request: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 2. Validate Token
    let secret = match &state.config.cloud_auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Cloud auth JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    // 3. Extract identity and roles
    authenticate(&token, secret).map_err(|e| {
        error!("{}", e);
        StatusCode::UNAUTHORIZED
    })
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    let query_token = Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token);
    let (identity, roles) = resolve_session(&state, req.headers(), query_token.as_deref())?;

    // Set identity and roles into request extensions for downstream handlers
    {
        let extensions = req.extensions_mut();
        extensions.insert(identity);
        extensions.insert(roles);
    }

    Ok(next.run(req).await)
}
