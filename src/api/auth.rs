//! Google sign-in and caller sessions.
//!
//! - `GET /auth/login` returns the consent URL; state and PKCE verifier stay in memory
//! - `GET /auth/callback` exchanges the code, stores the credentials and redirects to
//!   the frontend with a session token in the URL fragment
//! - Protected endpoints require `Authorization: Bearer <session>`
//!
//! Sessions are signed with `SESSION_SECRET`; use a strong value in production.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};

use super::routes::AppState;
use super::types::{AuthCallbackQuery, AuthLoginResponse, AuthStatusResponse};
use crate::auth::session;

/// How long a started authorization may take to come back.
const PENDING_OAUTH_TTL: Duration = Duration::from_secs(600);

/// An authorization waiting for its callback, keyed by state.
#[derive(Debug, Clone)]
pub struct PendingOAuth {
    pub verifier: String,
    pub created_at: Instant,
}

/// The authenticated caller, inserted by [`require_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub email: String,
}

fn session_from_headers(headers: &HeaderMap, secret: &str) -> Option<SessionUser> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    let token = session::bearer_token(header)?;
    session::verify(token, secret)
        .ok()
        .map(|claims| SessionUser { email: claims.sub })
}

pub async fn login(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AuthLoginResponse>, (StatusCode, String)> {
    let request = state
        .oauth
        .begin()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut pending = state.pending_oauth.write().await;
    pending.retain(|_, p| p.created_at.elapsed() <= PENDING_OAUTH_TTL);
    pending.insert(
        request.state,
        PendingOAuth {
            verifier: request.verifier,
            created_at: Instant::now(),
        },
    );

    Ok(Json(AuthLoginResponse {
        auth_url: request.url,
    }))
}

/// Redirect to the frontend. A session token goes in the fragment, which browsers
/// never send to servers or in `Referer`.
fn frontend_redirect(frontend_url: &str, params: &[(&str, &str)], session: Option<&str>) -> Redirect {
    let Ok(mut url) = url::Url::parse_with_params(frontend_url, params) else {
        return Redirect::to(frontend_url);
    };
    if let Some(token) = session {
        let fragment = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("session", token)
            .finish();
        url.set_fragment(Some(&fragment));
    }
    Redirect::to(url.as_str())
}

pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthCallbackQuery>,
) -> Redirect {
    let frontend = state.config.frontend_url.as_str();
    match complete_callback(&state, query).await {
        Ok(token) => frontend_redirect(frontend, &[("auth", "success")], Some(token.as_str())),
        Err(message) => {
            tracing::warn!("OAuth callback failed: {}", message);
            frontend_redirect(frontend, &[("auth", "error"), ("message", message.as_str())], None)
        }
    }
}

/// Exchange the code, persist the credentials and return a session token.
async fn complete_callback(state: &AppState, query: AuthCallbackQuery) -> Result<String, String> {
    if let Some(error) = query.error {
        return Err(format!("Authorization denied: {}", error));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err("Missing code or state".to_string());
    };

    let pending = state
        .pending_oauth
        .write()
        .await
        .remove(&oauth_state)
        .ok_or_else(|| "Unknown or already used OAuth state".to_string())?;
    if pending.created_at.elapsed() > PENDING_OAUTH_TTL {
        return Err("OAuth authorization expired. Please start again.".to_string());
    }

    let (credentials, user) = state
        .oauth
        .complete(&code, &pending.verifier)
        .await
        .map_err(|e| e.to_string())?;
    state
        .credentials
        .save(&user, &credentials)
        .await
        .map_err(|e| e.to_string())?;

    let (token, _exp) = session::issue(
        &state.config.session_secret,
        &user,
        state.config.session_ttl_days,
    )
    .map_err(|e| e.to_string())?;

    tracing::info!(user = %user, "OAuth login complete");
    Ok(token)
}

/// Whether the caller has a valid session and stored credentials. Never fails.
pub async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<AuthStatusResponse> {
    let unauthenticated = Json(AuthStatusResponse {
        authenticated: false,
        email: None,
    });

    let Some(user) = session_from_headers(&headers, &state.config.session_secret) else {
        return unauthenticated;
    };
    match state.credentials.load(&user.email).await {
        Ok(Some(_)) => Json(AuthStatusResponse {
            authenticated: true,
            email: Some(user.email),
        }),
        Ok(None) => unauthenticated,
        Err(e) => {
            tracing::warn!(user = %user.email, "Stored credentials unusable: {}", e);
            unauthenticated
        }
    }
}

pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let has_header = req.headers().contains_key(header::AUTHORIZATION);
    match session_from_headers(req.headers(), &state.config.session_secret) {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None if !has_header => {
            (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response()
        }
        None => (StatusCode::UNAUTHORIZED, "Invalid or expired session").into_response(),
    }
}
