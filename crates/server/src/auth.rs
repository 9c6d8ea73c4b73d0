//! Shared-secret login gate.
//!
//! A successful login creates a random session token, remembers it server-side
//! and hands the browser an HttpOnly cookie `token.signature` where
//! `signature = hex(sha256(secret_key ":" token))`. A request is authenticated
//! when the signature verifies and the token is in the session set and younger
//! than `SESSION_TTL_MINUTES`. Expired tokens are pruned on each login and the
//! set never holds more than [`MAX_SESSIONS`] entries.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::page;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "powerwatch_session";
pub const MAX_SESSIONS: usize = 1024;

pub fn sign(secret: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares SHA-256 digests of both sides so the time taken does not depend
/// on where the inputs first differ.
fn digest_eq(a: &str, b: &str) -> bool {
    let (a, b) = (Sha256::digest(a.as_bytes()), Sha256::digest(b.as_bytes()));
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// The session token carried by the request, if it is signed and live.
pub async fn session_token(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let (token, signature) = cookie(headers, SESSION_COOKIE)?.split_once('.')?;
    if !digest_eq(&sign(&state.dashboard.secret_key, token), signature) {
        return None;
    }
    let ttl = Duration::minutes(state.dashboard.session_ttl_minutes);
    let issued_at = *state.sessions.read().await.get(token)?;
    (Utc::now() - issued_at < ttl).then(|| token.to_string())
}

/// Drop expired sessions, then the oldest ones until there is room for one more.
async fn prune_sessions(state: &AppState) {
    let cutoff = Utc::now() - Duration::minutes(state.dashboard.session_ttl_minutes);
    let mut sessions = state.sessions.write().await;
    sessions.retain(|_, issued_at| *issued_at > cutoff);
    while sessions.len() >= MAX_SESSIONS {
        let oldest = sessions
            .iter()
            .min_by_key(|(_, issued_at)| **issued_at)
            .map(|(token, _)| token.clone());
        match oldest {
            Some(token) => {
                sessions.remove(&token);
                debug!("Evicted oldest session");
            }
            None => break,
        }
    }
}

/// Middleware for protected routes: no valid session, 303 to `/login`.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if session_token(&state, req.headers()).await.is_some() {
        return next.run(req).await;
    }
    debug!("Unauthenticated request to {}, redirecting", req.uri().path());
    Redirect::to("/login").into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub async fn login_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if session_token(&state, &headers).await.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(page::login(None)).into_response()
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let cfg = &state.dashboard;
    let user_ok = digest_eq(&form.username, &cfg.username);
    let pass_ok = digest_eq(&form.password, &cfg.password);
    if !(user_ok && pass_ok) {
        warn!("Failed login for user '{}'", form.username);
        return (
            StatusCode::UNAUTHORIZED,
            Html(page::login(Some("Invalid username or password"))),
        )
            .into_response();
    }

    let token = uuid::Uuid::new_v4().simple().to_string();
    let signature = sign(&cfg.secret_key, &token);
    prune_sessions(&state).await;
    state.sessions.write().await.insert(token.clone(), Utc::now());
    info!("User '{}' logged in", form.username);

    let max_age = cfg.session_ttl_minutes * 60;
    let cookie = format!(
        "{SESSION_COOKIE}={token}.{signature}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}"
    );
    ([(SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&state, &headers).await {
        state.sessions.write().await.remove(&token);
        info!("Session closed");
    }
    let cleared = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0");
    ([(SET_COOKIE, cleared)], Redirect::to("/login")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn signature_depends_on_secret_and_token() {
        let a = sign("secret", "tok");
        assert_eq!(a.len(), 64);
        assert_eq!(a, sign("secret", "tok"));
        assert_ne!(a, sign("other", "tok"));
        assert_ne!(a, sign("secret", "tok2"));
    }

    #[test]
    fn digest_comparison() {
        assert!(digest_eq("s3cret", "s3cret"));
        assert!(!digest_eq("s3cret", "s3cret "));
        assert!(!digest_eq("", "x"));
        assert!(digest_eq("", ""));
    }

    #[test]
    fn cookie_lookup_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; powerwatch_session=abc.def; lang=fr"),
        );
        assert_eq!(cookie(&headers, SESSION_COOKIE), Some("abc.def"));
        assert_eq!(cookie(&headers, "missing"), None);
    }
}
