/// Authentication, portal routing and request metrics middleware
use crate::{account::Role, context::AppContext, metrics};
use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::time::Instant;

/// Cookie carrying the session token for browser clients
pub const SESSION_COOKIE: &str = "portal_session";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Session token from the Authorization header, falling back to the session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Role whose portal owns this path, if any
fn portal_role(path: &str) -> Option<Role> {
    [Role::Landlord, Role::Tenant, Role::Guard]
        .into_iter()
        .find(|role| {
            let prefix = role.portal_prefix();
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
}

/// Keep each role inside its own portal
///
/// Unauthenticated requests under a portal prefix go to the login page with
/// the original path as `redirect`; a session of another role is sent to its
/// own dashboard.
pub async fn portal_gate(State(ctx): State<AppContext>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let Some(required) = portal_role(&path) else {
        return next.run(req).await;
    };

    let session = match extract_session_token(req.headers()) {
        Some(token) => ctx.account_manager.validate_access_token(&token).await.ok(),
        None => None,
    };

    match session {
        None => {
            let target = format!("/login?redirect={}", urlencoding::encode(&path));
            Redirect::to(&target).into_response()
        }
        Some(session) if session.role != required => {
            tracing::debug!(
                profile_id = %session.profile_id,
                role = session.role.as_str(),
                path = %path,
                "redirecting to own portal"
            );
            Redirect::to(&session.role.dashboard_path()).into_response()
        }
        Some(_) => next.run(req).await,
    }
}

/// Record request count, latency and in-flight gauge
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    metrics::HTTP_REQUESTS_ACTIVE.inc();
    let started = Instant::now();
    let response = next.run(req).await;
    metrics::HTTP_REQUESTS_ACTIVE.dec();

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_session_token_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; portal_session=tok123"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok123"));

        headers.insert("authorization", HeaderValue::from_static("Bearer fromheader"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("fromheader"));
    }

    #[test]
    fn test_portal_role() {
        assert_eq!(portal_role("/landlord/dashboard"), Some(Role::Landlord));
        assert_eq!(portal_role("/guard"), Some(Role::Guard));
        assert_eq!(portal_role("/tenants"), None);
        assert_eq!(portal_role("/api/tenants"), None);
    }
}
