/// Rate Limiting System
use crate::{
    api::middleware::extract_session_token,
    config::RateLimitConfig,
    context::AppContext,
    error::{PortalError, PortalResult},
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Paths the payment provider calls; never throttled so callbacks are not lost
const EXEMPT_PATHS: &[&str] = &["/api/payments/callback", "/health", "/health/ready"];

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    limit: u32,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    /// Authenticated callers get the configured rate with a burst of twice
    /// that; anonymous callers get a fifth of it.
    pub fn new(config: &RateLimitConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = rps.saturating_mul(NonZeroU32::MIN.saturating_add(1));
        let anon_rps = NonZeroU32::new(config.requests_per_second / 5).unwrap_or(NonZeroU32::MIN);

        Self {
            enabled: config.enabled,
            limit: rps.get(),
            authenticated: Arc::new(GovernorLimiter::direct(
                Quota::per_second(rps).allow_burst(burst),
            )),
            unauthenticated: Arc::new(GovernorLimiter::direct(
                Quota::per_second(anon_rps).allow_burst(rps),
            )),
        }
    }

    /// Check rate limit for authenticated user
    pub fn check_authenticated(&self) -> PortalResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.authenticated
            .check()
            .map_err(|_| PortalError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            })
    }

    /// Check rate limit for unauthenticated user
    pub fn check_unauthenticated(&self) -> PortalResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.unauthenticated
            .check()
            .map_err(|_| PortalError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    if EXEMPT_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let result = if extract_session_token(request.headers()).is_some() {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    match result {
        Ok(()) => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("X-RateLimit-Limit", HeaderValue::from(ctx.rate_limiter.limit));
            response
        }
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
            let mut response = e.into_response();
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from_static("1"));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: 5,
        });

        // Burst is twice the rate
        for _ in 0..10 {
            assert!(limiter.check_authenticated().is_ok());
        }
        assert!(limiter.check_authenticated().is_err());
    }

    #[test]
    fn test_disabled_limiter_never_rejects() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            requests_per_second: 1,
        });

        for _ in 0..100 {
            assert!(limiter.check_unauthenticated().is_ok());
        }
    }
}
