/// HTTP server setup and routing
use crate::{
    api::middleware::{portal_gate, track_metrics},
    context::AppContext,
    error::{PortalError, PortalResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(crate::api::routes())
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        // Keep each role inside its own portal
        .layer(middleware::from_fn_with_state(ctx.clone(), portal_gate))
        .layer(middleware::from_fn(track_metrics))
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> PortalResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Estate Portal listening on {}", addr);
    info!("   Public URL: {}", ctx.config.service.base_url);
    info!("   Payment callback: {}", ctx.config.payments.callback_url);

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PortalError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| PortalError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::{Profile, Role},
        test_support::{
            seed_payment_settings, seed_profile, seed_property, seed_unit, station_guard,
            FakeProvider,
        },
    };
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn token_for(ctx: &AppContext, profile: &Profile) -> String {
        ctx.account_manager.create_session(profile).await.unwrap().token
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let ctx = AppContext::for_tests().await;

        let (status, body) = send(
            build_router(ctx.clone()),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(
            build_router(ctx),
            Request::get("/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_portal_redirects() {
        let ctx = AppContext::for_tests().await;
        let tenant = seed_profile(&ctx.db, "t@example.com", Role::Tenant).await;
        let token = token_for(&ctx, &tenant).await;

        let response = build_router(ctx.clone())
            .oneshot(Request::get("/tenant/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers()["location"],
            "/login?redirect=%2Ftenant%2Fdashboard"
        );

        let response = build_router(ctx.clone())
            .oneshot(
                Request::get("/landlord/dashboard")
                    .header("cookie", format!("portal_session={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_redirection());
        assert_eq!(response.headers()["location"], "/tenant/dashboard");

        let (status, body) = send(
            build_router(ctx),
            Request::get("/tenant/dashboard")
                .header("cookie", format!("portal_session={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["email"], "t@example.com");
        assert!(body["unit"].is_null());
    }

    #[tokio::test]
    async fn test_signup_login_and_me() {
        let ctx = AppContext::for_tests().await;

        let (status, body) = send(
            build_router(ctx.clone()),
            post_json(
                "/api/auth/signup",
                None,
                json!({
                    "email": "owner@example.com",
                    "password": "correct horse",
                    "fullName": "Olive Owner"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["profile"]["role"], "landlord");
        assert_eq!(body["redirectTo"], "/landlord/dashboard");

        let response = build_router(ctx.clone())
            .oneshot(post_json(
                "/api/auth/login",
                None,
                json!({"email": "owner@example.com", "password": "correct horse"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
        assert!(cookie.starts_with("portal_session="));
        let cookie_pair = cookie.split(';').next().unwrap().to_string();

        let (status, body) = send(
            build_router(ctx),
            Request::get("/api/auth/me")
                .header("cookie", cookie_pair)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fullName"], "Olive Owner");
        assert!(body.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_expired_pass_verifies_invalid_over_http() {
        let ctx = AppContext::for_tests().await;
        let landlord = seed_profile(&ctx.db, "ll@example.com", Role::Landlord).await;
        let tenant = seed_profile(&ctx.db, "t@example.com", Role::Tenant).await;
        let mut guard = seed_profile(&ctx.db, "g@example.com", Role::Guard).await;
        let property = seed_property(&ctx.db, &landlord.id, "Palm Villas").await;
        seed_unit(&ctx.db, &property.id, "A1", Some(&tenant.id)).await;
        station_guard(&ctx.db, &mut guard, &property.id).await;

        let tenant_token = token_for(&ctx, &tenant).await;
        let guard_token = token_for(&ctx, &guard).await;

        let (status, pass) = send(
            build_router(ctx.clone()),
            post_json(
                "/api/passes",
                Some(&tenant_token),
                json!({
                    "visitorName": "Vera Visitor",
                    "propertyId": property.id,
                    "validUntil": Utc::now() - Duration::seconds(1),
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = pass["accessCode"].as_str().unwrap().to_string();
        assert_eq!(code.len(), 6);

        let (status, body) = send(
            build_router(ctx.clone()),
            post_json(
                "/api/passes/verify",
                Some(&guard_token),
                json!({ "accessCode": code.to_lowercase() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
        assert_eq!(body["pass"]["status"], "expired");

        let stored = ctx.gate_pass_manager.find_by_code(&code).await.unwrap();
        assert_eq!(stored.status.as_str(), "expired");

        // Tenants cannot operate the gate
        let (status, _) = send(
            build_router(ctx),
            post_json(
                "/api/passes/checkin",
                Some(&tenant_token),
                json!({ "accessCode": code }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        let ctx = AppContext::for_tests().await;
        let tenant = seed_profile(&ctx.db, "t@example.com", Role::Tenant).await;
        let guard = seed_profile(&ctx.db, "g@example.com", Role::Guard).await;
        let tenant_token = token_for(&ctx, &tenant).await;
        let guard_token = token_for(&ctx, &guard).await;

        let (status, body) = send(
            build_router(ctx.clone()),
            post_json(
                "/api/passes",
                Some(&tenant_token),
                json!({
                    "visitorName": "Vera Visitor",
                    "propertyId": "p-1",
                    "validUntil": "tomorrow",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidRequest");
        assert!(body["message"].as_str().unwrap().contains("validUntil"));

        let (status, body) = send(
            build_router(ctx.clone()),
            post_json("/api/passes/verify", Some(&guard_token), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidRequest");
        assert!(body["message"].as_str().unwrap().contains("accessCode"));

        let broken = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{\"email\": "))
            .unwrap();
        let (status, body) = send(build_router(ctx.clone()), broken).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidRequest");

        let untyped = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(build_router(ctx), untyped).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidRequest");
    }

    #[tokio::test]
    async fn test_unknown_callback_is_acknowledged() {
        let ctx = AppContext::for_tests().await;

        let (status, body) = send(
            build_router(ctx.clone()),
            post_json(
                "/api/payments/callback",
                None,
                json!({"Body": {"stkCallback": {
                    "MerchantRequestID": "mr-1",
                    "CheckoutRequestID": "ws_CO_unknown",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user"
                }}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ResultCode": 0, "ResultDesc": "Accepted"}));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_transactions")
            .fetch_one(&ctx.db)
            .await
            .unwrap();
        assert_eq!(count, 0);

        // Garbage is acknowledged too
        let response = build_router(ctx)
            .oneshot(
                Request::post("/api/payments/callback")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_provider_failure_returns_500_and_records_failure() {
        let ctx = AppContext::with_provider(Arc::new(FakeProvider::failing(
            "Invalid Access Token",
        )))
        .await;
        let landlord = seed_profile(&ctx.db, "ll@example.com", Role::Landlord).await;
        let tenant = seed_profile(&ctx.db, "t@example.com", Role::Tenant).await;
        let property = seed_property(&ctx.db, &landlord.id, "Palm Villas").await;
        let unit = seed_unit(&ctx.db, &property.id, "A1", Some(&tenant.id)).await;
        seed_payment_settings(&ctx.db, &property.id, true).await;
        let token = token_for(&ctx, &tenant).await;

        let (status, body) = send(
            build_router(ctx.clone()),
            post_json(
                "/api/payments/initiate",
                Some(&token),
                json!({"unitId": unit.id, "amount": 15000, "phone": "0712345678"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "PaymentProviderError");

        let (status, error): (String, Option<String>) = sqlx::query_as(
            "SELECT status, error_message FROM payment_transactions WHERE tenant_id = ?1",
        )
        .bind(&tenant.id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
        assert_eq!(status, "failed");
        assert!(error.unwrap().contains("Invalid Access Token"));
    }

    #[tokio::test]
    async fn test_landlord_dashboard_counts() {
        let ctx = AppContext::for_tests().await;
        let landlord = seed_profile(&ctx.db, "ll@example.com", Role::Landlord).await;
        let tenant = seed_profile(&ctx.db, "t@example.com", Role::Tenant).await;
        let property = seed_property(&ctx.db, &landlord.id, "Palm Villas").await;
        seed_unit(&ctx.db, &property.id, "A1", Some(&tenant.id)).await;
        seed_unit(&ctx.db, &property.id, "A2", None).await;
        let token = token_for(&ctx, &landlord).await;

        let (status, body) = send(
            build_router(ctx),
            Request::get("/landlord/dashboard")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["propertyCount"], 1);
        assert_eq!(body["unitCount"], 2);
        assert_eq!(body["occupiedUnits"], 1);
        assert_eq!(body["vacantUnits"], 1);
        assert_eq!(body["monthlyRentRoll"], 15000);
    }
}
