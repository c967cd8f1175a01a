/// Signup, login, logout and profile endpoints
use crate::{
    account::{LoginRequest, Profile, SessionResponse, SignupRequest, UpdateProfileRequest},
    api::{extract::ApiJson, middleware::SESSION_COOKIE},
    auth::AuthContext,
    context::AppContext,
    error::PortalResult,
    metrics,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me).put(update_me))
}

/// Browser session cookie; the token's own expiry bounds its lifetime
fn session_cookie(ctx: &AppContext, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(ctx.config.authentication.secure_cookies)
        .same_site(SameSite::Lax)
        .build()
}

/// Create a profile and log it in
///
/// Without `inviteToken` the new profile is a landlord.
async fn signup(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    ApiJson(req): ApiJson<SignupRequest>,
) -> PortalResult<(StatusCode, CookieJar, Json<SessionResponse>)> {
    req.validate()?;

    let invitation = match req.invite_token.as_deref() {
        Some(token) => Some(ctx.invitation_manager.find_usable(token).await?),
        None => None,
    };

    let profile = ctx.account_manager.signup(req, invitation).await?;
    metrics::record_signup(profile.role.as_str());

    let session = ctx.account_manager.create_session(&profile).await?;
    let jar = jar.add(session_cookie(&ctx, session.token.clone()));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SessionResponse {
            access_token: session.token,
            expires_at: session.expires_at,
            redirect_to: profile.role.dashboard_path(),
            profile,
        }),
    ))
}

async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> PortalResult<(CookieJar, Json<SessionResponse>)> {
    let (profile, session) = ctx.account_manager.login(&req.email, &req.password).await?;
    tracing::info!(profile_id = %profile.id, "login");

    let jar = jar.add(session_cookie(&ctx, session.token.clone()));

    Ok((
        jar,
        Json(SessionResponse {
            access_token: session.token,
            expires_at: session.expires_at,
            redirect_to: profile.role.dashboard_path(),
            profile,
        }),
    ))
}

async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    jar: CookieJar,
) -> PortalResult<(CookieJar, StatusCode)> {
    ctx.account_manager
        .delete_session(&auth.session.session_id)
        .await?;

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

async fn me(auth: AuthContext) -> Json<Profile> {
    Json(auth.profile)
}

async fn update_me(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> PortalResult<Json<Profile>> {
    req.validate()?;
    let profile = ctx.account_manager.update_profile(&auth.profile.id, req).await?;
    Ok(Json(profile))
}
