/// Authentication endpoints
use crate::{
    account::{
        AuthResponse, CreateAdminRequest, LoginRequest, MessageResponse, RegisterRequest, Tokens,
    },
    api::AppJson,
    auth::{AdminBootstrap, AuthContext, Operation, RefreshAuthContext},
    context::AppContext,
    error::AppResult,
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

/// Build authentication routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/admin", post(create_admin))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
}

/// Register a farmer account
async fn register(
    State(ctx): State<AppContext>,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = ctx.account_manager.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Log in with email and password
async fn login(
    State(ctx): State<AppContext>,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let response = ctx.account_manager.login(req).await?;
    Ok(Json(response))
}

/// Create an admin account
async fn create_admin(
    State(ctx): State<AppContext>,
    guard: AdminBootstrap,
    AppJson(req): AppJson<CreateAdminRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    if let AdminBootstrap::Admin(claims) = &guard {
        tracing::info!(created_by = %claims.sub, "admin creating admin account");
    }

    let response = ctx.account_manager.create_admin(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Invalidate the caller's refresh token
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<MessageResponse>> {
    auth.require(Operation::Logout)?;

    let response = ctx.account_manager.logout(auth.account_id()).await?;
    Ok(Json(response))
}

/// Rotate the token pair using the refresh token in the Authorization header
async fn refresh(
    State(ctx): State<AppContext>,
    auth: RefreshAuthContext,
) -> AppResult<Json<Tokens>> {
    let tokens = ctx
        .account_manager
        .refresh_tokens(&auth.claims.sub, &auth.refresh_token)
        .await?;
    Ok(Json(tokens))
}
