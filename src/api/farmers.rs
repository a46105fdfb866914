/// Farmer registry endpoints
use crate::{
    account::User,
    api::AppJson,
    auth::{authorize_owner, AuthContext, Operation},
    context::AppContext,
    error::{AppError, AppResult},
    farmers::{FarmerStatus, UpdateStatusRequest},
};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

/// Build farmer routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/farmers", get(list_farmers))
        .route("/farmers/me", get(my_profile))
        .route(
            "/farmers/:id/status",
            get(farmer_status).patch(update_farmer_status),
        )
}

/// List every farmer (admin only)
async fn list_farmers(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<Vec<User>>> {
    auth.require(Operation::ListFarmers)?;

    let farmers = ctx.farmer_manager.list_farmers().await?;
    Ok(Json(farmers))
}

/// Current profile of the caller, read fresh from the store
async fn my_profile(State(ctx): State<AppContext>, auth: AuthContext) -> AppResult<Json<User>> {
    auth.require(Operation::GetMyProfile)?;

    let profile = ctx.farmer_manager.get_profile(auth.account_id()).await?;
    Ok(Json(profile))
}

/// Certification status of a farmer; non-admins may only ask about themselves
async fn farmer_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<FarmerStatus>> {
    auth.require(Operation::GetFarmerStatus)?;
    authorize_owner(&auth.claims, &id)?;
    parse_farmer_id(&id)?;

    let status = ctx.farmer_manager.get_status(&id).await?;
    Ok(Json(status))
}

/// Set a farmer's certification status (admin only).
///
/// The body is checked after the role, so non-admins get 403 whatever they send.
async fn update_farmer_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    payload: AppResult<AppJson<UpdateStatusRequest>>,
) -> AppResult<Json<User>> {
    auth.require(Operation::UpdateFarmerStatus)?;
    parse_farmer_id(&id)?;
    let AppJson(req) = payload?;

    let farmer = ctx.farmer_manager.update_status(&id, req.status).await?;
    Ok(Json(farmer))
}

fn parse_farmer_id(id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::Validation(format!("Invalid farmer id: {}", id)))
}
