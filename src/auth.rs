/// Authentication extractors and role-based authorization
use crate::{
    account::Claims,
    context::AppContext,
    db::Role,
    error::{AppError, AppResult},
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

/// Header carrying the shared secret that allows admin creation without an admin session
pub const BOOTSTRAP_HEADER: &str = "x-bootstrap-token";

const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Protected operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListFarmers,
    UpdateFarmerStatus,
    CreateAdmin,
    GetMyProfile,
    GetFarmerStatus,
    Logout,
}

impl Operation {
    /// Roles allowed to perform the operation; `None` admits any authenticated identity
    pub fn permitted_roles(&self) -> Option<&'static [Role]> {
        match self {
            Operation::ListFarmers | Operation::UpdateFarmerStatus | Operation::CreateAdmin => {
                Some(ADMIN_ONLY)
            }
            Operation::GetMyProfile | Operation::GetFarmerStatus | Operation::Logout => None,
        }
    }
}

/// Allow iff the operation has no role restriction or the caller's role is listed
pub fn authorize(claims: &Claims, operation: Operation) -> AppResult<()> {
    match operation.permitted_roles() {
        Some(roles) if !roles.contains(&claims.role) => {
            tracing::warn!(
                account_id = %claims.sub,
                role = %claims.role,
                ?operation,
                "operation denied for role"
            );
            Err(AppError::Authorization("Insufficient permissions".to_string()))
        }
        _ => Ok(()),
    }
}

/// Non-admins may only touch the record whose id is their own subject.
///
/// Runs before any lookup so the answer does not reveal whether the target exists.
pub fn authorize_owner(claims: &Claims, target_id: &str) -> AppResult<()> {
    if claims.is_admin() || claims.sub == target_id {
        return Ok(());
    }

    tracing::warn!(account_id = %claims.sub, "cross-account access denied");
    Err(AppError::Authorization(
        "You can only view your own status".to_string(),
    ))
}

/// Compare secrets without short-circuiting on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn bearer_token(parts: &mut Parts) -> AppResult<String> {
    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| AppError::Authentication("Missing authorization header".to_string()))?;

    Ok(bearer.token().to_string())
}

/// Authenticated context - validates the access token in the Authorization header
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    pub fn account_id(&self) -> &str {
        &self.claims.sub
    }

    /// Check the role table for `operation`
    pub fn require(&self, operation: Operation) -> AppResult<()> {
        authorize(&self.claims, operation)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).await?;
        let claims = state.account_manager.validate_access_token(&token)?;

        Ok(AuthContext { claims })
    }
}

/// Refresh context - validates a refresh token and keeps it for the hash comparison
#[derive(Debug, Clone)]
pub struct RefreshAuthContext {
    pub claims: Claims,
    pub refresh_token: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for RefreshAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let refresh_token = bearer_token(parts).await?;
        let claims = state
            .account_manager
            .validate_refresh_token(&refresh_token)
            .map_err(|_| AppError::Authentication("Access denied".to_string()))?;

        Ok(RefreshAuthContext {
            claims,
            refresh_token,
        })
    }
}

/// Admin creation guard: bootstrap secret or an admin access token
#[derive(Debug, Clone)]
pub enum AdminBootstrap {
    BootstrapToken,
    Admin(Claims),
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminBootstrap {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        if let Some(presented) = parts.headers.get(BOOTSTRAP_HEADER) {
            let expected = state.config.authentication.bootstrap_token.as_deref();
            return match (expected, presented.to_str().ok()) {
                (Some(expected), Some(presented))
                    if constant_time_eq(expected.as_bytes(), presented.as_bytes()) =>
                {
                    tracing::info!("admin creation authorized by bootstrap token");
                    Ok(AdminBootstrap::BootstrapToken)
                }
                _ => {
                    tracing::warn!("admin creation rejected: bad bootstrap token");
                    Err(AppError::Authorization("Invalid bootstrap token".to_string()))
                }
            };
        }

        let auth = AuthContext::from_request_parts(parts, state).await?;
        auth.require(Operation::CreateAdmin)?;

        Ok(AdminBootstrap::Admin(auth.claims))
    }
}
