/// API routes and handlers
pub mod auth;
pub mod farmers;
pub mod health;

use crate::{context::AppContext, error::AppError};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json, Router,
};
use serde::de::DeserializeOwned;

/// Build API routes, mounted under `/api` by the server
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(farmers::routes())
}

/// JSON body extractor whose rejections use the service error format
#[derive(Debug, Clone)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation(rejection.body_text()))?;

        Ok(AppJson(value))
    }
}
