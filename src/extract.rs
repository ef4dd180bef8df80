//! Extractor wrappers whose rejections are [`AppError`]s, so malformed input
//! goes through the same error stage as everything else.

use axum::{
    extract::{FromRequest, FromRequestParts, WebSocketUpgrade},
    http::request::Parts,
};

use crate::AppError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

pub struct ApiWs(pub WebSocketUpgrade);

impl<S: Send + Sync> FromRequestParts<S> for ApiWs {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(ApiWs(WebSocketUpgrade::from_request_parts(parts, state).await?))
    }
}
