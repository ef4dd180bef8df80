use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::{extract::ApiJson, models::User, store::Store, AppError, AppResult, AppState};

use super::{password, random_alias, validate_password, validate_username, TokenSigner};

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(store): State<Store>,
    State(tokens): State<TokenSigner>,
    ApiJson(RegisterRequest { username, password, display_name }): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let username = username.trim().to_owned();
    validate_username(&username)?;
    validate_password(&password)?;

    let display_name = match display_name.map(|name| name.trim().to_owned()) {
        Some(name) if !name.is_empty() => name,
        _ => random_alias(),
    };

    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password)).await??;
    let user = store.create_user(&username, &display_name, &password_hash).await?;
    let token = tokens.issue(&user)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(store): State<Store>,
    State(tokens): State<TokenSigner>,
    ApiJson(LoginRequest { username, password }): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let invalid = || AppError::Auth("invalid credentials".to_owned());

    let Some(credentials) = store.credentials(username.trim()).await? else {
        tokio::task::spawn_blocking(move || password::verify_dummy(&password)).await?;
        return Err(invalid());
    };

    let hash = credentials.password_hash;
    let matches = tokio::task::spawn_blocking(move || password::verify_password(&password, &hash)).await??;
    if !matches {
        tracing::info!(username = %credentials.user.username, "rejected login");
        return Err(invalid());
    }

    let token = tokens.issue(&credentials.user)?;
    tracing::info!(user_id = %credentials.user.id, "welcome @{}", credentials.user.username);
    Ok(Json(AuthResponse { token, user: credentials.user }))
}
