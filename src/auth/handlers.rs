use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{dto::SignupRequest, jwt::AuthUser, services},
    error::ApiError,
    state::AppState,
    trainees::{Trainee, TraineeUpdate},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/signup", post(signup))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me).put(update_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Trainee>), ApiError> {
    let new = tokio::task::spawn_blocking(move || services::new_trainee_from_signup(payload))
        .await
        .map_err(ApiError::internal)?
        .map_err(|e| {
            warn!(error = %e, "signup rejected");
            e
        })?;

    let user = state.store.create(new).await.map_err(|e| {
        warn!(error = %e, "signup store failed");
        ApiError::from(e)
    })?;

    info!(user_id = %user.id, email = %user.email, "trainee registered");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Trainee>, ApiError> {
    let user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

#[instrument(skip(state, changes))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(changes): Json<TraineeUpdate>,
) -> Result<Json<Trainee>, ApiError> {
    let changes = services::validate_update(changes)?;
    let user = state.store.update(user_id, changes).await?;
    info!(%user_id, "profile updated");
    Ok(Json(user))
}
