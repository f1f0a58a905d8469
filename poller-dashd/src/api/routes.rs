use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use poller_client::{EngineHandle, SubscriberState};
use serde::{Deserialize, Serialize};
use shared::types::{RegistrySnapshot, ServiceEntry, ServiceId};
use tokio::sync::watch;
use crate::api::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub hash_rx: watch::Receiver<String>,
    pub push_state: watch::Receiver<SubscriberState>,
}

#[derive(Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub url: String,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub id: ServiceId,
    pub name: String,
    pub url: String,
}

#[derive(Serialize)]
pub struct PushStateResponse {
    pub state: SubscriberState,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/services",
            get(get_services).post(create_service).put(update_service),
        )
        .route("/v1/services/hash", get(get_hash))
        .route("/v1/services/:id", get(get_service).delete(delete_service))
        .route("/v1/push/state", get(get_push_state))
        .with_state(state)
}

async fn get_services(State(state): State<AppState>) -> Json<RegistrySnapshot> {
    Json(state.engine.snapshot().as_ref().clone())
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
) -> Result<Json<ServiceEntry>, StatusCode> {
    state
        .engine
        .snapshot()
        .get(id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_service(
    State(state): State<AppState>,
    Json(body): Json<CreateRequest>,
) -> Result<StatusCode, ApiError> {
    state.engine.create_entry(&body.name, &body.url).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_service(
    State(state): State<AppState>,
    Json(body): Json<UpdateRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .update_entry(body.id, &body.name, &body.url)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_entry(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_push_state(State(state): State<AppState>) -> Json<PushStateResponse> {
    Json(PushStateResponse {
        state: *state.push_state.borrow(),
    })
}
