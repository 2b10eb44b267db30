use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use polaris_engine::{Polaris, TransformPage};
use polaris_types::{
    Did, LocationBatch, LocationBatchResult, ObjectView, Oid, Operation, OperationResult,
    TransformBatch, TransformBatchResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{Device, DeviceAuthenticator};
use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub polaris: Polaris,
    pub auth: Arc<dyn DeviceAuthenticator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct TransformQuery {
    #[serde(default)]
    pub since: u64,
    pub batch_size: Option<usize>,
}

fn parse_oid(text: &str) -> ServerResult<Oid> {
    Ok(Oid::from_hex(text)?)
}

fn parse_did(text: &str) -> ServerResult<Did> {
    Ok(Did::from_hex(text)?)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ServerError::BadRequest(e.body_text()))
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

pub async fn get_object(
    State(state): State<AppState>,
    Device(device): Device,
    Path(oid): Path<String>,
) -> ServerResult<Json<ObjectView>> {
    let oid = parse_oid(&oid)?;
    Ok(Json(state.polaris.engine().object(&device, &oid)?))
}

/// Decode the operation by its discriminator, then apply it.
pub async fn apply_operation(
    State(state): State<AppState>,
    Device(device): Device,
    Path(oid): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ServerResult<Json<OperationResult>> {
    let oid = parse_oid(&oid)?;
    let operation = Operation::from_json(body(payload)?)?;
    Ok(Json(state.polaris.engine().apply(&device, &oid, &operation)?))
}

pub async fn get_transforms(
    State(state): State<AppState>,
    Device(device): Device,
    Path(oid): Path<String>,
    query: Result<Query<TransformQuery>, QueryRejection>,
) -> ServerResult<Json<TransformPage>> {
    let oid = parse_oid(&oid)?;
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let log = state.polaris.log();
    let batch_size = query.batch_size.unwrap_or(log.max_batch());
    Ok(Json(log.page(&device, &oid, query.since, batch_size)?))
}

pub async fn list_locations(
    State(state): State<AppState>,
    Device(device): Device,
    Path((oid, version)): Path<(String, u64)>,
) -> ServerResult<Json<Vec<Did>>> {
    let oid = parse_oid(&oid)?;
    Ok(Json(state.polaris.locations().list(&device, &oid, version)?))
}

pub async fn has_location(
    State(state): State<AppState>,
    Device(device): Device,
    Path((oid, version, did)): Path<(String, u64, String)>,
) -> ServerResult<StatusCode> {
    let (oid, did) = (parse_oid(&oid)?, parse_did(&did)?);
    if state.polaris.locations().contains(&device, &oid, version, &did)? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

pub async fn add_location(
    State(state): State<AppState>,
    Device(device): Device,
    Path((oid, version, did)): Path<(String, u64, String)>,
) -> ServerResult<StatusCode> {
    let (oid, did) = (parse_oid(&oid)?, parse_did(&did)?);
    state.polaris.locations().add(&device, &oid, version, &did)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_location(
    State(state): State<AppState>,
    Device(device): Device,
    Path((oid, version, did)): Path<(String, u64, String)>,
) -> ServerResult<StatusCode> {
    let (oid, did) = (parse_oid(&oid)?, parse_did(&did)?);
    state.polaris.locations().remove(&device, &oid, version, &did)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn batch_transforms(
    State(state): State<AppState>,
    Device(device): Device,
    payload: Result<Json<TransformBatch>, JsonRejection>,
) -> ServerResult<Json<TransformBatchResult>> {
    let batch = body(payload)?;
    Ok(Json(state.polaris.batches().apply(&device, &batch)?))
}

pub async fn batch_locations(
    State(state): State<AppState>,
    Device(device): Device,
    payload: Result<Json<LocationBatch>, JsonRejection>,
) -> ServerResult<Json<LocationBatchResult>> {
    let batch = body(payload)?;
    Ok(Json(state.polaris.locations().apply_batch(&device, &batch)?))
}
