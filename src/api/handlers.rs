use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use serde_json::{Value, json};

use crate::domain::{ExecutionResult, Route};
use crate::error::RoutebookError;
use crate::executor::CancelSignal;
use crate::service::BundleCreated;
use crate::tools::ToolSourceConfig;

use super::AppState;
use super::error::ApiError;
use super::types::*;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn handle_create_bundle(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateBundleRequest>, JsonRejection>,
) -> ApiResult<BundleCreated> {
    let Json(req) = payload?;
    let created = state
        .bundles
        .create_bundle(&req.project_id, &req.tool_source_ids, &req.description)
        .await?;
    Ok(Json(created))
}

/// Runs the execution on its own task; if the client goes away the handler
/// future is dropped, which drops the cancel handle and stops further steps.
pub async fn handle_execute(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<ExecutionResult> {
    let Json(req) = payload?;
    let (cancel, signal) = CancelSignal::pair();

    let service = state.executions.clone();
    let task = tokio::spawn(async move { service.execute(&req.bundle_id, &req.request, &signal).await });

    let outcome = task
        .await
        .map_err(|e| RoutebookError::Internal(format!("execution task failed: {}", e)))?;
    drop(cancel);
    Ok(Json(outcome?))
}

pub async fn handle_list_bundles(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListBundlesQuery>, QueryRejection>,
) -> ApiResult<ListBundlesResponse> {
    let Query(query) = query?;
    let bundles = state.bundles.list_bundles(&query.project_id).await?;
    Ok(Json(ListBundlesResponse { bundles }))
}

pub async fn handle_get_bundle(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<BundleDetail> {
    let (bundle, routes) = state.bundles.get_bundle_with_routes(&id).await?;
    Ok(Json(BundleDetail { bundle, routes }))
}

pub async fn handle_list_routes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ListRoutesResponse> {
    let routes = state.bundles.list_routes(&id).await?;
    Ok(Json(ListRoutesResponse { bundle_id: id, routes }))
}

pub async fn handle_get_route(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Route> {
    Ok(Json(state.bundles.get_route(&id).await?))
}

pub async fn handle_register_tool_source(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ToolSourceConfig>, JsonRejection>,
) -> ApiResult<ToolSourceConfig> {
    let Json(config) = payload?;
    state.bundles.register_tool_source(&config).await?;
    Ok(Json(config))
}
