//! Route handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::api::app::AppState;
use crate::api::error::ApiError;
use crate::application::search_service::XLSX_CONTENT_TYPE;
use crate::application::{DownloadQuery, DownloadRequest, ExportFile, SearchRequest, SearchResponse};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection, "Rejected search body");
        ApiError::bad_request("Datos del producto no proporcionados")
    })?;
    info!(term = request.producto.as_deref().unwrap_or(""), "Search requested");

    let response = state.service.search(request).await?;
    Ok(Json(response))
}

pub async fn download_excel(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection, "Rejected download body");
        ApiError::bad_request("No se proporcionaron datos de productos")
    })?;

    let file = state.service.export_products(request).await?;
    Ok(attachment(file))
}

pub async fn download_stored(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|_| ApiError::bad_request("Falta el parámetro de producto"))?;

    let file = state.service.export_stored(query.producto.as_deref()).await?;
    Ok(attachment(file))
}

fn attachment(file: ExportFile) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    (
        [(CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()), (CONTENT_DISPOSITION, disposition)],
        file.bytes,
    )
        .into_response()
}
