//! Read-only views of the repository, mostly to inspect import results.

use crate::error::ApiError;
use crate::importer::DefaultImporterService;
use crate::models::{DataResponse, Document, ROOT_PATH, normalize_path};
use rocket::{State, get, serde::json::Json};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DocumentCountResponse {
    pub count: i64,
}

fn resolve_path(path: Option<String>) -> Result<String, ApiError> {
    let raw = path.unwrap_or_else(|| ROOT_PATH.to_string());
    normalize_path(&raw)
        .ok_or_else(|| ApiError::BadRequest(format!("path must be absolute, got '{raw}'")))
}

/// Fetch the document stored at `path`.
#[openapi(tag = "Documents")]
#[get("/documents?<path>")]
pub async fn get_document(
    path: Option<String>,
    service: &State<Arc<DefaultImporterService>>,
) -> Result<Json<Document>, ApiError> {
    let path = resolve_path(path)?;
    service
        .repository()
        .get_document(&path)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {path}")))
}

/// List the direct children of the document at `path`.
#[openapi(tag = "Documents")]
#[get("/documents/children?<path>")]
pub async fn list_children(
    path: Option<String>,
    service: &State<Arc<DefaultImporterService>>,
) -> Result<Json<DataResponse<Vec<Document>>>, ApiError> {
    let path = resolve_path(path)?;
    let repository = service.repository();

    if repository.get_document(&path).await?.is_none() {
        return Err(ApiError::NotFound(format!("Document not found: {path}")));
    }

    let data = repository.list_children(&path).await?;
    Ok(Json(DataResponse { data }))
}

#[openapi(tag = "Documents")]
#[get("/documents/count")]
pub async fn count_documents(
    service: &State<Arc<DefaultImporterService>>,
) -> Result<Json<DocumentCountResponse>, ApiError> {
    let count = service.repository().count_documents().await?;
    Ok(Json(DocumentCountResponse { count }))
}
