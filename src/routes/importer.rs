//! Administrative endpoints for launching and supervising imports.

use crate::config::ImporterConfig;
use crate::error::ApiError;
use crate::importer::{
    DefaultImporterExecutor, DefaultImporterService, ImportReport, ImporterExecutor,
};
use rocket::{State, get, post, serde::json::Json};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request body describing one import.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImportRequest {
    /// Source path handed to the configured source node kind.
    #[serde(rename = "inputPath")]
    pub input_path: Option<String>,
    /// Repository path receiving the imported tree, `/` when omitted.
    #[serde(rename = "targetPath")]
    pub target_path: Option<String>,
    /// Document type for leaves, for this import only.
    #[serde(rename = "leafType")]
    pub leaf_type: Option<String>,
    /// Document type for folders, for this import only.
    #[serde(rename = "folderishType")]
    pub folderish_type: Option<String>,
    /// Import the source root's children directly under the target.
    #[serde(rename = "skipRootContainerCreation", default)]
    pub skip_root_container_creation: bool,
    #[serde(rename = "batchSize")]
    pub batch_size: Option<usize>,
    #[serde(rename = "nbThreads")]
    pub nb_threads: Option<usize>,
    /// Wait for the import to finish before responding.
    #[serde(default)]
    pub interactive: bool,
    /// Transaction timeout in seconds; updates the service setting.
    #[serde(rename = "transactionTimeout")]
    pub transaction_timeout: Option<u32>,
}

/// Simple message wrapper for acknowledgement responses.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImporterStatusResponse {
    /// `Running` or `Not Running`.
    pub status: String,
    pub running: bool,
    #[serde(rename = "lastReport")]
    pub last_report: Option<ImportReport>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunningResponse {
    pub running: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImporterLogResponse {
    pub active: bool,
    /// Buffered lines, oldest first.
    pub lines: Vec<String>,
}

/// Start an import with the configured source and factory kinds.
#[openapi(tag = "Importer")]
#[post("/importer/run", data = "<request>")]
pub async fn run_import(
    request: Json<ImportRequest>,
    service: &State<Arc<DefaultImporterService>>,
    executor: &State<Arc<DefaultImporterExecutor>>,
    config: &State<ImporterConfig>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = request.into_inner();
    let input_path = request
        .input_path
        .filter(|path| !path.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("inputPath is required".to_string()))?;
    let target_path = request.target_path.unwrap_or_else(|| "/".to_string());

    if let Some(timeout) = request.transaction_timeout {
        service.set_transaction_timeout(timeout);
    }

    let executor: &DefaultImporterExecutor = executor.inner();
    let message = service
        .import_with_types(
            executor,
            request.leaf_type.as_deref(),
            request.folderish_type.as_deref(),
            &target_path,
            &input_path,
            request.skip_root_container_creation,
            request.batch_size.unwrap_or(config.batch_size),
            request.nb_threads.unwrap_or(config.nb_threads),
            request.interactive,
        )
        .await?;

    Ok(Json(MessageResponse { message }))
}

#[openapi(tag = "Importer")]
#[get("/importer/status")]
pub fn importer_status(executor: &State<Arc<DefaultImporterExecutor>>) -> Json<ImporterStatusResponse> {
    Json(ImporterStatusResponse {
        status: executor.status(),
        running: executor.is_running(),
        last_report: executor.last_report(),
        last_error: executor.execution().last_error(),
    })
}

#[openapi(tag = "Importer")]
#[get("/importer/running")]
pub fn importer_running(executor: &State<Arc<DefaultImporterExecutor>>) -> Json<RunningResponse> {
    Json(RunningResponse {
        running: executor.is_running(),
    })
}

#[openapi(tag = "Importer")]
#[get("/importer/log")]
pub fn importer_log(executor: &State<Arc<DefaultImporterExecutor>>) -> Json<ImporterLogResponse> {
    let logger = executor.logger();
    let buffer = logger.logger_buffer("\n");

    Json(ImporterLogResponse {
        active: logger.is_buffer_active(),
        lines: buffer.lines().map(str::to_string).collect(),
    })
}

#[openapi(tag = "Importer")]
#[post("/importer/log/activate")]
pub fn activate_importer_log(
    executor: &State<Arc<DefaultImporterExecutor>>,
) -> Json<MessageResponse> {
    executor.logger().set_buffer_active(true);
    Json(MessageResponse {
        message: "Logger activated".to_string(),
    })
}

#[openapi(tag = "Importer")]
#[post("/importer/log/deactivate")]
pub fn deactivate_importer_log(
    executor: &State<Arc<DefaultImporterExecutor>>,
) -> Json<MessageResponse> {
    executor.logger().set_buffer_active(false);
    Json(MessageResponse {
        message: "Logger deactivated".to_string(),
    })
}

/// Cancel the running import, if any.
#[openapi(tag = "Importer")]
#[post("/importer/kill")]
pub fn kill_import(executor: &State<Arc<DefaultImporterExecutor>>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: executor.kill(),
    })
}
