//! Lightweight service health endpoint used for readiness checks and tests.

use crate::importer::{DefaultImporterExecutor, ImporterExecutor};
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Basic response payload describing API health.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    /// Static status string reporting application readiness.
    pub status: String,
    /// Importer executor status, `Running` or `Not Running`.
    pub importer: String,
}

/// Health check endpoint returning a trivial JSON payload.
#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check(executor: &State<Arc<DefaultImporterExecutor>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        importer: executor.status(),
    })
}
