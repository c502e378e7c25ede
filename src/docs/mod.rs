use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Current roster of a folder
#[utoipa::path(
    get,
    path = "/api/v1/folders/{folder_id}/presence",
    params(
        ("folder_id" = String, Path, description = "Folder id")
    ),
    responses(
        (status = 200, description = "Users present in the folder", body = FolderPresenceResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "No access to the folder", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn folder_presence_doc() {}

/// Service diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Connection and resource counters", body = DiagnosticsResponse),
        (status = 403, description = "Admin access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        folder_presence_doc,
        diagnostics_doc,
    ),
    components(
        schemas(HealthResponse, ReadyResponse, FolderPresenceResponse, RosterUser, DiagnosticsResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
