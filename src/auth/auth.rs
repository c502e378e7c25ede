use axum::{http::StatusCode, Json};
use crate::models::ErrorResponse;
use crate::services::access::{AccessChecker, Role};

const ADMIN_ROLE: &str = "admin";

pub fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error: error.into(),
    }))
}

pub fn is_admin(roles: &[String]) -> bool {
    roles.iter().any(|r| r == ADMIN_ROLE)
}

pub fn ensure_admin(roles: &[String]) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(roles) {
        return Ok(());
    }
    Err(error_response(StatusCode::FORBIDDEN, "Admin access required"))
}

/// Ensure the user holds at least `role` on the folder, returning the role granted.
pub async fn ensure_folder_access(access: &dyn AccessChecker, folder_id: &str, user_id: &str, role: Role) -> Result<Role, (StatusCode, Json<ErrorResponse>)> {
    match access.check_access(folder_id, user_id, role).await {
        Ok(decision) if decision.allowed => Ok(decision.role.unwrap_or(role)),
        Ok(_) => Err(error_response(StatusCode::FORBIDDEN, format!("Access to folder '{}' denied", folder_id))),
        Err(e) => Err(error_response(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}
