use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body shared by every HTTP handler
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}
