use crate::{auth::auth, models::{ErrorResponse, FolderPresenceResponse}, services::access::Role, state::AppState, ws::{connctx::SessionIdentity, roster::roster_for}};
use axum::{extract::{State, Path, Extension}, http::StatusCode, Json};
use tracing::info;

/// Current roster of a folder
pub async fn folder_presence(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Path(folder_id): Path<String>,
) -> Result<(StatusCode, Json<FolderPresenceResponse>), (StatusCode, Json<ErrorResponse>)> {

    // Ensure the user may at least view the folder
    let _ = auth::ensure_folder_access(state.access.as_ref(), &folder_id, &identity.user_id, Role::Viewer).await?;

    let registry = state.registry();
    let users = roster_for(registry.as_ref(), &folder_id);
    let connections = registry.list_by_folder(&folder_id).len() as u32;
    info!("Presence for folder {} requested by {}: {} users", folder_id, identity.user_id, users.len());

    Ok((
        StatusCode::OK,
        Json(FolderPresenceResponse {
            folder_id,
            users,
            connections,
        }),
    ))
}
