use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use crate::models::RosterUser;

/// Current roster of a folder room
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderPresenceResponse {
    pub folder_id: String,
    pub users: Vec<RosterUser>,
    pub connections: u32,
}
