use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A question as it appears in a folder listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderQuestion {
    pub id: String,
    pub position: u32,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("folder '{0}' not found")]
    NotFound(String),
    #[error("store request failed: {0}")]
    Request(String),
    #[error("store rejected the change: {0}")]
    Rejected(String),
}

/// Authoritative folder content. The collaboration layer never writes here
/// itself; clients persist through it and then signal the room.
#[async_trait]
pub trait FolderStore: Send + Sync {
    /// Questions of a folder, in display order.
    async fn fetch_folder_contents(&self, folder_id: &str) -> Result<Vec<FolderQuestion>, StoreError>;

    /// Persist a new order. Returns the number of questions reordered.
    async fn apply_reorder(&self, folder_id: &str, question_ids: &[String]) -> Result<usize, StoreError>;
}
