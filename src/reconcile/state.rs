use crate::models::{CollaborationMessage, MessageType, RoomAction, RosterUser};
use crate::services::folder_store::{FolderQuestion, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    /// A refetch is in flight; show the "syncing" hint, keep input enabled.
    Syncing,
    /// The last refetch failed. Content is the last known good one.
    Failed(String),
}

/// Ask the folder store for fresh content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refetch {
    pub folder_id: String,
    pub generation: u64,
}

/// Client-side picture of one open folder.
///
/// Rosters from the server replace the local one wholesale. Update signals
/// never carry content; they only schedule a refetch from the store, and
/// fetch results are applied newest-generation-wins so that out-of-order
/// completions cannot roll the view back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderView {
    pub folder_id: String,
    pub roster: Vec<RosterUser>,
    pub questions: Vec<FolderQuestion>,
    pub sync: SyncStatus,
    pub loaded: bool,
    pub server_error: Option<String>,
    pub remote_updates: u64,
    requested: u64,
    applied: u64,
}

impl FolderView {
    pub fn new(folder_id: impl Into<String>) -> Self {
        Self {
            folder_id: folder_id.into(),
            roster: Vec::new(),
            questions: Vec::new(),
            sync: SyncStatus::Idle,
            loaded: false,
            server_error: None,
            remote_updates: 0,
            requested: 0,
            applied: 0,
        }
    }

    pub fn request_refetch(&mut self) -> Refetch {
        self.requested += 1;
        self.sync = SyncStatus::Syncing;
        Refetch {
            folder_id: self.folder_id.clone(),
            generation: self.requested,
        }
    }

    /// Fold one server message into the view. `own_user_id` lets the view
    /// tell its own arrivals from other people's.
    pub fn on_message(&mut self, msg: &CollaborationMessage, own_user_id: &str) -> Option<Refetch> {
        if msg.kind == MessageType::Error {
            self.server_error = msg.data.as_ref().and_then(|d| d.error.clone());
            return None;
        }
        if msg.folder_id != self.folder_id {
            return None;
        }

        if let Some(users) = msg.roster() {
            self.roster = users.to_vec();
            // Someone arriving may have changed the folder while offline
            if msg.action() == Some(RoomAction::Joined) && msg.user_id != own_user_id {
                return Some(self.request_refetch());
            }
            return None;
        }

        match msg.kind {
            MessageType::Update => {
                self.remote_updates += 1;
                Some(self.request_refetch())
            }
            _ => None,
        }
    }

    /// Apply a finished fetch. Returns true when the content changed hands.
    pub fn on_fetch_result(&mut self, generation: u64, result: Result<Vec<FolderQuestion>, StoreError>) -> bool {
        let latest = generation >= self.requested;
        match result {
            Ok(questions) => {
                if generation <= self.applied {
                    return false;
                }
                self.questions = questions;
                self.applied = generation;
                self.loaded = true;
                if latest {
                    self.sync = SyncStatus::Idle;
                }
                true
            }
            Err(e) => {
                if latest {
                    self.sync = SyncStatus::Failed(e.to_string());
                }
                false
            }
        }
    }

    pub fn retry(&mut self) -> Refetch {
        self.request_refetch()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync == SyncStatus::Syncing
    }
}
