use thiserror::Error;

/// Failures while handling one inbound message. None of these close the
/// socket; the router logs them and, for the rejections a client can act
/// on, replies to the offending connection only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollabError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("unknown connection {0}")]
    UnknownConnection(String),

    #[error("'{0}' requires joining a folder first")]
    NotJoined(&'static str),

    #[error("message targets folder '{got}' but connection is joined to '{joined}'")]
    FolderMismatch { joined: String, got: String },

    #[error("user id '{claimed}' does not match the session")]
    IdentityMismatch { claimed: String },

    #[error("access to folder '{folder_id}' denied")]
    AccessDenied { folder_id: String },

    #[error("access check failed: {0}")]
    AccessCheck(String),
}

impl CollabError {
    /// Whether the sender should get an `error` message back.
    pub fn notify_sender(&self) -> bool {
        matches!(
            self,
            CollabError::NotJoined(_)
                | CollabError::FolderMismatch { .. }
                | CollabError::IdentityMismatch { .. }
                | CollabError::AccessDenied { .. }
                | CollabError::AccessCheck(_)
        )
    }
}
