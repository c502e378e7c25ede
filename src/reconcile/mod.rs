//! Client side of the folder protocol: one socket per open folder view,
//! roster replacement, refetch-on-signal and rejoin after reconnect.

pub mod session;
pub mod state;

pub use session::{backoff_delay, ClientConfig, CollabClient, ConnectionState};
pub use state::{FolderView, Refetch, SyncStatus};
