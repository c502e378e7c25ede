pub mod handler;
pub mod router;
pub mod msg_join_handler;
pub mod msg_leave_handler;
pub mod msg_update_handler;
pub mod msg_relay_handler;
