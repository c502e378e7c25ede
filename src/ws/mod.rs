pub mod broadcaster;
pub mod connctx;
pub mod error;
pub mod registry;
pub mod roster;
