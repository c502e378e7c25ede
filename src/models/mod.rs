pub mod health;
pub mod ready;
pub mod diagnostics;
pub mod presence;
pub mod messages;
pub mod error;

pub use health::*;
pub use ready::*;
pub use diagnostics::*;
pub use presence::*;
pub use messages::*;
pub use error::*;
