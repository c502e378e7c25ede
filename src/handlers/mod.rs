pub mod health;
pub mod diagnostics;
pub mod folder_presence;

pub use health::*;
pub use diagnostics::*;
pub use folder_presence::*;
