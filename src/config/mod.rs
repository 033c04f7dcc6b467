// Re-exports so callers can "use crate::config::*".
pub mod backend;
pub mod logging;
pub mod realtime;
pub mod types;

pub use backend::*;
pub use logging::*;
pub use realtime::*;
pub use types::*;
