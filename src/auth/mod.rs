pub mod base;
pub mod gotrue_provider;
pub mod local_provider;
pub mod session_manager;

// Re-export so callers can do "use crate::auth::{AuthProvider, SessionManager};"
pub use base::{create_auth_provider, AuthEvent, AuthProvider, SignIn};
pub use session_manager::SessionManager;
