pub mod base;
pub mod memory_feed;
pub mod no_feed;
pub mod phoenix;
pub mod supabase_feed;

// Re-export so callers can do "use crate::realtime::{ChangeFeed, Subscription};"
pub use base::{create_change_feed, ChangeEvent, ChangeFeed, ChangeKind, Subscription};
pub use memory_feed::MemoryFeed;
