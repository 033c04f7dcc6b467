pub mod bookmark;
pub mod session;

pub use bookmark::{Bookmark, BookmarkChanges, NewBookmark};
pub use session::{Session, SessionUser};
