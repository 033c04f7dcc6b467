pub mod reducer;
pub mod view;
pub mod view_model;

pub use reducer::{reduce, Action, BookmarkState, Draft, EditState};
pub use view::View;
pub use view_model::BookmarkViewModel;
