pub mod command;
pub mod event_loop;

pub use command::{Command, CommandError, RowRef};
pub use event_loop::{App, Flow};
