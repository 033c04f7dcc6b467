use std::str::FromStr;

use thiserror::Error;

/// Points at a row either by its 1-based position on screen or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRef {
    Number(usize),
    Id(String),
}

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(Option<String>),
    Callback(String),
    Logout,
    Title(String),
    Url(String),
    Add,
    Edit(RowRef),
    EditTitle(String),
    EditUrl(String),
    Save,
    Cancel,
    Delete(RowRef),
    Show,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty input")]
    Empty,
    #[error("unknown command '{0}' (try: login, callback, logout, title, url, add, edit, edit-title, edit-url, save, cancel, delete, show, quit)")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a row number or #id")]
    InvalidRow(String),
}

fn row_ref(verb: &'static str, arg: &str) -> Result<RowRef, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument(verb));
    }
    if let Some(id) = arg.strip_prefix('#') {
        if id.is_empty() {
            return Err(CommandError::InvalidRow(arg.to_string()));
        }
        return Ok(RowRef::Id(id.to_string()));
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(RowRef::Number(n)),
        _ => Err(CommandError::InvalidRow(arg.to_string())),
    }
}

fn required(verb: &'static str, arg: &str) -> Result<String, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument(verb))
    } else {
        Ok(arg.to_string())
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };
        match verb {
            "" => Err(CommandError::Empty),
            "login" => Ok(Command::Login((!arg.is_empty()).then(|| arg.to_string()))),
            "callback" => required("callback", arg).map(Command::Callback),
            "logout" => Ok(Command::Logout),
            // An empty value clears the field.
            "title" => Ok(Command::Title(arg.to_string())),
            "url" => Ok(Command::Url(arg.to_string())),
            "add" => Ok(Command::Add),
            "edit" => row_ref("edit", arg).map(Command::Edit),
            "edit-title" => Ok(Command::EditTitle(arg.to_string())),
            "edit-url" => Ok(Command::EditUrl(arg.to_string())),
            "save" => Ok(Command::Save),
            "cancel" => Ok(Command::Cancel),
            "delete" => row_ref("delete", arg).map(Command::Delete),
            "show" => Ok(Command::Show),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}
