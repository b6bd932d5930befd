//! Commands understood by the chat worker on its stdin.

use crate::error::{Error, Result};

/// A typed chat-worker command.
///
/// Renders to the slash-command text the worker reads line by line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Join (and create if needed) a room.
    Join(String),
    /// Make an already joined room the current one.
    Switch(String),
    /// Post text to the current room.
    Text(String),
    /// Direct message another user.
    Dm { to: String, text: String },
    /// Leave a room, or the current one.
    Leave(Option<String>),
    /// Request the member list of a room, or of the current one.
    Who(Option<String>),
    /// Request every room on the server.
    Rooms,
    /// Request the rooms this user has joined.
    MyRooms,
    /// Offer a file to the current room.
    File(String),
    /// Ask the worker to disconnect and exit.
    Exit,
}

impl WorkerCommand {
    /// Render as a single wire line, without the terminator.
    pub fn to_line(&self) -> Result<String> {
        let line = match self {
            Self::Join(room) => format!("/join {}", word(room, "room")?),
            Self::Switch(room) => format!("/switch {}", word(room, "room")?),
            Self::Text(text) => format!("/text {}", text_arg(text)?),
            Self::Dm { to, text } => format!("/dm {} {}", word(to, "user")?, text_arg(text)?),
            Self::Leave(None) => "/leave".to_string(),
            Self::Leave(Some(room)) => format!("/leave {}", word(room, "room")?),
            Self::Who(None) => "/who".to_string(),
            Self::Who(Some(room)) => format!("/who {}", word(room, "room")?),
            Self::Rooms => "/rooms".to_string(),
            Self::MyRooms => "/myrooms".to_string(),
            Self::File(path) => format!("/file {}", text_arg(path)?),
            Self::Exit => "/exit".to_string(),
        };
        Ok(line)
    }
}

/// Arguments the worker splits on spaces must be a single word.
fn word<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(Error::Command(format!("{what} must be a single word: {value:?}")));
    }
    Ok(value)
}

fn text_arg(value: &str) -> Result<&str> {
    if value.contains(['\n', '\r']) {
        return Err(Error::Command("argument contains a line break".to_string()));
    }
    if value.trim().is_empty() {
        return Err(Error::Command("argument is empty".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn renders_slash_commands() {
        assert_eq!(WorkerCommand::Join("General".into()).to_line().unwrap(), "/join General");
        assert_eq!(WorkerCommand::Who(None).to_line().unwrap(), "/who");
        assert_eq!(
            WorkerCommand::Dm {
                to: "bob".into(),
                text: "see you at 5".into()
            }
            .to_line()
            .unwrap(),
            "/dm bob see you at 5"
        );
        assert_eq!(WorkerCommand::Leave(Some("Music".into())).to_line().unwrap(), "/leave Music");
        assert_eq!(WorkerCommand::Exit.to_line().unwrap(), "/exit");
    }

    #[test]
    fn room_names_with_spaces_are_rejected() {
        assert!(matches!(
            WorkerCommand::Join("two words".into()).to_line(),
            Err(Error::Command(_))
        ));
    }

    #[test]
    fn line_breaks_would_split_the_command() {
        assert!(WorkerCommand::Text("hi\n/exit".into()).to_line().is_err());
    }
}
