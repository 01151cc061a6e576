//! # Protocol Vocabulary
//!
//! Purpose: Define the command names and response lines of the SKVS line
//! protocol so the server and the client agree on one spelling.
//!
//! ## Design Principles
//!
//! 1. **Closed Vocabulary**: Commands and responses are enums; the wire text
//!    lives in exactly one `match` per direction.
//! 2. **Case-Insensitive Commands**: Names are matched ignoring ASCII case.
//! 3. **Context-Sensitive Replies**: A READ reply is a value unless it spells
//!    one of the statuses READ can produce, so decoding takes the command.
//!
//! ## Wire Summary
//!
//! ```text
//! CREATE <key> <value>\n   -> CREATE OK | COLLISION | INTERNAL ERR
//! READ <key>\n             -> <value>   | NOT FOUND | INTERNAL ERR
//! UPDATE <key> <value>\n   -> UPDATE OK | NOT FOUND | INTERNAL ERR
//! DELETE <key>\n           -> DELETE OK | NOT FOUND | INTERNAL ERR
//! anything else            -> INVALID CMD
//! ```

use core::fmt;

use crate::error::{SkvsError, SkvsResult};
use crate::types::LINE_TERMINATOR;

/// Request commands understood by the server.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Create,
    Read,
    Update,
    Delete,
}

impl Command {
    /// All commands in wire order.
    pub const ALL: [Command; 4] = [Command::Create, Command::Read, Command::Update, Command::Delete];

    /// Upper-case wire name.
    pub const fn name(self) -> &'static str {
        match self {
            Command::Create => "CREATE",
            Command::Read => "READ",
            Command::Update => "UPDATE",
            Command::Delete => "DELETE",
        }
    }

    /// Matches a command name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }

    /// True for commands that carry a value token (CREATE and UPDATE).
    pub const fn takes_value(self) -> bool {
        matches!(self, Command::Create | Command::Update)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One response line, without its terminator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    InvalidCmd,
    CreateOk,
    Collision,
    NotFound,
    UpdateOk,
    DeleteOk,
    InternalErr,
    /// The stored value returned by a successful READ. Owned by the receiver.
    Value(String),
}

impl Response {
    /// Text sent on the wire for this response.
    pub fn as_str(&self) -> &str {
        match self {
            Response::InvalidCmd => "INVALID CMD",
            Response::CreateOk => "CREATE OK",
            Response::Collision => "COLLISION",
            Response::NotFound => "NOT FOUND",
            Response::UpdateOk => "UPDATE OK",
            Response::DeleteOk => "DELETE OK",
            Response::InternalErr => "INTERNAL ERR",
            Response::Value(value) => value,
        }
    }

    /// True for `INVALID CMD` and `INTERNAL ERR`.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::InvalidCmd | Response::InternalErr)
    }

    /// Appends the response and its line terminator to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_str().as_bytes());
        out.push(LINE_TERMINATOR);
    }

    /// Decodes a response line (terminator already stripped) that answers
    /// `command`.
    ///
    /// Returns `UnexpectedResponse` if the line is not a reply `command` can
    /// produce.
    pub fn decode(command: Command, line: &str) -> SkvsResult<Self> {
        let status = match line {
            "INVALID CMD" => Some(Response::InvalidCmd),
            "INTERNAL ERR" => Some(Response::InternalErr),
            "NOT FOUND" if command != Command::Create => Some(Response::NotFound),
            "CREATE OK" if command == Command::Create => Some(Response::CreateOk),
            "COLLISION" if command == Command::Create => Some(Response::Collision),
            "UPDATE OK" if command == Command::Update => Some(Response::UpdateOk),
            "DELETE OK" if command == Command::Delete => Some(Response::DeleteOk),
            _ => None,
        };

        match (status, command) {
            (Some(response), _) => Ok(response),
            (None, Command::Read) => Ok(Response::Value(line.to_string())),
            (None, _) => Err(SkvsError::UnexpectedResponse),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_commands_case_insensitively() {
        assert_eq!(Command::from_name("create"), Some(Command::Create));
        assert_eq!(Command::from_name("ReAd"), Some(Command::Read));
        assert_eq!(Command::from_name("DELETE"), Some(Command::Delete));
        assert_eq!(Command::from_name("PUT"), None);
        assert_eq!(Command::from_name(""), None);
    }

    #[test]
    fn only_create_and_update_take_values() {
        assert!(Command::Create.takes_value());
        assert!(Command::Update.takes_value());
        assert!(!Command::Read.takes_value());
        assert!(!Command::Delete.takes_value());
    }

    #[test]
    fn encodes_with_terminator() {
        let mut out = Vec::new();
        Response::CreateOk.encode(&mut out);
        Response::Value("v1".to_string()).encode(&mut out);
        assert_eq!(out, b"CREATE OK\nv1\n");
    }

    #[test]
    fn decodes_in_command_context() {
        assert_eq!(Response::decode(Command::Create, "COLLISION"), Ok(Response::Collision));
        // A stored value may spell a status word that READ never produces.
        assert_eq!(
            Response::decode(Command::Read, "COLLISION"),
            Ok(Response::Value("COLLISION".to_string()))
        );
        assert_eq!(Response::decode(Command::Read, "NOT FOUND"), Ok(Response::NotFound));
        assert_eq!(
            Response::decode(Command::Update, "DELETE OK"),
            Err(SkvsError::UnexpectedResponse)
        );
    }
}
