//! # SKVS Client
//!
//! Blocking client for the SKVS line protocol.
//!
//! ## Design Principles
//!
//! 1. **One Line Out, One Line In**: Every request is answered by exactly one
//!    response line, so a request never needs more than one read.
//! 2. **Command Context**: Replies are decoded against the command that
//!    produced them; a READ value that spells a status word stays a value.
//! 3. **Validate Locally**: Arguments the server would reject as
//!    `INVALID CMD` are refused before anything is sent.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};

use skvs_common::{Command, Response, SkvsError, key_fits};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] SkvsError),

    /// The server closed the connection before answering.
    #[error("connection closed by server")]
    Closed,

    /// A key or value cannot be expressed on the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct Client {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let writer = TcpStream::connect(addr)?;
        writer.set_nodelay(true)?;
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Self { writer, reader })
    }

    /// Sends `line` (without terminator) and returns the response line with
    /// its terminator removed.
    pub fn request(&mut self, line: &str) -> ClientResult<String> {
        if line.contains('\n') {
            return Err(ClientError::InvalidArgument(
                "request must be a single line".to_string(),
            ));
        }

        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        self.writer.write_all(&frame)?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(ClientError::Closed);
        }
        let trimmed = reply.trim_end_matches(['\n', '\r']).len();
        reply.truncate(trimmed);
        Ok(reply)
    }

    pub fn create(&mut self, key: &str, value: &str) -> ClientResult<Response> {
        self.call(Command::Create, key, Some(value))
    }

    pub fn read(&mut self, key: &str) -> ClientResult<Response> {
        self.call(Command::Read, key, None)
    }

    pub fn update(&mut self, key: &str, value: &str) -> ClientResult<Response> {
        self.call(Command::Update, key, Some(value))
    }

    pub fn delete(&mut self, key: &str) -> ClientResult<Response> {
        self.call(Command::Delete, key, None)
    }

    /// Sends the lone terminator that asks the server to hang up, then waits
    /// for it to do so.
    pub fn disconnect(mut self) -> ClientResult<()> {
        self.writer.write_all(b"\n")?;
        let mut rest = Vec::new();
        match io::Read::read_to_end(&mut self.reader, &mut rest) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn call(&mut self, command: Command, key: &str, value: Option<&str>) -> ClientResult<Response> {
        check_token("key", key)?;
        if !key_fits(key) {
            return Err(SkvsError::KeyTooLong.into());
        }

        let line = match value {
            Some(value) => {
                check_token("value", value)?;
                format!("{} {key} {value}", command.name())
            }
            None => format!("{} {key}", command.name()),
        };
        let reply = self.request(&line)?;
        Ok(Response::decode(command, &reply)?)
    }
}

/// Keys and values are single space-free tokens.
fn check_token(what: &str, token: &str) -> ClientResult<()> {
    if token.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{what} is empty")));
    }
    if token.contains([' ', '\n', '\r']) {
        return Err(ClientError::InvalidArgument(format!(
            "{what} '{}' contains whitespace",
            token.escape_debug()
        )));
    }
    Ok(())
}
