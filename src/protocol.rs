//! Protocol commands and reply handling for MycoKV
//!
//! Every command is a single newline-terminated line and is answered by a
//! single line. Command lines are parsed with nom, case-insensitively, so
//! the same parser serves the CLI and anything that needs to read the wire.

use crate::error::{Result, ServerError};
use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{digit1, line_ending, not_line_ending, space0, space1},
    combinator::{all_consuming, map, map_res, opt, verify},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// Commands supported by the MycoKV protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: String },
    /// `value` is already in its encoded wire form
    Put { key: String, value: String },
    Delete { key: String },
    Expire { key: String, ttl_ms: u64 },
    Purge,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Put { .. } => "PUT",
            Command::Delete { .. } => "DELETE",
            Command::Expire { .. } => "EXPIRE",
            Command::Purge => "PURGE",
        }
    }

    /// Serialize the command to its newline-terminated wire line
    pub fn to_line(&self) -> String {
        match self {
            Command::Get { key } => format!("GET {}\n", key),
            Command::Put { key, value } => format!("PUT {} {}\n", key, value),
            Command::Delete { key } => format!("DELETE {}\n", key),
            Command::Expire { key, ttl_ms } => format!("EXPIRE {} {}\n", key, ttl_ms),
            Command::Purge => "PURGE\n".to_string(),
        }
    }
}

/// Strip the line terminator from a response
pub fn trim_line(line: &str) -> &str {
    line.trim_end_matches(|c| c == '\n' || c == '\r')
}

/// Split a response line into its body or the server error it carries
pub fn parse_reply(line: &str) -> std::result::Result<&str, ServerError> {
    let body = trim_line(line);
    match ServerError::classify(body) {
        Some(err) => Err(err),
        None => Ok(body),
    }
}

/// Parse a complete command line
pub fn parse_command(input: &str) -> Result<Command> {
    let (_, command) = command_parser(input)?;
    Ok(command)
}

fn command_parser(input: &str) -> IResult<&str, Command> {
    all_consuming(delimited(
        space0,
        alt((
            get_command,
            put_command,
            delete_command,
            expire_command,
            purge_command,
        )),
        pair(space0, opt(line_ending)),
    ))(input)
}

fn key(input: &str) -> IResult<&str, String> {
    map(take_while1(|c: char| !c.is_whitespace()), str::to_string)(input)
}

/// GET <key>
fn get_command(input: &str) -> IResult<&str, Command> {
    map(preceded(pair(tag_no_case("GET"), space1), key), |key| {
        Command::Get { key }
    })(input)
}

/// PUT <key> <value>, where the value runs to the end of the line
fn put_command(input: &str) -> IResult<&str, Command> {
    map(
        tuple((
            tag_no_case("PUT"),
            space1,
            key,
            space1,
            verify(not_line_ending, |v: &str| !v.trim().is_empty()),
        )),
        |(_, _, key, _, value)| Command::Put {
            key,
            value: value.trim_end().to_string(),
        },
    )(input)
}

/// DELETE <key>
fn delete_command(input: &str) -> IResult<&str, Command> {
    map(preceded(pair(tag_no_case("DELETE"), space1), key), |key| {
        Command::Delete { key }
    })(input)
}

/// EXPIRE <key> <ttl-ms>
fn expire_command(input: &str) -> IResult<&str, Command> {
    map(
        tuple((
            tag_no_case("EXPIRE"),
            space1,
            key,
            space1,
            map_res(digit1, str::parse::<u64>),
        )),
        |(_, _, key, _, ttl_ms)| Command::Expire { key, ttl_ms },
    )(input)
}

/// PURGE
fn purge_command(input: &str) -> IResult<&str, Command> {
    map(tag_no_case("PURGE"), |_| Command::Purge)(input)
}
