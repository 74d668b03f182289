// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Control socket protocol
//!
//! One request per connection. A request is a single line of tokens, each preceded by `::`, the
//! first token being the command name:
//!
//! ```text
//! ::updateres::browser::1280::720
//! ```
//!
//! The server answers with zero or more lines in the same format and closes the connection. A
//! request that cannot be served is answered with `::error::<reason>`.

pub mod client;
mod listener;

pub use listener::{respond, ControlListener, Settings};

use std::fmt;

use crate::resolution::{parse_dimension, Resolution};
use crate::Error;

pub const DELIMITER: &str = "::";
pub const MAX_REQUEST_LEN: usize = 4096;

pub const LIST_PROCESSES: &str = "listprocesses";
pub const SHOW_FONT_SIZE: &str = "showfontsize";
pub const SHOW_CONF_PATH: &str = "showconfpath";
pub const UPDATE_RES: &str = "updateres";
pub const ERROR: &str = "error";

pub use crate::procs::GENERAL;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ListProcesses,
    ShowFontSize,
    ShowConfPath,
    /// `target` is a program name or [`GENERAL`]
    UpdateRes {
        target: String,
        resolution: Resolution,
    },
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, Error> {
        let tokens = decode_line(line)?;
        let (name, args) = tokens
            .split_first()
            .ok_or_else(|| Error::protocol("empty request"))?;

        let command = match name.as_str() {
            LIST_PROCESSES => Self::ListProcesses,
            SHOW_FONT_SIZE => Self::ShowFontSize,
            SHOW_CONF_PATH => Self::ShowConfPath,
            UPDATE_RES => match args {
                [target, width, height] => {
                    let width = parse_dimension(width)
                        .map_err(|e| Error::protocol(format!("bad width: {}", e)))?;
                    let height = parse_dimension(height)
                        .map_err(|e| Error::protocol(format!("bad height: {}", e)))?;
                    return Ok(Self::UpdateRes {
                        target: target.clone(),
                        resolution: Resolution::new(width, height),
                    });
                }
                _ => {
                    return Err(Error::protocol(format!(
                        "{} takes a target, width and height",
                        UPDATE_RES
                    )))
                }
            },
            other => return Err(Error::protocol(format!("unknown command: {}", other))),
        };

        if !args.is_empty() {
            return Err(Error::protocol(format!("{} takes no arguments", name)));
        }

        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListProcesses => LIST_PROCESSES,
            Self::ShowFontSize => SHOW_FONT_SIZE,
            Self::ShowConfPath => SHOW_CONF_PATH,
            Self::UpdateRes { .. } => UPDATE_RES,
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            Self::UpdateRes { target, resolution } => {
                let width = resolution.width.to_string();
                let height = resolution.height.to_string();
                encode_line(&[UPDATE_RES, target.as_str(), width.as_str(), height.as_str()])
            }
            _ => encode_line(&[self.name()]),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_line().trim_end())
    }
}

/// `["a", "b"]` becomes `::a::b\n`
pub fn encode_line<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut line = String::new();
    for token in tokens {
        line.push_str(DELIMITER);
        line.push_str(token.as_ref());
    }
    line.push('\n');
    line
}

/// Splits a line into its tokens, the leading delimiter is required
pub fn decode_line(line: &str) -> Result<Vec<String>, Error> {
    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
    let rest = line
        .strip_prefix(DELIMITER)
        .ok_or_else(|| Error::protocol(format!("line does not start with {:?}", DELIMITER)))?;

    Ok(rest.split(DELIMITER).map(str::to_string).collect())
}

/// The one line answer to a request that failed
pub fn error_line(err: &Error) -> Vec<String> {
    let reason = err
        .to_string()
        .replace(DELIMITER, ":")
        .replace(|c: char| c == '\n' || c == '\r', " ");

    vec![ERROR.to_string(), reason]
}
