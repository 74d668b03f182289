// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("nix error: {0}")]
    NixError(#[from] nix::Error),
    #[error("invalid configuration: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("failed to load module {module}: {reason}")]
    ModuleLoad { module: String, reason: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("resolution error: {0}")]
    Resolution(String),
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub fn spawn(program: impl Into<String>, reason: impl ToString) -> Self {
        Self::from_kind(ErrorKind::Spawn {
            program: program.into(),
            reason: reason.to_string(),
        })
    }

    pub fn module_load(module: impl Into<String>, reason: impl ToString) -> Self {
        Self::from_kind(ErrorKind::ModuleLoad {
            module: module.into(),
            reason: reason.to_string(),
        })
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Protocol(reason.into()))
    }

    pub fn resolution(reason: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Resolution(reason.into()))
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}
