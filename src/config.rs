// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Launcher configuration
//!
//! ```toml
//! font_size = 14
//! icon_size = "64x64"
//!
//! [[program]]
//! name = "browser"
//! path = "/usr/bin/firefox"
//! args = ["--kiosk", "https://example.com"]
//! autostart = true
//! resolution = "1280x720"
//!
//! [[module]]
//! name = "network"
//! path = "/usr/lib/kiosklaunch/libnetwork.so"
//! config = "/etc/kiosklaunch/network.conf"
//! ```
//!
//! A `[[module]]` path names an applet compiled into the binary through
//! [`Registry`](crate::applet::Registry), shared objects are never loaded. Program names and
//! the config path are sent verbatim over the control socket, so they may not contain `::` or
//! line breaks.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::control::DELIMITER;
use crate::resolution::Resolution;
use crate::Error;

pub const DEFAULT_FONT_SIZE: u32 = 12;
pub const DEFAULT_ICON_SIZE: Resolution = Resolution {
    width: 48,
    height: 48,
};
pub const SOCKET_NAME: &str = "control.sock";

/// An externally launchable program
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramSpec {
    /// Unique, used as the lookup key from the control socket
    pub name: String,
    #[serde(rename = "path")]
    pub executable_path: PathBuf,
    #[serde(default, rename = "args")]
    pub argv: Vec<String>,
    #[serde(default)]
    pub autostart: bool,
    /// Display mode wanted while this program runs
    #[serde(default, rename = "resolution")]
    pub target_resolution: Option<Resolution>,
}

impl ProgramSpec {
    pub fn new(name: impl Into<String>, executable_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable_path: executable_path.into(),
            argv: Vec::new(),
            autostart: false,
            target_resolution: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.target_resolution = Some(resolution);
        self
    }
}

/// A panel applet to load
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub name: String,
    /// Registry name, or the path of the shared object it was historically built as
    #[serde(rename = "path")]
    pub module_path: String,
    #[serde(default, rename = "config")]
    pub module_config_path: Option<PathBuf>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, module_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_path: module_path.into(),
            module_config_path: None,
        }
    }

    pub fn config(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_config_path = Some(path.into());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    font_size: Option<u32>,
    cache_dir: Option<PathBuf>,
    socket: Option<PathBuf>,
    icon_size: Option<Resolution>,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    terminate_on_exit: Option<bool>,
    #[serde(default, rename = "program")]
    programs: Vec<ProgramSpec>,
    #[serde(default, rename = "module")]
    modules: Vec<ModuleSpec>,
}

/// Everything the launcher reads at startup
#[derive(Clone, Debug)]
pub struct Config {
    /// Absolute path this configuration was read from
    pub conf_path: PathBuf,
    pub font_size: u32,
    pub cache_dir: PathBuf,
    pub socket: PathBuf,
    pub icon_size: Resolution,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub terminate_on_exit: bool,
    pub programs: Vec<ProgramSpec>,
    pub modules: Vec<ModuleSpec>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let conf_path = fs::canonicalize(path)
            .map_err(|e| format!("could not open config {}: {}", path.display(), e))?;
        let text = fs::read_to_string(&conf_path)?;

        Self::from_str_at(&text, conf_path)
    }

    /// Parses configuration text, `conf_path` is reported verbatim by `showconfpath`
    pub fn from_str_at(text: &str, conf_path: PathBuf) -> Result<Self, Error> {
        let raw: RawConfig = toml::from_str(text)?;
        check_token("config path", &conf_path.to_string_lossy())?;
        validate_programs(&raw.programs)?;
        validate_modules(&raw.modules)?;

        let cache_dir = raw.cache_dir.unwrap_or_else(default_cache_dir);
        let socket = raw.socket.unwrap_or_else(|| cache_dir.join(SOCKET_NAME));

        Ok(Self {
            conf_path,
            font_size: raw.font_size.unwrap_or(DEFAULT_FONT_SIZE),
            cache_dir,
            socket,
            icon_size: raw.icon_size.unwrap_or(DEFAULT_ICON_SIZE),
            poll_interval: Duration::from_millis(raw.poll_interval_ms.unwrap_or(1000)),
            request_timeout: Duration::from_millis(raw.request_timeout_ms.unwrap_or(5000)),
            terminate_on_exit: raw.terminate_on_exit.unwrap_or(true),
            programs: raw.programs,
            modules: raw.modules,
        })
    }
}

/// Values written verbatim into control responses must not break the line framing
fn check_token(what: &str, value: &str) -> Result<(), Error> {
    if value.contains(DELIMITER) || value.contains(|c: char| c == '\n' || c == '\r') {
        return Err(Error::from(format!(
            "{} {:?} must not contain {:?} or line breaks",
            what, value, DELIMITER
        )));
    }

    Ok(())
}

fn validate_programs(programs: &[ProgramSpec]) -> Result<(), Error> {
    let mut seen = HashSet::new();

    for program in programs {
        if program.name.is_empty() {
            return Err(Error::from("program name must not be empty"));
        }
        check_token("program name", &program.name)?;
        // `general` addresses the default resolution in `updateres`
        if program.name == crate::procs::GENERAL {
            return Err(Error::from(format!(
                "program name {:?} is reserved",
                crate::procs::GENERAL
            )));
        }
        if !seen.insert(program.name.as_str()) {
            return Err(Error::from(format!(
                "duplicate program name: {}",
                program.name
            )));
        }
    }

    Ok(())
}

// ui requests are routed to applets by name
fn validate_modules(modules: &[ModuleSpec]) -> Result<(), Error> {
    let mut seen = HashSet::new();

    for module in modules {
        if module.name.is_empty() {
            return Err(Error::from("module name must not be empty"));
        }
        if !seen.insert(module.name.as_str()) {
            return Err(Error::from(format!("duplicate module name: {}", module.name)));
        }
    }

    Ok(())
}

/// `$XDG_CACHE_HOME/kiosklaunch`, falling back to `$HOME/.cache` and then `/tmp`
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join(env!("CARGO_PKG_NAME"))
}
