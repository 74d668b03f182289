// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Display resolution types and the switching interface

mod xrandr;

pub use xrandr::Xrandr;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Error;

/// A requested display size, `WIDTHxHEIGHT`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(|| Error::resolution(format!("expected WIDTHxHEIGHT, got {:?}", s)))?;

        let width = parse_dimension(width)?;
        let height = parse_dimension(height)?;
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Resolution> for String {
    fn from(res: Resolution) -> Self {
        res.to_string()
    }
}

/// Parses one side of a resolution, zero is not a valid size
pub fn parse_dimension(s: &str) -> Result<u32, Error> {
    match s.trim().parse::<u32>() {
        Ok(0) => Err(Error::resolution("dimension must be non-zero")),
        Ok(v) => Ok(v),
        Err(e) => Err(Error::resolution(format!("bad dimension {:?}: {}", s, e))),
    }
}

/// A display mode as reported by the display server
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mode {
    pub width: u32,
    pub height: u32,
    /// refresh rate in Hz
    pub refresh: f32,
}

impl Mode {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{:.2}", self.width, self.height, self.refresh)
    }
}

/// Select the closest available mode to the request
///
/// Distance is measured between the sums of width and height. Ties are broken by the refresh rate
/// nearest to `refresh`, then by list order.
pub fn nearest_mode(modes: &[Mode], width: u32, height: u32, refresh: f32) -> Option<Mode> {
    let wanted = i64::from(width) + i64::from(height);

    modes
        .iter()
        .copied()
        .fold(None, |best: Option<(i64, f32, Mode)>, mode| {
            let size = (i64::from(mode.width) + i64::from(mode.height) - wanted).abs();
            let rate = (mode.refresh - refresh).abs();

            match best {
                Some((bs, br, _)) if bs < size || (bs == size && br <= rate) => best,
                _ => Some((size, rate, mode)),
            }
        })
        .map(|(_, _, mode)| mode)
}

/// Performs the actual display mode switch
pub trait ResolutionManager {
    fn available_modes(&mut self) -> Result<Vec<Mode>, Error>;

    fn current_mode(&mut self) -> Result<Mode, Error>;

    /// Switch to the nearest available mode, returning the mode actually selected
    fn set_mode(&mut self, width: u32, height: u32) -> Result<Mode, Error>;
}

/// For displays where switching is not possible, or not wanted
#[derive(Debug, Default)]
pub struct NoResolution;

impl ResolutionManager for NoResolution {
    fn available_modes(&mut self) -> Result<Vec<Mode>, Error> {
        Ok(Vec::new())
    }

    fn current_mode(&mut self) -> Result<Mode, Error> {
        Err(Error::resolution("resolution switching is disabled"))
    }

    fn set_mode(&mut self, _width: u32, _height: u32) -> Result<Mode, Error> {
        Err(Error::resolution("resolution switching is disabled"))
    }
}

/// Resolution bookkeeping owned by the supervisor
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResolutionState {
    /// Last mode successfully switched to
    pub current: Option<Resolution>,
    /// Resolution to restore once no running program wants a specific one
    pub default: Option<Resolution>,
}

impl ResolutionState {
    /// Seeds both current and default from what the display reports right now
    pub fn detect(manager: &mut dyn ResolutionManager) -> Self {
        match manager.current_mode() {
            Ok(mode) => {
                debug!(mode = %mode, "detected initial display mode");
                Self {
                    current: Some(mode.resolution()),
                    default: Some(mode.resolution()),
                }
            }
            Err(e) => {
                warn!("could not detect display mode: {}", e);
                Self::default()
            }
        }
    }
}
