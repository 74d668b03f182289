// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsString;
use std::process::Command;

use tracing::{debug, info};

use super::{nearest_mode, Mode, ResolutionManager};
use crate::Error;

/// Switches modes through the `xrandr` tool on the first output that lists modes
#[derive(Debug)]
pub struct Xrandr {
    program: OsString,
}

impl Default for Xrandr {
    fn default() -> Self {
        Self::with_program("xrandr")
    }
}

impl Xrandr {
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn query(&self) -> Result<Vec<(Mode, bool)>, Error> {
        let output = Command::new(&self.program).output()?;
        if !output.status.success() {
            return Err(Error::resolution(format!(
                "xrandr exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_modes(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl ResolutionManager for Xrandr {
    fn available_modes(&mut self) -> Result<Vec<Mode>, Error> {
        Ok(self.query()?.into_iter().map(|(mode, _)| mode).collect())
    }

    fn current_mode(&mut self) -> Result<Mode, Error> {
        self.query()?
            .into_iter()
            .find(|(_, current)| *current)
            .map(|(mode, _)| mode)
            .ok_or_else(|| Error::resolution("xrandr reported no current mode"))
    }

    fn set_mode(&mut self, width: u32, height: u32) -> Result<Mode, Error> {
        let modes = self.query()?;
        let refresh = modes
            .iter()
            .find(|(_, current)| *current)
            .map_or(60.0, |(mode, _)| mode.refresh);
        let available = modes.into_iter().map(|(mode, _)| mode).collect::<Vec<_>>();

        let mode = nearest_mode(&available, width, height, refresh).ok_or_else(|| {
            Error::resolution(format!("no display mode available for {}x{}", width, height))
        })?;
        debug!(width, height, selected = %mode, "nearest display mode");

        let status = Command::new(&self.program)
            .arg("-s")
            .arg(format!("{}x{}", mode.width, mode.height))
            .arg("-r")
            .arg(format!("{:.2}", mode.refresh))
            .status()?;

        if !status.success() {
            return Err(Error::resolution(format!(
                "xrandr failed to switch to {}: {}",
                mode, status
            )));
        }

        info!(mode = %mode, "switched display mode");
        Ok(mode)
    }
}

/// Reads the mode table of the first output that has one
///
/// Each returned mode is flagged true when xrandr marked it with `*`.
fn parse_modes(output: &str) -> Vec<(Mode, bool)> {
    let mut modes = Vec::new();

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) {
            if modes.is_empty() {
                continue;
            }
            break;
        }

        let mut tokens = line.split_whitespace();
        let size = match tokens.next() {
            Some(size) => size.trim_end_matches('i'),
            None => continue,
        };
        let (width, height) = match size.split_once('x') {
            Some((w, h)) => match (w.parse::<u32>(), h.parse::<u32>()) {
                (Ok(w), Ok(h)) => (w, h),
                _ => continue,
            },
            None => continue,
        };

        for rate in tokens {
            let current = rate.contains('*');
            let rate = rate.trim_end_matches(|c: char| c == '*' || c == '+');
            if let Ok(refresh) = rate.parse::<f32>() {
                modes.push((
                    Mode {
                        width,
                        height,
                        refresh,
                    },
                    current,
                ));
            }
        }
    }

    modes
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
Screen 0: minimum 8 x 8, current 1280 x 720, maximum 32767 x 32767
HDMI-1 connected primary 1280x720+0+0 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00 +  50.00    59.94
   1280x720      60.00*   50.00
   1920x1080i    30.00
   800x600       60.32    56.25
DP-1 disconnected (normal left inverted right x axis y axis)
   640x480       59.94
";

    #[test]
    fn test_parse_modes() {
        let modes = parse_modes(OUTPUT);

        assert_eq!(modes.len(), 8);
        assert_eq!(
            modes[0],
            (
                Mode {
                    width: 1920,
                    height: 1080,
                    refresh: 60.0
                },
                false
            )
        );

        let current = modes.iter().filter(|(_, c)| *c).collect::<Vec<_>>();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].0.width, 1280);
        assert_eq!(current[0].0.height, 720);

        // the disconnected output is never reached
        assert!(modes.iter().all(|(m, _)| m.width != 640));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_modes("").is_empty());
        assert!(parse_modes("Screen 0: minimum 8 x 8\n").is_empty());
    }

    #[test]
    fn test_missing_binary() {
        let mut xrandr = Xrandr::with_program("/nonexistent/xrandr");
        assert!(xrandr.current_mode().is_err());
        assert!(xrandr.set_mode(800, 600).is_err());
    }
}
