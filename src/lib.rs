// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Kiosk launcher: program supervision, panel applets and the control socket

pub mod applet;
pub mod config;
pub mod control;
mod error;
pub mod event_loop;
pub mod fork;
pub mod procs;
pub mod resolution;
pub mod ui;

pub use error::{Error, ErrorKind};
