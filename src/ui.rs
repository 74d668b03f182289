// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Boundary to the widget toolkit
//!
//! Rendering lives outside this crate. The launcher only needs to toggle the controls that start
//! programs, place applet widgets in the panel, and forward applet updates to them. All of these are
//! driven from the event loop thread.

use std::fmt::Debug;
use std::path::PathBuf;

use tracing::info;

/// A control that launches a program, e.g. a panel button
///
/// Disabled while its program runs so that it cannot be started twice.
pub trait Trigger: Debug {
    fn set_enabled(&self, enabled: bool);
}

/// Initial description of an applet's widget, as handed to the panel
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Widget {
    pub label: Option<String>,
    pub icon: Option<PathBuf>,
    pub tooltip: Option<String>,
}

impl Widget {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}

/// A change an applet wants made to its widget
#[derive(Clone, Debug, PartialEq)]
pub enum UiUpdate {
    Label(String),
    Icon(PathBuf),
    Tooltip(String),
    Visible(bool),
}

/// A [`UiUpdate`] travelling from an applet worker to the event loop
#[derive(Clone, Debug, PartialEq)]
pub struct UiRequest {
    pub module: String,
    pub update: UiUpdate,
}

/// The panel applet widgets are laid out in
pub trait Panel {
    fn insert(&mut self, module: &str, widget: Widget);

    fn apply(&mut self, module: &str, update: UiUpdate);
}

/// A headless panel that reports everything to the log
#[derive(Debug, Default)]
pub struct LogPanel;

impl Panel for LogPanel {
    fn insert(&mut self, module: &str, widget: Widget) {
        info!(module, ?widget, "panel widget added");
    }

    fn apply(&mut self, module: &str, update: UiUpdate) {
        info!(module, ?update, "panel widget updated");
    }
}
