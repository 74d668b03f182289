// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Panel applets
//!
//! An applet is created from a [`Registry`] and then driven by the [`PluginHost`] through a fixed
//! sequence: `init`, `set_conf_file` (only when configured), `set_icon_size`, `widget`, then
//! `start` on a worker thread of its own and finally `stop`.

mod host;

pub use host::{LoadedModule, PluginHost};

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::ui::{UiRequest, UiUpdate, Widget};
use crate::Error;

/// A status applet hosted in the panel
///
/// `start` runs on a dedicated thread and is free to block and sleep. It should return once
/// [`AppletContext::is_running`] turns false. `stop` is called from the event loop thread while
/// `start` may still be running.
pub trait Applet: Send + Sync {
    fn init(&mut self) -> Result<(), Error>;

    fn set_conf_file(&mut self, _path: &Path) {}

    fn set_icon_size(&mut self, _width: u32, _height: u32) {}

    /// Called exactly once, after a successful `init`
    fn widget(&mut self) -> Widget;

    fn start(&self, ctx: &AppletContext);

    fn stop(&self);
}

/// An applet's handle back to the launcher, valid for one `start`
#[derive(Clone)]
pub struct AppletContext {
    name: Arc<str>,
    running: Arc<AtomicBool>,
    ui: UnboundedSender<UiRequest>,
}

impl AppletContext {
    pub(crate) fn new(name: &str, running: Arc<AtomicBool>, ui: UnboundedSender<UiRequest>) -> Self {
        Self {
            name: Arc::from(name),
            running,
            ui,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once the host asked this applet to stop
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue a change to this applet's widget, it is applied on the event loop thread
    ///
    /// Returns false, and drops the update, once the applet has been stopped or the launcher is
    /// shutting down.
    pub fn post(&self, update: UiUpdate) -> bool {
        if !self.is_running() {
            return false;
        }

        self.ui
            .send(UiRequest {
                module: self.name.to_string(),
                update,
            })
            .is_ok()
    }

    /// Sleep for one loop interval, returns whether the loop should go on
    pub fn wait(&self, interval: Duration) -> bool {
        thread::sleep(interval);
        self.is_running()
    }
}

impl fmt::Debug for AppletContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppletContext")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Applet>>;

/// Applet implementations known to this build
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Applet> + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    pub fn contains(&self, module_path: &str) -> bool {
        self.lookup(module_path).is_some()
    }

    /// Create an applet by registered name
    ///
    /// A shared library style path resolves by its file stem, with or without the `lib` prefix,
    /// so `/usr/lib/kiosklaunch/libclock.so` finds `clock`.
    pub fn create(&self, module_path: &str) -> Option<Box<dyn Applet>> {
        self.lookup(module_path).map(|factory| factory())
    }

    fn lookup(&self, module_path: &str) -> Option<&Factory> {
        if let Some(factory) = self.factories.get(module_path) {
            return Some(factory);
        }

        let stem = Path::new(module_path).file_stem()?.to_str()?;
        self.factories.get(stem).or_else(|| {
            stem.strip_prefix("lib")
                .and_then(|name| self.factories.get(name))
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    struct Nop;

    impl Applet for Nop {
        fn init(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn widget(&mut self) -> Widget {
            Widget::default()
        }

        fn start(&self, _ctx: &AppletContext) {}

        fn stop(&self) {}
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = Registry::new();
        registry.register("clock", || Box::new(Nop) as Box<dyn Applet>);

        assert!(registry.contains("clock"));
        assert!(registry.contains("/usr/lib/kiosklaunch/libclock.so"));
        assert!(registry.contains("/usr/lib/kiosklaunch/clock.so"));
        assert!(registry.create("clock").is_some());

        assert!(!registry.contains("network"));
        assert!(!registry.contains("/usr/lib/libnetwork.so"));
        assert!(!registry.contains(""));
    }

    #[test]
    fn test_post_after_stop_is_dropped() {
        let (tx, mut rx) = unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let ctx = AppletContext::new("clock", running.clone(), tx);

        assert!(ctx.post(UiUpdate::Label("12:00".to_string())));
        running.store(false, Ordering::SeqCst);
        assert!(!ctx.post(UiUpdate::Label("12:01".to_string())));
        assert!(!ctx.wait(Duration::from_millis(1)));

        assert_eq!(
            rx.try_recv().unwrap(),
            UiRequest {
                module: "clock".to_string(),
                update: UiUpdate::Label("12:00".to_string()),
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
