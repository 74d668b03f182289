// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::{Applet, AppletContext, Registry};
use crate::config::ModuleSpec;
use crate::resolution::Resolution;
use crate::ui::{Panel, UiRequest, Widget};
use crate::Error;

/// An applet that made it through `init`
pub struct LoadedModule {
    spec: ModuleSpec,
    applet: Arc<dyn Applet>,
    /// Flag of the current run, every `start` gets a fresh one
    running: Arc<AtomicBool>,
    /// Held by a worker for as long as its `start` call lasts
    start_lock: Arc<Mutex<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl LoadedModule {
    /// Runs the applet through its setup calls, in order
    pub fn load(
        spec: &ModuleSpec,
        registry: &Registry,
        icon_size: Resolution,
    ) -> Result<(Self, Widget), Error> {
        let mut applet = registry
            .create(&spec.module_path)
            .ok_or_else(|| Error::module_load(&spec.name, format!("{} is not available", spec.module_path)))?;

        applet
            .init()
            .map_err(|e| Error::module_load(&spec.name, format!("init failed: {}", e)))?;

        if let Some(path) = &spec.module_config_path {
            applet.set_conf_file(path);
        }
        applet.set_icon_size(icon_size.width, icon_size.height);
        let widget = applet.widget();

        let module = Self {
            spec: spec.clone(),
            applet: Arc::from(applet),
            running: Arc::new(AtomicBool::new(false)),
            start_lock: Arc::new(Mutex::new(())),
            workers: Vec::new(),
        };

        Ok((module, widget))
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    /// True between `start` and `stop`, regardless of whether the applet's loop already returned
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the applet's `start` on a new worker thread
    ///
    /// Does nothing if already running. After a `stop`, the new worker waits for the previous
    /// `start` call to return before making its own.
    pub fn start(&mut self, ui: UnboundedSender<UiRequest>) -> Result<(), Error> {
        if self.is_running() {
            warn!(module = %self.spec.name, "already running");
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);

        let ctx = AppletContext::new(&self.spec.name, running, ui);
        let applet = Arc::clone(&self.applet);
        let start_lock = Arc::clone(&self.start_lock);

        let worker = thread::Builder::new()
            .name(format!("applet-{}", self.spec.name))
            .spawn(move || {
                let _guard = start_lock.lock().unwrap_or_else(PoisonError::into_inner);
                if !ctx.is_running() {
                    debug!(module = %ctx.name(), "stopped before starting");
                    return;
                }

                debug!(module = %ctx.name(), "applet loop starting");
                applet.start(&ctx);
                debug!(module = %ctx.name(), "applet loop returned");
            });

        match worker {
            Ok(worker) => {
                self.workers.push(worker);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Ask the applet's loop to end, this does not wait for it
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!(module = %self.spec.name, "stopping");
            self.applet.stop();
        }
    }

    /// Wait for every worker of this module to return
    pub fn join(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(module = %self.spec.name, "applet worker panicked");
            }
        }
    }
}

/// Owns the loaded applets and their workers
pub struct PluginHost {
    modules: Vec<LoadedModule>,
    ui: UnboundedSender<UiRequest>,
}

impl PluginHost {
    /// Load every module, placing the widgets of the ones that load in the panel
    ///
    /// A module that fails to load is left out, the others are unaffected.
    pub fn load(
        specs: &[ModuleSpec],
        registry: &Registry,
        icon_size: Resolution,
        panel: &mut dyn Panel,
        ui: UnboundedSender<UiRequest>,
    ) -> Self {
        let mut modules = Vec::with_capacity(specs.len());

        for spec in specs {
            match LoadedModule::load(spec, registry, icon_size) {
                Ok((module, widget)) => {
                    info!(module = %spec.name, "loaded");
                    panel.insert(&spec.name, widget);
                    modules.push(module);
                }
                Err(e) => warn!(module = %spec.name, "{}, leaving it out of the panel", e),
            }
        }

        Self { modules, ui }
    }

    pub fn modules(&self) -> &[LoadedModule] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&LoadedModule> {
        self.modules.iter().find(|m| m.name() == name)
    }

    /// Whether updates from this module should still reach the panel
    pub fn is_running(&self, name: &str) -> bool {
        self.module(name).map_or(false, LoadedModule::is_running)
    }

    pub fn start_all(&mut self) {
        for module in &mut self.modules {
            if let Err(e) = module.start(self.ui.clone()) {
                warn!(module = %module.name(), "could not start worker: {}", e);
            }
        }
    }

    pub fn stop_all(&mut self) {
        for module in &mut self.modules {
            module.stop();
        }
    }

    /// Blocks for up to one loop interval of the slowest applet
    pub fn join_all(&mut self) {
        for module in &mut self.modules {
            module.join();
        }
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;
    use crate::ui::UiUpdate;

    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl Calls {
        fn push(&self, call: impl Into<String>) {
            self.0.lock().unwrap().push(call.into());
        }

        fn list(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Posts a counter every few milliseconds until stopped
    struct Ticker {
        calls: Arc<Calls>,
        fail_init: bool,
        starts: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl Ticker {
        fn new(calls: Arc<Calls>) -> Self {
            Self {
                calls,
                fail_init: false,
                starts: Arc::default(),
                active: Arc::default(),
                max_active: Arc::default(),
            }
        }
    }

    impl Applet for Ticker {
        fn init(&mut self) -> Result<(), Error> {
            self.calls.push("init");
            if self.fail_init {
                return Err(Error::from("no network"));
            }
            Ok(())
        }

        fn set_conf_file(&mut self, path: &Path) {
            self.calls.push(format!("conf {}", path.display()));
        }

        fn set_icon_size(&mut self, width: u32, height: u32) {
            self.calls.push(format!("icon {}x{}", width, height));
        }

        fn widget(&mut self) -> Widget {
            self.calls.push("widget");
            Widget::label("0")
        }

        fn start(&self, ctx: &AppletContext) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            let mut count = 0;
            while ctx.is_running() {
                count += 1;
                ctx.post(UiUpdate::Label(count.to_string()));
                thread::sleep(Duration::from_millis(5));
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.calls.push("stop");
        }
    }

    #[derive(Default)]
    struct TestPanel {
        widgets: Vec<(String, Widget)>,
    }

    impl Panel for TestPanel {
        fn insert(&mut self, module: &str, widget: Widget) {
            self.widgets.push((module.to_string(), widget));
        }

        fn apply(&mut self, _module: &str, _update: UiUpdate) {}
    }

    fn drain(rx: &mut UnboundedReceiver<UiRequest>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn test_lifecycle_order() {
        let calls = Arc::new(Calls::default());
        let mut registry = Registry::new();
        let c = Arc::clone(&calls);
        registry.register("ticker", move || {
            Box::new(Ticker::new(Arc::clone(&c))) as Box<dyn Applet>
        });

        let spec = ModuleSpec::new("ticker", "ticker").config("/etc/ticker.conf");
        let (mut module, widget) =
            LoadedModule::load(&spec, &registry, Resolution::new(32, 24)).unwrap();
        assert_eq!(widget, Widget::label("0"));

        let (tx, mut rx) = unbounded_channel();
        module.start(tx).unwrap();
        assert!(module.is_running());

        while drain(&mut rx) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        module.stop();
        module.stop();
        module.join();
        assert!(!module.is_running());

        assert_eq!(
            calls.list(),
            vec![
                "init".to_string(),
                format!("conf {}", PathBuf::from("/etc/ticker.conf").display()),
                "icon 32x24".to_string(),
                "widget".to_string(),
                "stop".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_conf_file_without_config() {
        let calls = Arc::new(Calls::default());
        let mut registry = Registry::new();
        let c = Arc::clone(&calls);
        registry.register("ticker", move || {
            Box::new(Ticker::new(Arc::clone(&c))) as Box<dyn Applet>
        });

        LoadedModule::load(
            &ModuleSpec::new("ticker", "ticker"),
            &registry,
            Resolution::new(16, 16),
        )
        .unwrap();

        assert_eq!(calls.list(), vec!["init", "icon 16x16", "widget"]);
    }

    #[test]
    fn test_failed_modules_are_dropped() {
        let calls = Arc::new(Calls::default());
        let mut registry = Registry::new();
        let c = Arc::clone(&calls);
        registry.register("broken", move || {
            let mut ticker = Ticker::new(Arc::clone(&c));
            ticker.fail_init = true;
            Box::new(ticker) as Box<dyn Applet>
        });
        let c = Arc::clone(&calls);
        registry.register("ticker", move || {
            Box::new(Ticker::new(Arc::clone(&c))) as Box<dyn Applet>
        });

        let specs = vec![
            ModuleSpec::new("first", "broken"),
            ModuleSpec::new("second", "/usr/lib/libmissing.so"),
            ModuleSpec::new("third", "/usr/lib/libticker.so"),
        ];
        let mut panel = TestPanel::default();
        let (tx, _rx) = unbounded_channel();
        let host = PluginHost::load(&specs, &registry, Resolution::new(48, 48), &mut panel, tx);

        assert_eq!(host.modules().len(), 1);
        assert_eq!(host.modules()[0].name(), "third");
        assert_eq!(panel.widgets, vec![("third".to_string(), Widget::label("0"))]);

        // the broken module never got past init
        assert_eq!(
            calls.list(),
            vec!["init", "init", "icon 48x48", "widget"]
        );
    }

    #[test]
    fn test_no_updates_after_stop() {
        let calls = Arc::new(Calls::default());
        let mut registry = Registry::new();
        let c = Arc::clone(&calls);
        registry.register("ticker", move || {
            Box::new(Ticker::new(Arc::clone(&c))) as Box<dyn Applet>
        });

        let mut panel = TestPanel::default();
        let (tx, mut rx) = unbounded_channel();
        let mut host = PluginHost::load(
            &[ModuleSpec::new("ticker", "ticker")],
            &registry,
            Resolution::new(48, 48),
            &mut panel,
            tx,
        );

        host.start_all();
        assert!(host.is_running("ticker"));
        while drain(&mut rx) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        host.stop_all();
        assert!(!host.is_running("ticker"));
        thread::sleep(Duration::from_millis(50));
        drain(&mut rx);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(drain(&mut rx), 0);

        host.join_all();
    }

    #[test]
    fn test_start_is_not_doubled() {
        let calls = Arc::new(Calls::default());
        let ticker = Ticker::new(Arc::clone(&calls));
        let starts = Arc::clone(&ticker.starts);
        let max_active = Arc::clone(&ticker.max_active);
        let slot = Mutex::new(Some(ticker));

        let mut registry = Registry::new();
        registry.register("ticker", move || {
            let ticker = slot.lock().unwrap().take().unwrap();
            Box::new(ticker) as Box<dyn Applet>
        });

        let (mut module, _) = LoadedModule::load(
            &ModuleSpec::new("ticker", "ticker"),
            &registry,
            Resolution::new(48, 48),
        )
        .unwrap();

        let (tx, mut rx) = unbounded_channel();
        module.start(tx.clone()).unwrap();
        module.start(tx.clone()).unwrap();
        while drain(&mut rx) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        // a restart right after stop has to wait for the first loop to finish
        module.stop();
        module.start(tx).unwrap();
        while starts.load(Ordering::SeqCst) < 2 {
            thread::sleep(Duration::from_millis(1));
        }

        module.stop();
        module.join();

        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }
}
