// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Drives the whole launcher in process, kept in its own test binary since it signals itself

use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use kiosklaunch::applet::{Applet, AppletContext, Registry};
use kiosklaunch::config::Config;
use kiosklaunch::control::client;
use kiosklaunch::event_loop;
use kiosklaunch::resolution::NoResolution;
use kiosklaunch::ui::{Panel, UiUpdate, Widget};
use kiosklaunch::Error;

struct Beacon;

impl Applet for Beacon {
    fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn widget(&mut self) -> Widget {
        Widget::label("beacon")
    }

    fn start(&self, ctx: &AppletContext) {
        while ctx.is_running() {
            ctx.post(UiUpdate::Tooltip("alive".to_string()));
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn stop(&self) {}
}

struct Broken;

impl Applet for Broken {
    fn init(&mut self) -> Result<(), Error> {
        Err(Error::from("no hardware"))
    }

    fn widget(&mut self) -> Widget {
        unreachable!("widget requested from an applet that failed init")
    }

    fn start(&self, _ctx: &AppletContext) {
        unreachable!("started an applet that failed init")
    }

    fn stop(&self) {}
}

#[derive(Default)]
struct RecordingPanel {
    inserted: Vec<String>,
    updates: Vec<(String, UiUpdate)>,
}

impl Panel for RecordingPanel {
    fn insert(&mut self, module: &str, _widget: Widget) {
        self.inserted.push(module.to_string());
    }

    fn apply(&mut self, module: &str, update: UiUpdate) {
        self.updates.push((module.to_string(), update));
    }
}

#[test]
fn test_launcher_serves_until_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("control.sock");
    let conf_path = dir.path().join("kiosk.toml");

    let text = format!(
        r#"
font_size = 22
socket = "{}"
poll_interval_ms = 20

[[program]]
name = "background"
path = "/bin/sleep"
args = ["30"]
autostart = true

[[program]]
name = "manual"
path = "/bin/sleep"
args = ["30"]

[[module]]
name = "broken"
path = "broken"

[[module]]
name = "beacon"
path = "/usr/lib/kiosklaunch/libbeacon.so"
"#,
        socket.display()
    );
    let config = Config::from_str_at(&text, conf_path.clone()).unwrap();

    let mut registry = Registry::new();
    registry
        .register("beacon", || Box::new(Beacon) as Box<dyn Applet>)
        .register("broken", || Box::new(Broken) as Box<dyn Applet>);
    let mut panel = RecordingPanel::default();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let (served, (size, path, processes)) = runtime.block_on(async {
        let server = event_loop::run(config, &registry, Box::new(NoResolution), &mut panel);

        let client = async {
            let size = loop {
                match client::font_size(&socket).await {
                    Ok(size) => break size,
                    Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            };
            let path = client::conf_path(&socket).await.unwrap();
            let processes = client::list_processes(&socket).await.unwrap();

            // let the applet get a few updates through before shutting down
            tokio::time::sleep(Duration::from_millis(100)).await;
            kill(Pid::this(), Signal::SIGTERM).unwrap();

            (size, path, processes)
        };

        tokio::join!(server, client)
    });

    served.unwrap();
    assert_eq!(size, 22);
    assert_eq!(path, PathBuf::from(&conf_path));
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0].0, "background");

    assert_eq!(panel.inserted, vec!["beacon"]);
    assert!(!panel.updates.is_empty());
    assert!(panel
        .updates
        .iter()
        .all(|(module, update)| module == "beacon"
            && *update == UiUpdate::Tooltip("alive".to_string())));

    // the socket goes away with the launcher
    assert!(!socket.exists());
}
