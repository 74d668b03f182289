// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The launcher's single threaded main loop
//!
//! The supervisor, the control listener and the panel all live on this thread. Applet workers are
//! the only other threads, they reach the panel through a channel.

use std::future;
use std::time::Instant;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};

use crate::applet::{PluginHost, Registry};
use crate::config::Config;
use crate::control::{ControlListener, Settings};
use crate::procs::Supervisor;
use crate::resolution::ResolutionManager;
use crate::ui::Panel;
use crate::Error;

/// Run the launcher until SIGINT or SIGTERM
///
/// Only failing to set up the control socket or signal handlers is an error, everything after
/// that is logged and survived.
pub async fn run(
    config: Config,
    registry: &Registry,
    manager: Box<dyn ResolutionManager>,
    panel: &mut dyn Panel,
) -> Result<(), Error> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let listener = ControlListener::bind(&config.socket, Settings::from(&config))?;

    let mut supervisor =
        Supervisor::new(config.programs.clone(), manager).with_poll_interval(config.poll_interval);

    let (ui_tx, mut ui_rx) = unbounded_channel();
    let mut host = PluginHost::load(&config.modules, registry, config.icon_size, panel, ui_tx);
    host.start_all();

    let started = supervisor.autostart();
    info!(
        programs = started,
        applets = host.modules().len(),
        "launcher started"
    );

    loop {
        let deadline = supervisor.next_deadline();

        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    if let Err(e) = listener.handle(stream, &mut supervisor).await {
                        warn!("control request failed: {}", e);
                    }
                }
                Err(e) => warn!("accept failed: {}", e),
            },
            _ = sleep_until(deadline) => {
                supervisor.poll_due(Instant::now());
            }
            Some(request) = ui_rx.recv() => {
                if host.is_running(&request.module) {
                    panel.apply(&request.module, request.update);
                } else {
                    debug!(module = %request.module, "dropping update from stopped applet");
                }
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
                break;
            }
        }
    }

    host.stop_all();
    if config.terminate_on_exit {
        supervisor.terminate_all();
    }
    host.join_all();

    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => future::pending().await,
    }
}
