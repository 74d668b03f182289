// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Launch and monitor programs
//!
//! Rules:
//!   - only the event loop thread touches the supervisor, so nothing here locks
//!   - children are polled, never waited on
//!   - the display resolution follows the most recently started live program that asked for one

mod list;

pub use list::{Iter, ProcessId, ProcessList};

use std::time::{Duration, Instant};

use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use crate::config::ProgramSpec;
use crate::fork::{self, ExitStatus};
use crate::resolution::{Resolution, ResolutionManager, ResolutionState};
use crate::ui::Trigger;
use crate::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Target of `updateres` that addresses the default resolution rather than a program
pub const GENERAL: &str = "general";

/// A started program, owned by the [`Supervisor`]
#[derive(Debug)]
pub struct RunningProcess {
    pid: Pid,
    spec: ProgramSpec,
    exit_status: Option<ExitStatus>,
    trigger: Option<Box<dyn Trigger>>,
    next_poll: Instant,
}

impl RunningProcess {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The program as configured when it was started
    pub fn spec(&self) -> &ProgramSpec {
        &self.spec
    }

    /// Resolution requested for this run, later `updateres` calls do not affect it
    pub fn target_resolution(&self) -> Option<Resolution> {
        self.spec.target_resolution
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }
}

pub struct Supervisor {
    programs: Vec<ProgramSpec>,
    running: ProcessList<RunningProcess>,
    resolution: ResolutionState,
    manager: Box<dyn ResolutionManager>,
    poll_interval: Duration,
}

impl Supervisor {
    /// The current display mode becomes the default resolution
    pub fn new(programs: Vec<ProgramSpec>, mut manager: Box<dyn ResolutionManager>) -> Self {
        let resolution = ResolutionState::detect(manager.as_mut());

        Self {
            programs,
            running: ProcessList::new(),
            resolution,
            manager,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn programs(&self) -> &[ProgramSpec] {
        &self.programs
    }

    pub fn program(&self, name: &str) -> Option<&ProgramSpec> {
        self.programs.iter().find(|p| p.name == name)
    }

    pub fn resolution(&self) -> ResolutionState {
        self.resolution
    }

    pub fn running(&self) -> &ProcessList<RunningProcess> {
        &self.running
    }

    pub fn get(&self, id: ProcessId) -> Option<&RunningProcess> {
        self.running.get(id)
    }

    /// Start a program
    ///
    /// The trigger, if any, stays disabled until the program is seen to have exited. A failed
    /// resolution switch does not stop the launch. Success only means the fork went through: a
    /// program that dies straight away is noticed on its first poll.
    pub fn start(
        &mut self,
        spec: &ProgramSpec,
        trigger: Option<Box<dyn Trigger>>,
    ) -> Result<ProcessId, Error> {
        fork::check_executable(spec)?;

        match spec.target_resolution {
            Some(target) => self.switch_to(target),
            None if !self.has_live_target() => {
                if let Some(default) = self.resolution.default {
                    if self.resolution.current != Some(default) {
                        self.switch_to(default);
                    }
                }
            }
            None => (),
        }

        if let Some(trigger) = &trigger {
            trigger.set_enabled(false);
        }

        let pid = match fork::spawn(spec) {
            Ok(pid) => pid,
            Err(e) => {
                error!(program = %spec.name, "{}", e);
                if let Some(trigger) = &trigger {
                    trigger.set_enabled(true);
                }
                if spec.target_resolution.is_some() {
                    self.restore_resolution();
                }
                return Err(e);
            }
        };

        info!(program = %spec.name, %pid, "started");
        let id = self.running.push_back(RunningProcess {
            pid,
            spec: spec.clone(),
            exit_status: None,
            trigger,
            next_poll: Instant::now() + self.poll_interval,
        });

        Ok(id)
    }

    /// Start a configured program by name
    pub fn start_by_name(
        &mut self,
        name: &str,
        trigger: Option<Box<dyn Trigger>>,
    ) -> Result<ProcessId, Error> {
        let spec = self
            .program(name)
            .cloned()
            .ok_or_else(|| Error::spawn(name, "no such program"))?;

        self.start(&spec, trigger)
    }

    /// Start every program flagged `autostart`, in configuration order
    ///
    /// Returns how many were started, failures are logged and skipped.
    pub fn autostart(&mut self) -> usize {
        let specs = self
            .programs
            .iter()
            .filter(|p| p.autostart)
            .cloned()
            .collect::<Vec<_>>();

        specs
            .iter()
            .filter(|spec| self.start(spec, None).is_ok())
            .count()
    }

    /// Check one process, returns true if it was found gone and removed
    pub fn poll(&mut self, id: ProcessId) -> bool {
        let interval = self.poll_interval;
        let node = match self.running.get_mut(id) {
            Some(node) => node,
            None => return false,
        };

        let status = fork::reap(node.pid);
        let pid = node.pid;
        if !has_exited(status, || fork::is_alive(pid)) {
            node.next_poll = Instant::now() + interval;
            return false;
        }
        node.exit_status = status;

        let node = match self.running.remove(id) {
            Some(node) => node,
            None => return false,
        };

        match node.exit_status {
            Some(status) => info!(program = %node.spec.name, pid = %node.pid, "exited with {}", status),
            None => info!(program = %node.spec.name, pid = %node.pid, "is gone"),
        }

        if let Some(trigger) = &node.trigger {
            trigger.set_enabled(true);
        }

        if node.spec.target_resolution.is_some() {
            self.restore_resolution();
        }

        true
    }

    /// Poll every process whose interval has elapsed, returns the number removed
    pub fn poll_due(&mut self, now: Instant) -> usize {
        let due = self
            .running
            .iter()
            .filter(|(_, p)| p.next_poll <= now)
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        due.into_iter().filter(|id| self.poll(*id)).count()
    }

    /// Poll every process right away, returns the number removed
    pub fn poll_all(&mut self) -> usize {
        let ids = self.running.iter().map(|(id, _)| id).collect::<Vec<_>>();

        ids.into_iter().filter(|id| self.poll(*id)).count()
    }

    /// When the next poll is due, `None` with nothing running
    pub fn next_deadline(&self) -> Option<Instant> {
        self.running.iter().map(|(_, p)| p.next_poll).min()
    }

    /// `(name, pid)` of every live process, oldest first
    pub fn list_running(&self) -> Vec<(String, Pid)> {
        self.running
            .iter()
            .map(|(_, p)| (p.spec.name.clone(), p.pid))
            .collect()
    }

    /// Change the resolution used by future launches
    ///
    /// `general` sets the default resolution, anything else names a program.
    pub fn update_resolution(&mut self, target: &str, resolution: Resolution) -> Result<(), Error> {
        if target == GENERAL {
            info!(%resolution, "default resolution updated");
            self.resolution.default = Some(resolution);
            return Ok(());
        }

        let program = self
            .programs
            .iter_mut()
            .find(|p| p.name == target)
            .ok_or_else(|| Error::from(format!("no such program: {}", target)))?;

        info!(program = %target, %resolution, "resolution updated");
        program.target_resolution = Some(resolution);
        Ok(())
    }

    /// Ask every live child to exit, used at shutdown
    pub fn terminate_all(&mut self) {
        for (_, p) in self.running.iter() {
            debug!(program = %p.spec.name, pid = %p.pid, "terminating");
            if let Err(e) = fork::terminate(p.pid) {
                warn!(program = %p.spec.name, pid = %p.pid, "failed to terminate: {}", e);
            }
        }
    }

    fn has_live_target(&self) -> bool {
        self.running
            .iter()
            .any(|(_, p)| p.spec.target_resolution.is_some())
    }

    /// The newest live program with a target wins, otherwise the default
    fn wanted_resolution(&self) -> Option<Resolution> {
        self.running
            .iter_rev()
            .find_map(|(_, p)| p.spec.target_resolution)
            .or(self.resolution.default)
    }

    fn restore_resolution(&mut self) {
        match self.wanted_resolution() {
            Some(wanted) if self.resolution.current != Some(wanted) => self.switch_to(wanted),
            Some(_) => (),
            None => debug!("no resolution to restore"),
        }
    }

    /// Best effort, a failure leaves the display as it is
    fn switch_to(&mut self, resolution: Resolution) {
        match self.manager.set_mode(resolution.width, resolution.height) {
            Ok(mode) => {
                debug!(requested = %resolution, actual = %mode, "resolution switched");
                self.resolution.current = Some(mode.resolution());
            }
            Err(e) => warn!(requested = %resolution, "could not switch resolution: {}", e),
        }
    }
}

// a reaped pid is free for reuse, so the probe only covers processes that are not our children
fn has_exited(reaped: Option<ExitStatus>, is_alive: impl FnOnce() -> bool) -> bool {
    reaped.is_some() || !is_alive()
}
