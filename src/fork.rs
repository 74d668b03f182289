// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::fs::File;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::config::ProgramSpec;
use crate::Error;

/// How a reaped child ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signal(Signal),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {}", code),
            ExitStatus::Signal(sig) => write!(f, "signal {}", sig),
        }
    }
}

/// The executable must exist and be readable
pub fn check_executable(spec: &ProgramSpec) -> Result<(), Error> {
    File::open(&spec.executable_path).map_err(|e| {
        Error::spawn(
            &spec.name,
            format!("{}: {}", spec.executable_path.display(), e),
        )
    })?;

    Ok(())
}

/// Forks and execs the program, `argv[0]` is the program name
///
/// The child inherits stdout and stderr from the launcher and is not waited on here, see [`reap`].
pub fn spawn(spec: &ProgramSpec) -> Result<Pid, Error> {
    // FIXME: clear env? set working directory? uid/gid?
    let child = Command::new(&spec.executable_path)
        .arg0(&spec.name)
        .args(&spec.argv)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| Error::spawn(&spec.name, e))?;

    // dropping the std handle neither waits nor kills, the pid is tracked from here on
    let pid = Pid::from_raw(child.id() as libc::pid_t);
    debug!(program = %spec.name, %pid, "forked");

    Ok(pid)
}

/// Collects the exit status of the child without blocking
///
/// Returns `None` while the child is still running, or when it is not (or no longer) a child of
/// this process.
pub fn reap(pid: Pid) -> Option<ExitStatus> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(_, code)) => Some(ExitStatus::Code(code)),
        Ok(WaitStatus::Signaled(_, signal, _)) => Some(ExitStatus::Signal(signal)),
        Ok(_) => None,
        Err(Errno::ECHILD) => None,
        Err(e) => {
            warn!(%pid, "waitpid failed: {}", e);
            None
        }
    }
}

/// Zero signal probe, true if a process with this pid still exists
pub fn is_alive(pid: Pid) -> bool {
    match kill(pid, None::<Signal>) {
        Ok(()) => true,
        // exists, but belongs to someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Asks the process to exit
pub fn terminate(pid: Pid) -> Result<(), Error> {
    kill(pid, Signal::SIGTERM).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_for_exit(pid: Pid) -> Option<ExitStatus> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(status) = reap(pid) {
                return Some(status);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_spawn_and_reap() {
        let spec = ProgramSpec::new("exit3", "/bin/sh").args(vec!["-c", "exit 3"]);
        let pid = spawn(&spec).unwrap();

        assert_eq!(wait_for_exit(pid), Some(ExitStatus::Code(3)));
        assert!(!is_alive(pid));
        assert_eq!(reap(pid), None);
    }

    #[test]
    fn test_argv0_is_program_name() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("argv0");
        let spec = ProgramSpec::new("my-name", "/bin/sh").args(vec![
            "-c".to_string(),
            format!("echo \"$0\" > {}", out.display()),
        ]);

        let pid = spawn(&spec).unwrap();
        assert_eq!(wait_for_exit(pid), Some(ExitStatus::Code(0)));
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "my-name");
    }

    #[test]
    fn test_terminate() {
        let spec = ProgramSpec::new("sleeper", "/bin/sleep").args(vec!["30"]);
        let pid = spawn(&spec).unwrap();

        assert!(is_alive(pid));
        assert_eq!(reap(pid), None);

        terminate(pid).unwrap();
        assert_eq!(
            wait_for_exit(pid),
            Some(ExitStatus::Signal(Signal::SIGTERM))
        );
    }

    #[test]
    fn test_missing_executable() {
        let spec = ProgramSpec::new("missing", "/nonexistent/program");

        let err = check_executable(&spec).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::ErrorKind::Spawn { program, .. } if program == "missing"
        ));
        assert!(spawn(&spec).is_err());
    }
}
