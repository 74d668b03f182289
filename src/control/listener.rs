// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fs;
use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{encode_line, error_line, Command, MAX_REQUEST_LEN};
use crate::config::Config;
use crate::procs::Supervisor;
use crate::Error;

/// Values the listener reports that do not live in the supervisor
#[derive(Clone, Debug)]
pub struct Settings {
    pub font_size: u32,
    pub conf_path: PathBuf,
    /// How long a client may take to send its request line
    pub request_timeout: Duration,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            font_size: config.font_size,
            conf_path: config.conf_path.clone(),
            request_timeout: config.request_timeout,
        }
    }
}

/// Serves control requests, one connection at a time
///
/// The socket file is removed when the listener is dropped.
#[derive(Debug)]
pub struct ControlListener {
    listener: UnixListener,
    path: PathBuf,
    settings: Settings,
}

impl ControlListener {
    /// Must be called from within the runtime
    ///
    /// A leftover socket file from an earlier run is replaced, a live one is an error.
    pub fn bind(path: &Path, settings: Settings) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if path.exists() {
            if StdUnixStream::connect(path).is_ok() {
                return Err(Error::from(format!(
                    "{} is in use by another launcher",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "removing stale control socket");
            fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)
            .map_err(|e| format!("could not bind {}: {}", path.display(), e))?;
        info!(path = %path.display(), "control socket listening");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Accept one connection and serve it to completion
    pub async fn handle_next(&self, supervisor: &mut Supervisor) -> Result<(), Error> {
        let stream = self.accept().await?;
        self.handle(stream, supervisor).await
    }

    /// Read one request line, answer it, close the connection
    pub async fn handle(
        &self,
        mut stream: UnixStream,
        supervisor: &mut Supervisor,
    ) -> Result<(), Error> {
        let (read, mut write) = stream.split();
        let mut reader = BufReader::new(read.take(MAX_REQUEST_LEN as u64));
        let mut line = String::new();

        let response = match timeout(self.settings.request_timeout, reader.read_line(&mut line)).await
        {
            Err(_) => vec![error_line(&Error::protocol("timed out waiting for request"))],
            Ok(Ok(0)) => {
                debug!("client closed without a request");
                return Ok(());
            }
            Ok(Ok(len)) if len >= MAX_REQUEST_LEN && !line.ends_with('\n') => {
                vec![error_line(&Error::protocol("request too long"))]
            }
            Ok(Ok(_)) => respond(&line, supervisor, &self.settings),
            Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                vec![error_line(&Error::protocol("request is not utf-8"))]
            }
            Ok(Err(e)) => return Err(e.into()),
        };

        for tokens in response {
            write.write_all(encode_line(&tokens).as_bytes()).await?;
        }
        write.shutdown().await?;

        Ok(())
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        fs::remove_file(&self.path)
            .map_err(|e| debug!(path = %self.path.display(), "could not remove socket: {}", e))
            .ok();
    }
}

/// Execute one request line, returning the response lines
pub fn respond(line: &str, supervisor: &mut Supervisor, settings: &Settings) -> Vec<Vec<String>> {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            warn!(request = %line.trim_end(), "{}", e);
            return vec![error_line(&e)];
        }
    };
    debug!(%command, "control request");

    match command {
        Command::ListProcesses => supervisor
            .list_running()
            .into_iter()
            .map(|(name, pid)| vec![name, pid.to_string()])
            .collect(),
        Command::ShowFontSize => vec![vec![settings.font_size.to_string()]],
        Command::ShowConfPath => vec![vec![settings.conf_path.display().to_string()]],
        Command::UpdateRes { target, resolution } => {
            match supervisor.update_resolution(&target, resolution) {
                Ok(()) => Vec::new(),
                Err(e) => {
                    warn!(%target, "{}", e);
                    vec![error_line(&e)]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{NoResolution, Resolution};

    fn settings() -> Settings {
        Settings {
            font_size: 14,
            conf_path: PathBuf::from("/etc/kiosklaunch.toml"),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn supervisor() -> Supervisor {
        Supervisor::new(Vec::new(), Box::new(NoResolution))
    }

    #[test]
    fn test_respond_show() {
        let mut sup = supervisor();

        assert_eq!(
            respond("::showfontsize\n", &mut sup, &settings()),
            vec![vec!["14".to_string()]]
        );
        assert_eq!(
            respond("::showconfpath\n", &mut sup, &settings()),
            vec![vec!["/etc/kiosklaunch.toml".to_string()]]
        );
        assert!(respond("::listprocesses\n", &mut sup, &settings()).is_empty());
    }

    #[test]
    fn test_respond_updateres() {
        let mut sup = supervisor();

        assert!(respond("::updateres::general::1024::768\n", &mut sup, &settings()).is_empty());
        assert_eq!(sup.resolution().default, Some(Resolution::new(1024, 768)));

        let response = respond("::updateres::nope::1024::768\n", &mut sup, &settings());
        assert_eq!(response.len(), 1);
        assert_eq!(response[0][0], crate::control::ERROR);
    }

    #[test]
    fn test_respond_unknown() {
        let mut sup = supervisor();

        let response = respond("::reboot\n", &mut sup, &settings());
        assert_eq!(response.len(), 1);
        assert_eq!(response[0][0], crate::control::ERROR);

        let response = respond("garbage\n", &mut sup, &settings());
        assert_eq!(response[0][0], crate::control::ERROR);
    }
}
