// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Client side of the control socket, for tools that cooperate with a running launcher

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::{decode_line, encode_line, Command, ERROR};
use crate::resolution::Resolution;
use crate::Error;

/// Send one request and collect every response line
///
/// An `error` response from the launcher is turned into an `Err`.
pub async fn request(path: &Path, command: &str, args: &[&str]) -> Result<Vec<Vec<String>>, Error> {
    let mut tokens = Vec::with_capacity(args.len() + 1);
    tokens.push(command);
    tokens.extend_from_slice(args);

    let mut stream = UnixStream::connect(path)
        .await
        .map_err(|e| format!("could not connect to {}: {}", path.display(), e))?;
    stream.write_all(encode_line(&tokens).as_bytes()).await?;
    stream.shutdown().await?;

    let mut lines = BufReader::new(stream).lines();
    let mut response = Vec::new();
    while let Some(line) = lines.next_line().await? {
        response.push(decode_line(&line)?);
    }

    if let Some(first) = response.first() {
        if first.first().map(String::as_str) == Some(ERROR) {
            let reason = first.get(1).cloned().unwrap_or_default();
            return Err(Error::protocol(reason));
        }
    }

    Ok(response)
}

async fn send(path: &Path, command: &Command) -> Result<Vec<Vec<String>>, Error> {
    let tokens = decode_line(&command.to_line())?;
    let (name, args) = tokens
        .split_first()
        .ok_or_else(|| Error::protocol("empty request"))?;
    let args = args.iter().map(String::as_str).collect::<Vec<_>>();

    request(path, name, &args).await
}

/// `(name, pid)` of each program the launcher is running, oldest first
pub async fn list_processes(path: &Path) -> Result<Vec<(String, libc::pid_t)>, Error> {
    send(path, &Command::ListProcesses)
        .await?
        .into_iter()
        .map(|line| match line.as_slice() {
            [name, pid] => pid
                .parse::<libc::pid_t>()
                .map(|pid| (name.clone(), pid))
                .map_err(|e| Error::protocol(format!("bad pid {:?}: {}", pid, e))),
            _ => Err(Error::protocol(format!("unexpected process line: {:?}", line))),
        })
        .collect()
}

pub async fn font_size(path: &Path) -> Result<u32, Error> {
    let response = send(path, &Command::ShowFontSize).await?;
    single_token(&response)?
        .parse()
        .map_err(|e| Error::protocol(format!("bad font size: {}", e)))
}

pub async fn conf_path(path: &Path) -> Result<PathBuf, Error> {
    let response = send(path, &Command::ShowConfPath).await?;
    single_token(&response).map(PathBuf::from)
}

/// `target` is a program name or `general`
pub async fn update_resolution(
    path: &Path,
    target: &str,
    resolution: Resolution,
) -> Result<(), Error> {
    send(
        path,
        &Command::UpdateRes {
            target: target.to_string(),
            resolution,
        },
    )
    .await
    .map(|_| ())
}

fn single_token(response: &[Vec<String>]) -> Result<&str, Error> {
    match response {
        [line] if line.len() == 1 => Ok(&line[0]),
        _ => Err(Error::protocol(format!(
            "expected a single value, got {:?}",
            response
        ))),
    }
}
