// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tokio::runtime;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use kiosklaunch::applet::Registry;
use kiosklaunch::config::{self, Config};
use kiosklaunch::control::client;
use kiosklaunch::event_loop;
use kiosklaunch::resolution::{NoResolution, ResolutionManager, Xrandr};
use kiosklaunch::ui::LogPanel;
use kiosklaunch::Error;

const RUN: &str = "run";
const CTL: &str = "ctl";

const CONFIG: &str = "config";
const SOCKET: &str = "socket";
const LOG_LEVEL: &str = "log-level";
const NO_RESOLUTION: &str = "no-resolution";
const REQUEST: &str = "request";
const ARGS: &str = "args";

const DEFAULT_CONFIG: &str = "/etc/kiosklaunch.toml";

const APPLETS_HELP: &str = "Applets are compiled in through `kiosklaunch::applet::Registry`. \
This binary registers none, so every [[module]] in the configuration is skipped with a warning.";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl SetupClapApp for Command {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }
}

fn run_sub_command() -> Command {
    Command::new(RUN)
        .about("start the launcher")
        .after_help(APPLETS_HELP)
        .arg(
            Arg::new(CONFIG)
                .short('c')
                .long(CONFIG)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_CONFIG)
                .help("launcher configuration file"),
        )
        .arg(
            Arg::new(NO_RESOLUTION)
                .long(NO_RESOLUTION)
                .action(ArgAction::SetTrue)
                .help("never switch the display resolution"),
        )
}

fn ctl_sub_command() -> Command {
    Command::new(CTL)
        .about("send a request to a running launcher")
        .arg(
            Arg::new(SOCKET)
                .short('s')
                .long(SOCKET)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("control socket of the launcher, defaults to the one in the cache directory"),
        )
        .arg(
            Arg::new(REQUEST)
                .required(true)
                .value_name("COMMAND")
                .help("listprocesses, showfontsize, showconfpath or updateres"),
        )
        .arg(
            Arg::new(ARGS)
                .num_args(0..)
                .value_name("ARGS")
                .help("arguments of the command, e.g. `general 1024 768` for updateres"),
        )
}

fn main() -> Result<(), Error> {
    let args = Command::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("LEVEL")
                .default_value("info")
                .global(true)
                .help("log filter used when RUST_LOG is not set"),
        )
        .subcommand(run_sub_command().setup_clap_app())
        .subcommand(ctl_sub_command().setup_clap_app())
        .get_matches();

    let level = args
        .get_one::<String>(LOG_LEVEL)
        .map_or("info", String::as_str);
    init_logging(level);

    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to initialize Tokio Runtime");

    runtime.block_on(async move {
        match args.subcommand() {
            Some((RUN, args)) => run(args).await,
            Some((CTL, args)) => ctl(args).await,
            Some((arg, _)) => {
                println!("unexpected argument: {}", arg);
                std::process::exit(2);
            }
            None => {
                println!("command required, see --help");
                std::process::exit(1);
            }
        }
    })
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: &ArgMatches) -> Result<(), Error> {
    let path = args
        .get_one::<PathBuf>(CONFIG)
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load(&path)?;

    let manager: Box<dyn ResolutionManager> =
        if args.get_flag(NO_RESOLUTION) || std::env::var_os("DISPLAY").is_none() {
            Box::new(NoResolution)
        } else {
            Box::new(Xrandr::default())
        };

    let registry = Registry::new();
    if !config.modules.is_empty() {
        warn!(
            modules = config.modules.len(),
            "no applets are compiled into this binary, [[module]] entries are ignored"
        );
    }
    let mut panel = LogPanel;

    event_loop::run(config, &registry, manager, &mut panel)
        .await
        .map_err(|e| {
            error!("launcher failed: {}", e);
            e
        })
}

async fn ctl(args: &ArgMatches) -> Result<(), Error> {
    let socket = args
        .get_one::<PathBuf>(SOCKET)
        .cloned()
        .unwrap_or_else(|| config::default_cache_dir().join(config::SOCKET_NAME));
    let request = args
        .get_one::<String>(REQUEST)
        .ok_or("a command is required")?;
    let request_args = args
        .get_many::<String>(ARGS)
        .map(|values| values.map(String::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for line in client::request(&socket, request, &request_args).await? {
        println!("{}", line.join("\t"));
    }

    Ok(())
}
