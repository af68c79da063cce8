mod agent;
mod buffd;
mod child;
mod cli;
mod conf;
mod control;
mod diag;
mod error;
mod exec_args;
mod keys;
mod output;
mod runner;
mod sysexits;
mod watcher;

use crate::agent::Agent;
use crate::child::ChildManager;
use crate::cli::Cli;
use crate::conf::Config;
use crate::control::ControlChannel;
use crate::error::{ConfigError, StartupError};
use crate::exec_args::ExecArgs;
use crate::keys::Bindings;
use crate::sysexits::{EX_NOINPUT, EX_OK, EX_OSERR, EX_USAGE};
use crate::watcher::{AsWatcher, Watcher};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code as u8)
}

/// Brings up the event sources. The control channel is the agent's only way
/// of hearing from the operator, so any failure here is fatal.
fn setup(config: &Config, bindings: Bindings) -> Result<(Watcher, ControlChannel), StartupError> {
    let mut watcher = Watcher::new().map_err(StartupError::Watcher)?;
    for sig in runner::WATCHED_SIGNALS {
        watcher.watch_signal(sig).map_err(StartupError::Watcher)?;
    }

    let (control, fd) = ControlChannel::create(&config.control, bindings)?;
    watcher
        .watch_fd(fd, runner::CONTROL_BUFSIZE)
        .map_err(StartupError::Watcher)?;
    Ok((watcher, control))
}

fn serve(config: Config) -> ExitCode {
    let bindings = match Bindings::new(&config.keys) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("wmagent: {e}");
            return exit(EX_USAGE);
        }
    };
    let exec = match ExecArgs::new(&config.command) {
        Ok(exec) => exec,
        Err(e) => {
            eprintln!("wmagent: bad <WM> argument: {e}");
            return exit(EX_USAGE);
        }
    };

    let (mut watcher, mut control) = match setup(&config, bindings) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("- {e}");
            error!("- {e}");
            return exit(EX_NOINPUT);
        }
    };

    info!("+ Control channel {} ..", control.path().display());
    info!("  + Magic keys at {} ..", control.bindings().describe());

    let manager = ChildManager::new(exec, config.output.clone());
    let mut agent = Agent::new(manager, config.wm(), config.autodetect);

    match runner::supervise(&mut agent, &mut watcher, &mut control, config.autostart) {
        Ok(()) => exit(EX_OK),
        Err(e) => {
            error!("- Event loop failed: {e}");
            exit(EX_OSERR)
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                exit(EX_USAGE)
            } else {
                exit(EX_OK)
            };
        }
    };

    let config = match Config::load(cli) {
        Ok(config) => config,
        Err(e @ ConfigError::MissingCommand) => {
            eprintln!("wmagent: {e}, usage: wmagent [-on] [-f <outfile>] [-v X|stdout|both|none] -- <WM> [wm arguments]");
            return exit(EX_USAGE);
        }
        Err(e) => {
            eprintln!("wmagent: {e}");
            return exit(EX_USAGE);
        }
    };

    diag::init(config.verbosity, &config.surface);

    // control channel and watcher are dropped before returning, which
    // removes the pipe if we created it
    serve(config)
}
