//! Uses clap to define the CLI interface declaratively.
use std::path::PathBuf;

use clap::Parser;

use crate::conf::Verbosity;

#[derive(Parser, Debug)]
#[command(version, about = "Session agent keeping a window manager alive", long_about = None)]
pub struct Cli {
    /// Omit starting <WM> on start
    #[arg(short = 'o')]
    pub omit_autostart: bool,

    /// Do not autostart a new <WM> when the old one exits
    #[arg(short = 'n')]
    pub no_autodetect: bool,

    /// Output file <WM> directs its stdout/stderr to
    #[arg(short = 'f', value_name = "OUTFILE")]
    pub output: Option<PathBuf>,

    /// Where diagnostics go. Default is 'both'
    #[arg(short = 'v', value_enum, value_name = "X|stdout|both|none")]
    pub verbosity: Option<Verbosity>,

    /// Configuration file (.toml, .json, .yaml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Named pipe hotkey chords are read from
    #[arg(long, value_name = "FIFO")]
    pub control: Option<PathBuf>,

    /// <WM> and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "WM")]
    pub command: Vec<String>,
}
