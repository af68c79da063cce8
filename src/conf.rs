//! The Serializable configuration data structures used for setup.
//!
//! An optional file supplies the base values; command line flags override
//! them. The result is immutable for the life of the agent.
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use nix::unistd::getuid;
use serde::{Deserialize, Serialize};

use crate::{cli::Cli, error::ConfigError};

#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Draw diagnostics on the session surface only
    #[serde(rename = "X")]
    #[value(name = "X")]
    Surface,
    Stdout,
    #[default]
    Both,
    None,
}

impl Verbosity {
    pub fn console(self) -> bool {
        matches!(self, Self::Stdout | Self::Both)
    }

    pub fn surface(self) -> bool {
        matches!(self, Self::Surface | Self::Both)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeysConf {
    #[serde(default = "default_quit_key")]
    pub quit: String,

    #[serde(default = "default_abort_key")]
    pub abort: String,

    #[serde(default = "default_kill_key")]
    pub kill: String,

    #[serde(default = "default_terminate_key")]
    pub terminate: String,
}

impl Default for KeysConf {
    fn default() -> Self {
        Self {
            quit: default_quit_key(),
            abort: default_abort_key(),
            kill: default_kill_key(),
            terminate: default_terminate_key(),
        }
    }
}

/// What a configuration file may contain. Every key is optional.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConf {
    #[serde(default)]
    pub exec: Vec<String>,

    #[serde(default = "default_true")]
    pub autostart: bool,

    #[serde(default = "default_true")]
    pub autodetect: bool,

    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub verbosity: Verbosity,

    #[serde(default)]
    pub control: Option<PathBuf>,

    #[serde(default = "default_surface")]
    pub surface: PathBuf,

    #[serde(default)]
    pub keys: KeysConf,
}

impl Default for FileConf {
    fn default() -> Self {
        Self {
            exec: Vec::new(),
            autostart: default_true(),
            autodetect: default_true(),
            output: None,
            verbosity: Verbosity::default(),
            control: None,
            surface: default_surface(),
            keys: KeysConf::default(),
        }
    }
}

impl FileConf {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text).map_err(|e| parse_err(e.to_string())),
            Some("json") => serde_json::from_str(&text).map_err(|e| parse_err(e.to_string())),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&text).map_err(|e| parse_err(e.to_string()))
            }
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Window manager executable followed by its arguments.
    pub command: Vec<String>,
    pub autostart: bool,
    pub autodetect: bool,
    pub output: Option<PathBuf>,
    pub verbosity: Verbosity,
    pub control: PathBuf,
    pub surface: PathBuf,
    pub keys: KeysConf,
}

impl Config {
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConf::read(path)?,
            None => FileConf::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: Cli, file: FileConf) -> Result<Self, ConfigError> {
        let command = if cli.command.is_empty() {
            file.exec
        } else {
            cli.command
        };
        if command.is_empty() {
            return Err(ConfigError::MissingCommand);
        }

        Ok(Self {
            command,
            autostart: file.autostart && !cli.omit_autostart,
            autodetect: file.autodetect && !cli.no_autodetect,
            output: cli.output.or(file.output),
            verbosity: cli.verbosity.unwrap_or(file.verbosity),
            control: cli
                .control
                .or(file.control)
                .unwrap_or_else(default_control_path),
            surface: file.surface,
            keys: file.keys,
        })
    }

    /// Name of the supervised program, for diagnostics.
    pub fn wm(&self) -> &str {
        &self.command[0]
    }
}

fn default_true() -> bool {
    true
}

fn default_surface() -> PathBuf {
    PathBuf::from("/dev/tty")
}

fn default_control_path() -> PathBuf {
    match env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("wmagent.ctl"),
        _ => PathBuf::from(format!("/tmp/wmagent-{}.ctl", getuid())),
    }
}

fn default_quit_key() -> String {
    "C-S-Escape".into()
}

fn default_abort_key() -> String {
    "C-S-F6".into()
}

fn default_kill_key() -> String {
    "C-S-F9".into()
}

fn default_terminate_key() -> String {
    "C-S-F11".into()
}
