//! Minimal CLI parsing for subcommands and setting overrides
//!
//! Precedence from lowest to highest: configuration defaults, config file,
//! environment variables, flags. Flags are parsed by hand; the surface is
//! small enough that an argument-parser dependency buys nothing.

use std::env;
use std::path::PathBuf;

use crate::config::LinkMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Run a pass (default), or watch when enabled.
    #[default]
    Run,
    /// Load and validate the configuration, then exit.
    ValidateConfig,
    /// Fire the configured library-refresh trigger and exit.
    TriggerRefresh,
}

#[derive(Debug, Default)]
pub struct CliOptions {
    pub command: Command,
    pub config_path: Option<PathBuf>,
    pub dry_run: Option<bool>,
    pub link_mode: Option<LinkMode>,
    pub watch: Option<bool>,
    pub reprocess: bool,
    pub trace: bool,
    pub print_help: bool,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "run" => options.command = Command::Run,
                "validate-config" => options.command = Command::ValidateConfig,
                "trigger-refresh" => options.command = Command::TriggerRefresh,
                "--config" | "-c" => {
                    if let Some(value) = args.next() {
                        options.config_path = Some(PathBuf::from(value));
                    }
                }
                "--dry-run" => options.dry_run = Some(true),
                "--no-dry-run" => options.dry_run = Some(false),
                "--link-mode" => {
                    if let Some(value) = args.next() {
                        options.link_mode = LinkMode::parse(&value);
                    }
                }
                "--watch" => options.watch = Some(true),
                "--no-watch" => options.watch = Some(false),
                "--reprocess" => options.reprocess = true,
                "--trace" => options.trace = true,
                "--help" | "-h" => options.print_help = true,
                _ if arg.starts_with("--config=") => {
                    if let Some((_, value)) = arg.split_once('=') {
                        options.config_path = Some(PathBuf::from(value));
                    }
                }
                _ if arg.starts_with("--link-mode=") => {
                    if let Some((_, value)) = arg.split_once('=') {
                        options.link_mode = LinkMode::parse(value);
                    }
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    options.print_help = true;
                }
            }
        }
        options
    }

    /// Where to find the config file: flag, then env, then ./sideline.toml.
    pub fn resolved_config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .or_else(|| env::var("SIDELINE_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("sideline.toml"))
    }
}

pub const USAGE: &str = "\
sideline - sports video library organizer

Usage: sideline [COMMAND] [OPTIONS]

Commands:
  run               Process the source tree (default)
  validate-config   Check the configuration and exit
  trigger-refresh   Fire the library-refresh trigger and exit

Options:
  -c, --config <PATH>     Configuration file (default: sideline.toml)
      --dry-run           Render destinations without touching the filesystem
      --link-mode <MODE>  hardlink | copy | symlink
      --watch             Watch the source tree and process on changes
      --reprocess         Ignore the processed-file cache for this run
      --trace             Write per-file trace artifacts to the cache dir
  -h, --help              Show this help
";
