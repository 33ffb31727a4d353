//! Clap derive structures for the `yolocal` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

use yolocal_core::DeviceCommand;

/// yolocal -- talk to a YoLink hub over the local network
#[derive(Debug, Parser)]
#[command(
    name = "yolocal",
    version,
    about = "Inspect and control devices on a local YoLink hub",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub profile to use
    #[arg(long, short = 'p', env = "YOLOCAL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// How results are printed
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Log more to stderr; repeat for debug and trace
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print nothing on success
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// HTTP request timeout in seconds (overrides profile)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// Indented JSON document
    Json,
    /// JSON on one line
    JsonCompact,
    /// Bare identifiers, newline separated
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices known to the hub
    #[command(visible_alias = "ls")]
    Devices(DevicesArgs),

    /// Fetch the current state of one device
    #[command(alias = "s")]
    State(StateArgs),

    /// Send a command to a lock, outlet, or siren
    #[command(alias = "cmd")]
    Command(CommandArgs),

    /// Stream live state changes
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Print a completion script for the given shell
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Show unique type/model pairs instead of devices
    #[arg(long)]
    pub types: bool,

    /// Include device types without state support
    #[arg(long, short = 'a')]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Device id or name
    pub device: String,
}

#[derive(Debug, Args)]
pub struct CommandArgs {
    /// Device id or name
    pub device: String,

    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Lock,
    Unlock,
    On,
    Off,
    Trigger,
    Stop,
}

impl From<Action> for DeviceCommand {
    fn from(action: Action) -> Self {
        match action {
            Action::Lock => Self::Lock,
            Action::Unlock => Self::Unlock,
            Action::On => Self::TurnOn,
            Action::Off => Self::TurnOff,
            Action::Trigger => Self::Trigger,
            Action::Stop => Self::Stop,
        }
    }
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only report changes for this device (id or name)
    pub device: Option<String>,

    /// Exit after the first change
    #[arg(long)]
    pub until_change: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub max_wait: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub what: ConfigCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Print the effective configuration with secrets masked
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
