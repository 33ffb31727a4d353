//! Command dispatch.

pub mod command;
pub mod config_cmd;
pub mod devices;
pub mod state;
pub mod watch;

use yolocal_core::CoordinatorConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a hub command to its handler.
pub async fn dispatch(
    cmd: Command,
    config: CoordinatorConfig,
    profile: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(&args, config, profile, global).await,
        Command::State(args) => state::handle(&args, config, profile, global).await,
        Command::Command(args) => command::handle(&args, config, profile, global).await,
        Command::Watch(args) => watch::handle(&args, config, profile, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not use a hub connection".into(),
        )),
    }
}
