//! `config` subcommands. These never touch the hub.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.what {
        ConfigCommand::Path => {
            let path = yolocal_config::config_path();
            output::print_output(&path.display().to_string(), global.quiet);
        }
        ConfigCommand::Show => {
            let cfg = yolocal_config::load_config()?;
            output::print_output(cfg.to_redacted_toml()?.trim_end(), global.quiet);
        }
    }
    Ok(())
}
