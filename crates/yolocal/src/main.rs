mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use yolocal_core::CoordinatorConfig;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_json);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Neither needs a hub connection.
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;

            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "yolocal", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let (profile, config) = build_coordinator_config(&cli.global)?;
            tracing::debug!(command = ?cmd, %profile, "dispatching command");
            commands::dispatch(cmd, config, &profile, &cli.global).await
        }
    }
}

/// Resolve the active profile and apply CLI flag overrides.
fn build_coordinator_config(global: &GlobalOpts) -> Result<(String, CoordinatorConfig), CliError> {
    let cfg = yolocal_config::load_config()?;
    let (name, profile) = yolocal_config::select_profile(
        &cfg,
        global.profile.as_deref(),
        yolocal_config::env_profile(),
    )?;

    let mut config = yolocal_config::profile_to_coordinator_config(&profile, &name, &cfg.defaults)?;
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    Ok((name, config))
}
