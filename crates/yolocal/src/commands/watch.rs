//! `watch` handler: stream state changes until interrupted.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use yolocal_core::{Coordinator, CoordinatorConfig, DeviceId, StateChange};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One line per change: changed attributes, or the new status when only
/// the freshness status moved.
fn change_line(change: &StateChange) -> String {
    let time = change
        .state
        .last_updated
        .map_or_else(|| "-".into(), |t| t.to_rfc3339());

    let detail = if change.changed.is_empty() {
        format!("status={}", change.state.status)
    } else {
        change
            .changed
            .iter()
            .map(|name| {
                change
                    .state
                    .get(name)
                    .map_or_else(|| format!("{name}=<removed>"), |v| format!("{name}={v}"))
            })
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!("{time} {} {detail}", change.device_id)
}

fn render(change: &StateChange, format: OutputFormat) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(change)?,
        OutputFormat::Table | OutputFormat::Plain => change_line(change),
    })
}

pub async fn handle(
    args: &WatchArgs,
    mut config: CoordinatorConfig,
    profile: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    config.events_enabled = true;
    let coordinator = Coordinator::new(config);
    coordinator
        .connect()
        .await
        .map_err(|e| CliError::from_core(e, profile))?;

    let result = watch_loop(&coordinator, args, profile, global).await;
    coordinator.disconnect().await;
    result
}

async fn watch_loop(
    coordinator: &Coordinator,
    args: &WatchArgs,
    profile: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let filter: Option<DeviceId> = match &args.device {
        Some(target) => Some(
            coordinator
                .find_device(target)
                .map_err(|e| CliError::from_core(e, profile))?
                .id
                .clone(),
        ),
        None => None,
    };

    let mut changes = coordinator.subscribe_changes();
    let deadline = args
        .max_wait
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            () = expired => {
                return match (args.until_change, args.max_wait) {
                    (true, Some(seconds)) => Err(CliError::Timeout { seconds }),
                    _ => Ok(()),
                };
            }
            received = changes.recv() => match received {
                Ok(change) => {
                    if filter.as_ref().is_some_and(|id| *id != change.device_id) {
                        continue;
                    }
                    output::print_output(&render(&change, global.output)?, global.quiet);
                    if args.until_change && !change.changed.is_empty() {
                        return Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change stream lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}
