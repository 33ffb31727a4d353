//! `command` handler.

use yolocal_core::{CommandResult, Coordinator, CoordinatorConfig, DeviceCommand};

use crate::cli::{CommandArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

fn detail(result: &CommandResult) -> String {
    let mut lines = vec![
        format!("Device:  {}", result.device_id),
        format!("Command: {}", result.command),
        format!("Method:  {}", result.method),
    ];
    if let Some(t) = result.hub_time {
        lines.push(format!("Hub time: {}", t.to_rfc3339()));
    }
    if !result.data.is_null() {
        lines.push(format!("Reply:   {}", result.data));
    }
    lines.join("\n")
}

pub async fn handle(
    args: &CommandArgs,
    config: CoordinatorConfig,
    profile: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let target = args.device.clone();
    let command = DeviceCommand::from(args.action);

    let result = Coordinator::oneshot(config, |coordinator| async move {
        let device = coordinator.find_device(&target)?;
        coordinator.send_command(&device.id, command).await
    })
    .await
    .map_err(|e| CliError::from_core(e, profile))?;

    let rendered = output::render_single(global.output, &result, detail, |r| {
        r.command.to_string()
    })?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
