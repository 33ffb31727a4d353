//! `state` handler.

use std::sync::Arc;

use serde::Serialize;
use yolocal_core::{
    Coordinator, CoordinatorConfig, CoreError, DeviceDescriptor, DeviceState, SyncStatus,
};

use crate::cli::{GlobalOpts, StateArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct DeviceView {
    device: Arc<DeviceDescriptor>,
    state: Arc<DeviceState>,
}

fn detail(view: &DeviceView) -> String {
    let d = &view.device;
    let s = &view.state;
    let time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "-".into(), |t| t.to_rfc3339())
    };

    let mut lines = vec![
        format!("ID:       {}", d.id),
        format!("Name:     {}", d.name),
        format!("Type:     {}", d.display_type),
        format!("Model:    {}", d.model.as_deref().unwrap_or("-")),
        format!("Status:   {}", s.status),
        format!("Updated:  {}", time(s.last_updated)),
        format!("Received: {}", time(s.received_at)),
    ];
    if !s.attributes.is_empty() {
        lines.push(String::new());
        let width = s.attributes.keys().map(String::len).max().unwrap_or(0);
        for (name, value) in &s.attributes {
            lines.push(format!("{name:<width$}  {value}"));
        }
    }
    lines.join("\n")
}

pub async fn handle(
    args: &StateArgs,
    config: CoordinatorConfig,
    profile: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let target = args.device.clone();
    let view = Coordinator::oneshot(config, |coordinator| async move {
        let device = coordinator.find_device(&target)?;
        let state = match coordinator.state(&device.id) {
            None => {
                return Err(CoreError::Unsupported {
                    operation: "state".into(),
                    device_type: device.display_type.clone(),
                });
            }
            // The initial fetch failed; retry once to surface the cause.
            Some(s) if s.status == SyncStatus::Unknown => {
                coordinator.refresh_device(&device.id).await?
            }
            Some(s) => s,
        };
        Ok(DeviceView { device, state })
    })
    .await
    .map_err(|e| CliError::from_core(e, profile))?;

    let rendered = output::render_single(global.output, &view, detail, |v| {
        v.state
            .get("state")
            .map_or_else(|| v.state.status.to_string(), ToString::to_string)
    })?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
