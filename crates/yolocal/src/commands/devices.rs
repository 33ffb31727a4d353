//! `devices` handler.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use yolocal_core::{Coordinator, CoordinatorConfig, DeviceDescriptor};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Parent")]
    parent: String,
}

impl From<&Arc<DeviceDescriptor>> for DeviceRow {
    fn from(d: &Arc<DeviceDescriptor>) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            dtype: d.display_type.clone(),
            model: d.model.clone().unwrap_or_default(),
            parent: d.parent_id.as_ref().map(ToString::to_string).unwrap_or_default(),
        }
    }
}

/// One row of `devices --types`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Tabled)]
struct TypeRow {
    #[tabled(rename = "Type")]
    #[serde(rename = "type")]
    dtype: String,
    #[tabled(rename = "Model")]
    model: String,
}

/// Unique (display type, model) pairs, sorted.
fn type_pairs(devices: &[Arc<DeviceDescriptor>]) -> Vec<TypeRow> {
    devices
        .iter()
        .map(|d| TypeRow {
            dtype: d.display_type.clone(),
            model: d.model.clone().unwrap_or_else(|| "unknown".into()),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub async fn handle(
    args: &DevicesArgs,
    config: CoordinatorConfig,
    profile: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let include_all = args.all || args.types;
    let devices = Coordinator::oneshot(config, |coordinator| async move {
        Ok(if include_all {
            coordinator.all_devices().as_ref().clone()
        } else {
            coordinator.devices()
        })
    })
    .await
    .map_err(|e| CliError::from_core(e, profile))?;

    let rendered = if args.types {
        output::render_list(
            global.output,
            &type_pairs(&devices),
            TypeRow::clone,
            |t| format!("{}\t{}", t.dtype, t.model),
        )?
    } else {
        output::render_list(
            global.output,
            &devices,
            |d| DeviceRow::from(d),
            |d| d.id.to_string(),
        )?
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}
