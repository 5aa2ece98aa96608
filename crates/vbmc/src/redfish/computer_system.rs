/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::borrow::Cow;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::facade::PowerState;
use crate::json::{JsonExt, JsonPatch};
use crate::machine::{BootDeviceCode, Machine};

use super::{bios, chassis, manager, not_found, storage, Collection, RedfishError, RedfishState, Resource};

const RESET_TYPES: [&str; 7] = [
    "On",
    "ForceOff",
    "GracefulShutdown",
    "GracefulRestart",
    "ForceRestart",
    "PushPowerButton",
    "PowerCycle",
];

const BOOT_TARGETS: [&str; 7] = ["None", "Pxe", "Hdd", "Cd", "BiosSetup", "Floppy", "Diags"];

pub fn collection<'a>() -> Collection<'a> {
    Collection {
        odata_id: Cow::Borrowed("/redfish/v1/Systems"),
        odata_type: Cow::Borrowed("#ComputerSystemCollection.ComputerSystemCollection"),
        name: Cow::Borrowed("Computer System Collection"),
    }
}

pub fn resource<'a>(system_id: &'a str) -> Resource<'a> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Systems/{system_id}")),
        odata_type: Cow::Borrowed("#ComputerSystem.v1_13_0.ComputerSystem"),
        id: Cow::Borrowed(system_id),
        name: Cow::Owned(format!("System {system_id}")),
    }
}

pub fn reset_target(resource: &Resource<'_>) -> String {
    format!("{}/Actions/ComputerSystem.Reset", resource.odata_id)
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/Systems", get(get_collection))
        .route(
            "/redfish/v1/Systems/{system_id}",
            get(get_system).patch(patch_system),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Actions/ComputerSystem.Reset",
            post(post_reset),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Processors",
            get(get_processors),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Processors/CPU1",
            get(get_processor),
        )
        .route("/redfish/v1/Systems/{system_id}/Memory", get(get_memory))
        .route(
            "/redfish/v1/Systems/{system_id}/Memory/DIMM1",
            get(get_dimm),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/EthernetInterfaces",
            get(get_ethernet_interfaces),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/EthernetInterfaces/NIC1",
            get(get_ethernet_interface),
        )
}

async fn get_collection(State(state): State<RedfishState>) -> Response {
    let members: Vec<Value> = state
        .machines
        .names()
        .into_iter()
        .map(|name| resource(name).entity_ref())
        .collect();
    collection().with_members(&members).into_ok_response()
}

async fn get_system(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
) -> Response {
    let Some(machine) = state.machines.get(&system_id) else {
        return not_found();
    };
    render_system(&state, machine, &system_id).into_ok_response()
}

fn render_system(state: &RedfishState, machine: &Machine, system_id: &str) -> Value {
    let res = resource(system_id);
    let boot = machine.boot_selection();
    let power = machine.power_state(state.facade.as_ref());
    res.json_patch()
        .patch(json!({
            "SystemType": "Physical",
            "Manufacturer": "Generic",
            "Model": "Virtual Server",
            "SerialNumber": format!("VB-{system_id}"),
            "PowerState": power.redfish_name(),
            "Status": {"State": "Enabled", "Health": "OK"},
            "Boot": {
                "BootSourceOverrideTarget": boot.device.redfish_target(),
                "BootSourceOverrideEnabled": boot.redfish_enabled(),
                "BootSourceOverrideTarget@Redfish.AllowableValues": BOOT_TARGETS,
            },
            "ProcessorSummary": {"Count": 4, "Model": "Virtual CPU"},
            "MemorySummary": {"TotalSystemMemoryGiB": 16},
            "Actions": {
                "#ComputerSystem.Reset": {
                    "target": reset_target(&res),
                    "ResetType@Redfish.AllowableValues": RESET_TYPES,
                }
            },
            "Links": {
                "Chassis": [chassis::resource(&machine.identity.chassis_id()).entity_ref()],
                "ManagedBy": [manager::resource(&machine.identity.manager_id()).entity_ref()],
            },
        }))
        .patch(bios::resource(system_id).nav_property("Bios"))
        .patch(bios::secure_boot_resource(system_id).nav_property("SecureBoot"))
        .patch(storage::collection(system_id).nav_property("Storage"))
        .patch(processors_collection(system_id).nav_property("Processors"))
        .patch(memory_collection(system_id).nav_property("Memory"))
        .patch(ethernet_collection(system_id).nav_property("EthernetInterfaces"))
}

async fn patch_system(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, RedfishError> {
    let Some(machine) = state.machines.get(&system_id) else {
        return Err(RedfishError::NotFound);
    };
    if let Some(boot) = body.get("Boot") {
        let mut selection = machine.boot_selection();
        if let Some(target) = boot.get("BootSourceOverrideTarget").and_then(Value::as_str) {
            let device = BootDeviceCode::from_redfish_target(target).ok_or_else(|| {
                RedfishError::BadRequest(format!("unsupported BootSourceOverrideTarget {target}"))
            })?;
            selection.device = device;
            selection.valid = device != BootDeviceCode::NoOverride;
        }
        if let Some(enabled) = boot.get("BootSourceOverrideEnabled").and_then(Value::as_str) {
            match enabled {
                "Disabled" => selection.valid = false,
                "Once" => {
                    selection.valid = true;
                    selection.persistent = false;
                }
                "Continuous" => {
                    selection.valid = true;
                    selection.persistent = true;
                }
                other => {
                    return Err(RedfishError::BadRequest(format!(
                        "unsupported BootSourceOverrideEnabled {other}"
                    )));
                }
            }
        }
        state
            .facade
            .set_boot_device(machine.name(), selection.device.facade_target())?;
        machine.set_boot_selection(selection);
        info!(machine = %machine.name(), device = ?selection.device, "boot override patched");
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn post_reset(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, RedfishError> {
    let Some(machine) = state.machines.get(&system_id) else {
        return Err(RedfishError::NotFound);
    };
    let reset_type = body
        .get("ResetType")
        .and_then(Value::as_str)
        .ok_or_else(|| RedfishError::BadRequest("ResetType is required".to_string()))?;
    let facade = state.facade.as_ref();
    let name = machine.name();
    match reset_type {
        "On" => facade.power_on(name)?,
        "ForceOff" => facade.power_off(name)?,
        "GracefulShutdown" => facade.graceful_shutdown(name)?,
        "GracefulRestart" | "ForceRestart" => facade.reset(name)?,
        "PowerCycle" => {
            facade.power_off(name)?;
            facade.power_on(name)?;
        }
        "PushPowerButton" => match machine.power_state(facade) {
            PowerState::On => facade.power_off(name)?,
            _ => facade.power_on(name)?,
        },
        other => {
            return Err(RedfishError::BadRequest(format!(
                "unsupported ResetType {other}"
            )));
        }
    }
    machine.invalidate_power();
    info!(machine = %name, reset_type, "system reset requested");
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn processors_collection(system_id: &str) -> Collection<'_> {
    Collection {
        odata_id: Cow::Owned(format!("/redfish/v1/Systems/{system_id}/Processors")),
        odata_type: Cow::Borrowed("#ProcessorCollection.ProcessorCollection"),
        name: Cow::Borrowed("Processor Collection"),
    }
}

fn memory_collection(system_id: &str) -> Collection<'_> {
    Collection {
        odata_id: Cow::Owned(format!("/redfish/v1/Systems/{system_id}/Memory")),
        odata_type: Cow::Borrowed("#MemoryCollection.MemoryCollection"),
        name: Cow::Borrowed("Memory Collection"),
    }
}

fn ethernet_collection(system_id: &str) -> Collection<'_> {
    Collection {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Systems/{system_id}/EthernetInterfaces"
        )),
        odata_type: Cow::Borrowed("#EthernetInterfaceCollection.EthernetInterfaceCollection"),
        name: Cow::Borrowed("Ethernet Interface Collection"),
    }
}

async fn get_processors(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    let member = json!({"@odata.id": format!("/redfish/v1/Systems/{system_id}/Processors/CPU1")});
    processors_collection(&system_id)
        .with_members(&[member])
        .into_ok_response()
}

async fn get_processor(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Systems/{system_id}/Processors/CPU1")),
        odata_type: Cow::Borrowed("#Processor.v1_12_0.Processor"),
        id: Cow::Borrowed("CPU1"),
        name: Cow::Borrowed("Processor"),
    }
    .json_patch()
    .patch(json!({
        "ProcessorType": "CPU",
        "Model": "Virtual CPU",
        "TotalCores": 4,
        "TotalThreads": 4,
        "Status": {"State": "Enabled", "Health": "OK"},
    }))
    .into_ok_response()
}

async fn get_memory(State(state): State<RedfishState>, Path(system_id): Path<String>) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    let member = json!({"@odata.id": format!("/redfish/v1/Systems/{system_id}/Memory/DIMM1")});
    memory_collection(&system_id)
        .with_members(&[member])
        .into_ok_response()
}

async fn get_dimm(State(state): State<RedfishState>, Path(system_id): Path<String>) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Systems/{system_id}/Memory/DIMM1")),
        odata_type: Cow::Borrowed("#Memory.v1_10_0.Memory"),
        id: Cow::Borrowed("DIMM1"),
        name: Cow::Borrowed("Memory Module"),
    }
    .json_patch()
    .patch(json!({
        "CapacityMiB": 16384,
        "MemoryDeviceType": "DDR4",
        "Status": {"State": "Enabled", "Health": "OK"},
    }))
    .into_ok_response()
}

async fn get_ethernet_interfaces(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    let member = json!({
        "@odata.id": format!("/redfish/v1/Systems/{system_id}/EthernetInterfaces/NIC1")
    });
    ethernet_collection(&system_id)
        .with_members(&[member])
        .into_ok_response()
}

async fn get_ethernet_interface(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    Resource {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Systems/{system_id}/EthernetInterfaces/NIC1"
        )),
        odata_type: Cow::Borrowed("#EthernetInterface.v1_6_0.EthernetInterface"),
        id: Cow::Borrowed("NIC1"),
        name: Cow::Borrowed("Ethernet Interface"),
    }
    .json_patch()
    .patch(json!({
        "MACAddress": "00:1A:2B:3C:4D:5E",
        "SpeedMbps": 10000,
        "LinkStatus": "LinkUp",
        "Status": {"State": "Enabled", "Health": "OK"},
    }))
    .into_ok_response()
}
