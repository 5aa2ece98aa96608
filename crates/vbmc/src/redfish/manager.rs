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

use crate::json::{JsonExt, JsonPatch};

use super::{computer_system, not_found, Collection, RedfishError, RedfishState, Resource};

const MEDIA_DEVICES: [&str; 2] = ["CD", "Floppy"];
const LOG_SERVICES: [&str; 2] = ["EventLog", "SEL"];

pub fn collection<'a>() -> Collection<'a> {
    Collection {
        odata_id: Cow::Borrowed("/redfish/v1/Managers"),
        odata_type: Cow::Borrowed("#ManagerCollection.ManagerCollection"),
        name: Cow::Borrowed("Manager Collection"),
    }
}

pub fn resource<'a>(manager_id: &'a str) -> Resource<'a> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Managers/{manager_id}")),
        odata_type: Cow::Borrowed("#Manager.v1_10_0.Manager"),
        id: Cow::Borrowed(manager_id),
        name: Cow::Borrowed("Baseboard Management Controller"),
    }
}

fn virtual_media_collection(manager_id: &str) -> Collection<'_> {
    Collection {
        odata_id: Cow::Owned(format!("/redfish/v1/Managers/{manager_id}/VirtualMedia")),
        odata_type: Cow::Borrowed("#VirtualMediaCollection.VirtualMediaCollection"),
        name: Cow::Borrowed("Virtual Media Collection"),
    }
}

fn virtual_media_resource<'a>(manager_id: &str, device: &'a str) -> Resource<'a> {
    Resource {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Managers/{manager_id}/VirtualMedia/{device}"
        )),
        odata_type: Cow::Borrowed("#VirtualMedia.v1_3_0.VirtualMedia"),
        id: Cow::Borrowed(device),
        name: Cow::Borrowed("Virtual Removable Media"),
    }
}

fn ethernet_collection(manager_id: &str) -> Collection<'_> {
    Collection {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Managers/{manager_id}/EthernetInterfaces"
        )),
        odata_type: Cow::Borrowed("#EthernetInterfaceCollection.EthernetInterfaceCollection"),
        name: Cow::Borrowed("Ethernet Interface Collection"),
    }
}

fn log_services_collection(manager_id: &str) -> Collection<'_> {
    Collection {
        odata_id: Cow::Owned(format!("/redfish/v1/Managers/{manager_id}/LogServices")),
        odata_type: Cow::Borrowed("#LogServiceCollection.LogServiceCollection"),
        name: Cow::Borrowed("Log Service Collection"),
    }
}

fn log_service_resource<'a>(manager_id: &str, log_id: &'a str) -> Resource<'a> {
    Resource {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Managers/{manager_id}/LogServices/{log_id}"
        )),
        odata_type: Cow::Borrowed("#LogService.v1_2_0.LogService"),
        id: Cow::Borrowed(log_id),
        name: Cow::Borrowed("Log Service"),
    }
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/Managers", get(get_collection))
        .route("/redfish/v1/Managers/{manager_id}", get(get_manager))
        .route(
            "/redfish/v1/Managers/{manager_id}/VirtualMedia",
            get(get_virtual_media_collection),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/VirtualMedia/{device}",
            get(get_virtual_media),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/VirtualMedia/{device}/Actions/VirtualMedia.InsertMedia",
            post(post_insert_media),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/VirtualMedia/{device}/Actions/VirtualMedia.EjectMedia",
            post(post_eject_media),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/EthernetInterfaces",
            get(get_ethernet_interfaces),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/EthernetInterfaces/NIC1",
            get(get_ethernet_interface),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/LogServices",
            get(get_log_services),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/LogServices/{log_id}",
            get(get_log_service),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/LogServices/{log_id}/Entries",
            get(get_log_entries),
        )
        .route(
            "/redfish/v1/Managers/{manager_id}/LogServices/{log_id}/Actions/LogService.ClearLog",
            post(post_clear_log),
        )
}

async fn get_collection(State(state): State<RedfishState>) -> Response {
    let members: Vec<Value> = state
        .machines
        .names()
        .into_iter()
        .map(|name| resource(&format!("{name}-bmc")).entity_ref())
        .collect();
    collection().with_members(&members).into_ok_response()
}

async fn get_manager(
    State(state): State<RedfishState>,
    Path(manager_id): Path<String>,
) -> Response {
    let Some(machine) = state.machines.by_manager_id(&manager_id) else {
        return not_found();
    };
    resource(&manager_id)
        .json_patch()
        .patch(json!({
            "ManagerType": "BMC",
            "FirmwareVersion": "0.1.0",
            "Status": {"State": "Enabled", "Health": "OK"},
            "Links": {
                "ManagerForServers": [
                    computer_system::resource(machine.identity.system_id()).entity_ref()
                ],
            },
        }))
        .patch(virtual_media_collection(&manager_id).nav_property("VirtualMedia"))
        .patch(ethernet_collection(&manager_id).nav_property("EthernetInterfaces"))
        .patch(log_services_collection(&manager_id).nav_property("LogServices"))
        .into_ok_response()
}

async fn get_virtual_media_collection(
    State(state): State<RedfishState>,
    Path(manager_id): Path<String>,
) -> Response {
    if state.machines.by_manager_id(&manager_id).is_none() {
        return not_found();
    }
    let members: Vec<Value> = MEDIA_DEVICES
        .iter()
        .map(|device| virtual_media_resource(&manager_id, device).entity_ref())
        .collect();
    virtual_media_collection(&manager_id)
        .with_members(&members)
        .into_ok_response()
}

async fn get_virtual_media(
    State(state): State<RedfishState>,
    Path((manager_id, device)): Path<(String, String)>,
) -> Response {
    let Some(machine) = state.machines.by_manager_id(&manager_id) else {
        return not_found();
    };
    if !MEDIA_DEVICES.contains(&device.as_str()) {
        return not_found();
    }
    let image = state.inventory.media_image(machine.name(), &device);
    let base = virtual_media_resource(&manager_id, &device);
    let insert_target = format!("{}/Actions/VirtualMedia.InsertMedia", base.odata_id);
    let eject_target = format!("{}/Actions/VirtualMedia.EjectMedia", base.odata_id);
    base.json_patch()
        .patch(json!({
            "MediaTypes": if device == "CD" { json!(["CD", "DVD"]) } else { json!(["Floppy"]) },
            "Inserted": image.is_some(),
            "Image": image,
            "WriteProtected": true,
            "Actions": {
                "#VirtualMedia.InsertMedia": {"target": insert_target},
                "#VirtualMedia.EjectMedia": {"target": eject_target},
            },
        }))
        .into_ok_response()
}

async fn post_insert_media(
    State(state): State<RedfishState>,
    Path((manager_id, device)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, RedfishError> {
    let Some(machine) = state.machines.by_manager_id(&manager_id) else {
        return Err(RedfishError::NotFound);
    };
    if !MEDIA_DEVICES.contains(&device.as_str()) {
        return Err(RedfishError::NotFound);
    }
    let image = body
        .get("Image")
        .and_then(Value::as_str)
        .ok_or_else(|| RedfishError::BadRequest("Image is required".to_string()))?;
    if !state.facade.mount_media(machine.name(), image)? {
        return Err(RedfishError::BadRequest(
            "machine has no matching removable device".to_string(),
        ));
    }
    state
        .inventory
        .set_media(machine.name(), &device, image.to_string());
    info!(machine = %machine.name(), device, image, "virtual media inserted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn post_eject_media(
    State(state): State<RedfishState>,
    Path((manager_id, device)): Path<(String, String)>,
) -> Result<Response, RedfishError> {
    let Some(machine) = state.machines.by_manager_id(&manager_id) else {
        return Err(RedfishError::NotFound);
    };
    if !MEDIA_DEVICES.contains(&device.as_str()) {
        return Err(RedfishError::NotFound);
    }
    state.facade.unmount_media(machine.name())?;
    state.inventory.clear_media(machine.name(), &device);
    info!(machine = %machine.name(), device, "virtual media ejected");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn get_ethernet_interfaces(
    State(state): State<RedfishState>,
    Path(manager_id): Path<String>,
) -> Response {
    if state.machines.by_manager_id(&manager_id).is_none() {
        return not_found();
    }
    let member = json!({
        "@odata.id": format!("/redfish/v1/Managers/{manager_id}/EthernetInterfaces/NIC1")
    });
    ethernet_collection(&manager_id)
        .with_members(&[member])
        .into_ok_response()
}

async fn get_ethernet_interface(
    State(state): State<RedfishState>,
    Path(manager_id): Path<String>,
) -> Response {
    if state.machines.by_manager_id(&manager_id).is_none() {
        return not_found();
    }
    Resource {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Managers/{manager_id}/EthernetInterfaces/NIC1"
        )),
        odata_type: Cow::Borrowed("#EthernetInterface.v1_6_0.EthernetInterface"),
        id: Cow::Borrowed("NIC1"),
        name: Cow::Borrowed("Manager Ethernet Interface"),
    }
    .json_patch()
    .patch(json!({
        "MACAddress": "00:1A:2B:3C:4D:5F",
        "SpeedMbps": 1000,
        "LinkStatus": "LinkUp",
        "InterfaceEnabled": true,
        "Status": {"State": "Enabled", "Health": "OK"},
    }))
    .into_ok_response()
}

async fn get_log_services(
    State(state): State<RedfishState>,
    Path(manager_id): Path<String>,
) -> Response {
    if state.machines.by_manager_id(&manager_id).is_none() {
        return not_found();
    }
    let members: Vec<Value> = LOG_SERVICES
        .iter()
        .map(|log_id| log_service_resource(&manager_id, log_id).entity_ref())
        .collect();
    log_services_collection(&manager_id)
        .with_members(&members)
        .into_ok_response()
}

async fn get_log_service(
    State(state): State<RedfishState>,
    Path((manager_id, log_id)): Path<(String, String)>,
) -> Response {
    if state.machines.by_manager_id(&manager_id).is_none()
        || !LOG_SERVICES.contains(&log_id.as_str())
    {
        return not_found();
    }
    let base = log_service_resource(&manager_id, &log_id);
    let clear_target = format!("{}/Actions/LogService.ClearLog", base.odata_id);
    let entries = format!("{}/Entries", base.odata_id);
    base.json_patch()
        .patch(json!({
            "OverWritePolicy": "WrapsWhenFull",
            "ServiceEnabled": true,
            "Entries": {"@odata.id": entries},
            "Actions": {"#LogService.ClearLog": {"target": clear_target}},
        }))
        .into_ok_response()
}

async fn get_log_entries(
    State(state): State<RedfishState>,
    Path((manager_id, log_id)): Path<(String, String)>,
) -> Response {
    if state.machines.by_manager_id(&manager_id).is_none()
        || !LOG_SERVICES.contains(&log_id.as_str())
    {
        return not_found();
    }
    let entry_id = format!(
        "/redfish/v1/Managers/{manager_id}/LogServices/{log_id}/Entries/1"
    );
    let members = [json!({
        "@odata.id": entry_id,
        "@odata.type": "#LogEntry.v1_8_0.LogEntry",
        "Id": "1",
        "Name": "Log Entry 1",
        "EntryType": "Event",
        "Severity": "OK",
        "Message": "System initialized",
    })];
    Collection {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Managers/{manager_id}/LogServices/{log_id}/Entries"
        )),
        odata_type: Cow::Borrowed("#LogEntryCollection.LogEntryCollection"),
        name: Cow::Borrowed("Log Entries"),
    }
    .with_members(&members)
    .into_ok_response()
}

async fn post_clear_log(
    State(state): State<RedfishState>,
    Path((manager_id, log_id)): Path<(String, String)>,
) -> Response {
    if state.machines.by_manager_id(&manager_id).is_none()
        || !LOG_SERVICES.contains(&log_id.as_str())
    {
        return not_found();
    }
    info!(manager = %manager_id, log = %log_id, "log cleared");
    StatusCode::NO_CONTENT.into_response()
}
