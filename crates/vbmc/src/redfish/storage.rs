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
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::json::{JsonExt, JsonPatch};
use crate::tasks::TaskCategory;

use super::{not_found, task_service, Collection, RedfishError, RedfishState, Resource, VolumeRecord};

const STORAGE_ID: &str = "1";

pub fn collection(system_id: &str) -> Collection<'_> {
    Collection {
        odata_id: Cow::Owned(format!("/redfish/v1/Systems/{system_id}/Storage")),
        odata_type: Cow::Borrowed("#StorageCollection.StorageCollection"),
        name: Cow::Borrowed("Storage Collection"),
    }
}

pub fn resource<'a>(system_id: &str, storage_id: &'a str) -> Resource<'a> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Systems/{system_id}/Storage/{storage_id}")),
        odata_type: Cow::Borrowed("#Storage.v1_9_0.Storage"),
        id: Cow::Borrowed(storage_id),
        name: Cow::Borrowed("Local Storage Controller"),
    }
}

fn volumes_collection(system_id: &str, storage_id: &str) -> Collection<'static> {
    Collection {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}/Volumes"
        )),
        odata_type: Cow::Borrowed("#VolumeCollection.VolumeCollection"),
        name: Cow::Borrowed("Volume Collection"),
    }
}

fn volume_resource<'a>(system_id: &str, storage_id: &str, volume: &'a VolumeRecord) -> Resource<'a> {
    Resource {
        odata_id: Cow::Owned(format!(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}/Volumes/{}",
            volume.id
        )),
        odata_type: Cow::Borrowed("#Volume.v1_6_0.Volume"),
        id: Cow::Borrowed(&volume.id),
        name: Cow::Borrowed(&volume.name),
    }
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/Systems/{system_id}/Storage", get(get_collection))
        .route(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}",
            get(get_storage).patch(patch_storage),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}/Volumes",
            get(get_volumes).post(post_volume),
        )
        .route(
            "/redfish/v1/Systems/{system_id}/Storage/{storage_id}/Volumes/{volume_id}",
            get(get_volume).delete(delete_volume),
        )
}

async fn get_collection(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    let member = resource(&system_id, STORAGE_ID).entity_ref();
    collection(&system_id)
        .with_members(&[member])
        .into_ok_response()
}

async fn get_storage(
    State(state): State<RedfishState>,
    Path((system_id, storage_id)): Path<(String, String)>,
) -> Response {
    if state.machines.get(&system_id).is_none() || storage_id != STORAGE_ID {
        return not_found();
    }
    resource(&system_id, STORAGE_ID)
        .json_patch()
        .patch(json!({
            "StorageControllers": [{
                "MemberId": "0",
                "Model": "Virtual RAID Controller",
                "SupportedRAIDTypes": ["RAID0", "RAID1", "RAID5"],
                "Status": {"State": "Enabled", "Health": "OK"},
            }],
            "Drives": [{
                "CapacityBytes": 512u64 * 1024 * 1024 * 1024,
                "MediaType": "SSD",
                "Protocol": "SATA",
            }],
        }))
        .patch(volumes_collection(&system_id, STORAGE_ID).nav_property("Volumes"))
        .into_ok_response()
}

/// Controller reconfiguration is modeled as a RAID task; the payload is
/// accepted as-is since the controller is synthetic anyway.
async fn patch_storage(
    State(state): State<RedfishState>,
    Path((system_id, storage_id)): Path<(String, String)>,
    Json(_body): Json<Value>,
) -> Result<Response, RedfishError> {
    if state.machines.get(&system_id).is_none() || storage_id != STORAGE_ID {
        return Err(RedfishError::NotFound);
    }
    let task = state.tasks.create(
        TaskCategory::RaidConfig,
        format!("Storage reconfiguration on {system_id}"),
    );
    Ok(task_service::accepted(&task))
}

async fn get_volumes(
    State(state): State<RedfishState>,
    Path((system_id, storage_id)): Path<(String, String)>,
) -> Response {
    if state.machines.get(&system_id).is_none() || storage_id != STORAGE_ID {
        return not_found();
    }
    let volumes = state.inventory.volumes(&system_id);
    let members: Vec<Value> = volumes
        .iter()
        .map(|volume| volume_resource(&system_id, STORAGE_ID, volume).entity_ref())
        .collect();
    volumes_collection(&system_id, STORAGE_ID)
        .with_members(&members)
        .into_ok_response()
}

async fn get_volume(
    State(state): State<RedfishState>,
    Path((system_id, storage_id, volume_id)): Path<(String, String, String)>,
) -> Response {
    if state.machines.get(&system_id).is_none() || storage_id != STORAGE_ID {
        return not_found();
    }
    let Some(volume) = state.inventory.volume(&system_id, &volume_id) else {
        return not_found();
    };
    volume_resource(&system_id, STORAGE_ID, &volume)
        .json_patch()
        .patch(json!({
            "CapacityBytes": volume.capacity_bytes,
            "RAIDType": volume.raid_type,
            "Status": {"State": "Enabled", "Health": "OK"},
        }))
        .into_ok_response()
}

async fn post_volume(
    State(state): State<RedfishState>,
    Path((system_id, storage_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, RedfishError> {
    if state.machines.get(&system_id).is_none() || storage_id != STORAGE_ID {
        return Err(RedfishError::NotFound);
    }
    let name = body
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or("New Volume")
        .to_string();
    let capacity_bytes = body
        .get("CapacityBytes")
        .and_then(Value::as_u64)
        .unwrap_or(64 * 1024 * 1024 * 1024);
    let raid_type = body
        .get("RAIDType")
        .and_then(Value::as_str)
        .unwrap_or("RAID0")
        .to_string();

    let next_id = state
        .inventory
        .volumes(&system_id)
        .iter()
        .filter_map(|volume| volume.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let record = VolumeRecord {
        id: next_id.to_string(),
        name: name.clone(),
        capacity_bytes,
        raid_type,
    };
    state.inventory.add_volume(&system_id, record);
    info!(machine = %system_id, volume = next_id, "volume creation accepted");

    let task = state.tasks.create(
        TaskCategory::VolumeProvision,
        format!("Create volume {name} on {system_id}"),
    );
    Ok(task_service::accepted(&task))
}

async fn delete_volume(
    State(state): State<RedfishState>,
    Path((system_id, storage_id, volume_id)): Path<(String, String, String)>,
) -> Result<Response, RedfishError> {
    if state.machines.get(&system_id).is_none() || storage_id != STORAGE_ID {
        return Err(RedfishError::NotFound);
    }
    if !state.inventory.remove_volume(&system_id, &volume_id) {
        return Err(RedfishError::NotFound);
    }
    info!(machine = %system_id, volume = %volume_id, "volume deletion accepted");
    let task = state.tasks.create(
        TaskCategory::Generic,
        format!("Delete volume {volume_id} on {system_id}"),
    );
    Ok(task_service::accepted(&task))
}
