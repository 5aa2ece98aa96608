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
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::json::{JsonExt, JsonPatch};
use crate::tasks::TaskCategory;

use super::{not_found, task_service, Collection, RedfishError, RedfishState, Resource};

const FIRMWARE_ITEMS: [(&str, &str); 2] = [("BMC", "0.1.0"), ("BIOS", "1.2.0")];
const SOFTWARE_ITEMS: [(&str, &str); 2] = [("ManagementAgent", "2.5.0"), ("Diagnostics", "1.0.3")];

pub fn resource<'a>() -> Resource<'a> {
    Resource {
        odata_id: Cow::Borrowed("/redfish/v1/UpdateService"),
        odata_type: Cow::Borrowed("#UpdateService.v1_8_0.UpdateService"),
        id: Cow::Borrowed("UpdateService"),
        name: Cow::Borrowed("Update Service"),
    }
}

fn firmware_collection<'a>() -> Collection<'a> {
    Collection {
        odata_id: Cow::Borrowed("/redfish/v1/UpdateService/FirmwareInventory"),
        odata_type: Cow::Borrowed("#SoftwareInventoryCollection.SoftwareInventoryCollection"),
        name: Cow::Borrowed("Firmware Inventory"),
    }
}

fn firmware_resource(item_id: &str) -> Resource<'_> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/UpdateService/FirmwareInventory/{item_id}")),
        odata_type: Cow::Borrowed("#SoftwareInventory.v1_4_0.SoftwareInventory"),
        id: Cow::Borrowed(item_id),
        name: Cow::Borrowed("Firmware Image"),
    }
}

fn software_collection<'a>() -> Collection<'a> {
    Collection {
        odata_id: Cow::Borrowed("/redfish/v1/UpdateService/SoftwareInventory"),
        odata_type: Cow::Borrowed("#SoftwareInventoryCollection.SoftwareInventoryCollection"),
        name: Cow::Borrowed("Software Inventory"),
    }
}

fn software_resource(item_id: &str) -> Resource<'_> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/UpdateService/SoftwareInventory/{item_id}")),
        odata_type: Cow::Borrowed("#SoftwareInventory.v1_4_0.SoftwareInventory"),
        id: Cow::Borrowed(item_id),
        name: Cow::Borrowed("Software Image"),
    }
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/UpdateService", get(get_update_service))
        .route(
            "/redfish/v1/UpdateService/FirmwareInventory",
            get(get_firmware_inventory),
        )
        .route(
            "/redfish/v1/UpdateService/FirmwareInventory/{item_id}",
            get(get_firmware_item),
        )
        .route(
            "/redfish/v1/UpdateService/SoftwareInventory",
            get(get_software_inventory),
        )
        .route(
            "/redfish/v1/UpdateService/SoftwareInventory/{item_id}",
            get(get_software_item),
        )
        .route(
            "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
            post(post_simple_update),
        )
}

async fn get_update_service() -> Response {
    resource()
        .json_patch()
        .patch(json!({
            "ServiceEnabled": true,
            "Actions": {
                "#UpdateService.SimpleUpdate": {
                    "target": "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
                    "TransferProtocol@Redfish.AllowableValues": ["HTTP", "HTTPS"],
                }
            },
        }))
        .patch(firmware_collection().nav_property("FirmwareInventory"))
        .patch(software_collection().nav_property("SoftwareInventory"))
        .into_ok_response()
}

async fn get_firmware_inventory() -> Response {
    let members: Vec<Value> = FIRMWARE_ITEMS
        .iter()
        .map(|(item_id, _)| firmware_resource(item_id).entity_ref())
        .collect();
    firmware_collection().with_members(&members).into_ok_response()
}

async fn get_firmware_item(Path(item_id): Path<String>) -> Response {
    let Some((_, version)) = FIRMWARE_ITEMS.iter().find(|(id, _)| *id == item_id) else {
        return not_found();
    };
    firmware_resource(&item_id)
        .json_patch()
        .patch(json!({
            "Version": version,
            "Updateable": true,
            "Status": {"State": "Enabled", "Health": "OK"},
        }))
        .into_ok_response()
}

async fn get_software_inventory() -> Response {
    let members: Vec<Value> = SOFTWARE_ITEMS
        .iter()
        .map(|(item_id, _)| software_resource(item_id).entity_ref())
        .collect();
    software_collection().with_members(&members).into_ok_response()
}

async fn get_software_item(Path(item_id): Path<String>) -> Response {
    let Some((_, version)) = SOFTWARE_ITEMS.iter().find(|(id, _)| *id == item_id) else {
        return not_found();
    };
    software_resource(&item_id)
        .json_patch()
        .patch(json!({
            "Version": version,
            "Updateable": false,
            "Status": {"State": "Enabled", "Health": "OK"},
        }))
        .into_ok_response()
}

/// Firmware updates do nothing to the virtual machine; the interesting part
/// is the task lifecycle the caller polls.
async fn post_simple_update(
    State(state): State<RedfishState>,
    Json(body): Json<Value>,
) -> Result<Response, RedfishError> {
    let image_uri = body
        .get("ImageURI")
        .and_then(Value::as_str)
        .ok_or_else(|| RedfishError::BadRequest("ImageURI is required".to_string()))?;
    info!(image_uri, "firmware update accepted");
    let task = state.tasks.create(
        TaskCategory::FirmwareUpdate,
        format!("Firmware update from {image_uri}"),
    );
    Ok(task_service::accepted(&task))
}
