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
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::json::{JsonExt, JsonPatch};

use super::{computer_system, not_found, RedfishError, RedfishState, Resource};

pub fn resource(system_id: &str) -> Resource<'_> {
    let odata_id = format!(
        "{}/Bios",
        computer_system::resource(system_id).odata_id
    );
    Resource {
        odata_id: Cow::Owned(odata_id),
        odata_type: Cow::Borrowed("#Bios.v1_1_0.Bios"),
        id: Cow::Borrowed("BIOS"),
        name: Cow::Borrowed("BIOS Configuration"),
    }
}

pub fn secure_boot_resource(system_id: &str) -> Resource<'_> {
    let odata_id = format!(
        "{}/SecureBoot",
        computer_system::resource(system_id).odata_id
    );
    Resource {
        odata_id: Cow::Owned(odata_id),
        odata_type: Cow::Borrowed("#SecureBoot.v1_1_0.SecureBoot"),
        id: Cow::Borrowed("SecureBoot"),
        name: Cow::Borrowed("UEFI Secure Boot"),
    }
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/Systems/{system_id}/Bios", get(get_bios))
        .route(
            "/redfish/v1/Systems/{system_id}/SecureBoot",
            get(get_secure_boot).patch(patch_secure_boot),
        )
}

async fn get_bios(State(state): State<RedfishState>, Path(system_id): Path<String>) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    resource(&system_id)
        .json_patch()
        .patch(json!({
            "AttributeRegistry": "BiosAttributeRegistry.v1_0_0",
            "Attributes": {
                "BootMode": "Uefi",
                "EmbeddedSata": "Ahci",
                "NicBoot1": "NetworkBoot",
                "PowerProfile": "MaxPerf",
                "ProcVirtualization": "Enabled",
            },
        }))
        .into_ok_response()
}

async fn get_secure_boot(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
) -> Response {
    if state.machines.get(&system_id).is_none() {
        return not_found();
    }
    let enabled = state.inventory.secure_boot_enabled(&system_id);
    secure_boot_resource(&system_id)
        .json_patch()
        .patch(json!({
            "SecureBootEnable": enabled,
            "SecureBootCurrentBoot": if enabled { "Enabled" } else { "Disabled" },
            "SecureBootMode": "UserMode",
        }))
        .into_ok_response()
}

async fn patch_secure_boot(
    State(state): State<RedfishState>,
    Path(system_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, RedfishError> {
    if state.machines.get(&system_id).is_none() {
        return Err(RedfishError::NotFound);
    }
    let enable = body
        .get("SecureBootEnable")
        .and_then(Value::as_bool)
        .ok_or_else(|| RedfishError::BadRequest("SecureBootEnable is required".to_string()))?;
    state.inventory.set_secure_boot(&system_id, enable);
    info!(machine = %system_id, enable, "secure boot updated");
    Ok(StatusCode::NO_CONTENT.into_response())
}
