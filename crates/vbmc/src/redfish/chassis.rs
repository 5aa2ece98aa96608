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
use axum::Router;
use serde_json::{json, Value};

use crate::json::{JsonExt, JsonPatch};

use super::{computer_system, not_found, Collection, RedfishState, Resource};

pub fn collection<'a>() -> Collection<'a> {
    Collection {
        odata_id: Cow::Borrowed("/redfish/v1/Chassis"),
        odata_type: Cow::Borrowed("#ChassisCollection.ChassisCollection"),
        name: Cow::Borrowed("Chassis Collection"),
    }
}

pub fn resource<'a>(chassis_id: &'a str) -> Resource<'a> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Chassis/{chassis_id}")),
        odata_type: Cow::Borrowed("#Chassis.v1_14_0.Chassis"),
        id: Cow::Borrowed(chassis_id),
        name: Cow::Borrowed("Computer System Chassis"),
    }
}

fn power_resource(chassis_id: &str) -> Resource<'_> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Chassis/{chassis_id}/Power")),
        odata_type: Cow::Borrowed("#Power.v1_6_0.Power"),
        id: Cow::Borrowed("Power"),
        name: Cow::Borrowed("Power"),
    }
}

fn thermal_resource(chassis_id: &str) -> Resource<'_> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/Chassis/{chassis_id}/Thermal")),
        odata_type: Cow::Borrowed("#Thermal.v1_6_0.Thermal"),
        id: Cow::Borrowed("Thermal"),
        name: Cow::Borrowed("Thermal"),
    }
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/Chassis", get(get_collection))
        .route("/redfish/v1/Chassis/{chassis_id}", get(get_chassis))
        .route("/redfish/v1/Chassis/{chassis_id}/Power", get(get_power))
        .route("/redfish/v1/Chassis/{chassis_id}/Thermal", get(get_thermal))
}

async fn get_collection(State(state): State<RedfishState>) -> Response {
    let members: Vec<Value> = state
        .machines
        .names()
        .into_iter()
        .map(|name| resource(&format!("{name}-chassis")).entity_ref())
        .collect();
    collection().with_members(&members).into_ok_response()
}

async fn get_chassis(
    State(state): State<RedfishState>,
    Path(chassis_id): Path<String>,
) -> Response {
    let Some(machine) = state.machines.by_chassis_id(&chassis_id) else {
        return not_found();
    };
    let power = machine.power_state(state.facade.as_ref());
    resource(&chassis_id)
        .json_patch()
        .patch(json!({
            "ChassisType": "RackMount",
            "Manufacturer": "Generic",
            "Model": "Virtual Chassis",
            "PowerState": power.redfish_name(),
            "Status": {"State": "Enabled", "Health": "OK"},
            "Links": {
                "ComputerSystems": [
                    computer_system::resource(machine.identity.system_id()).entity_ref()
                ],
            },
        }))
        .patch(power_resource(&chassis_id).nav_property("Power"))
        .patch(thermal_resource(&chassis_id).nav_property("Thermal"))
        .into_ok_response()
}

async fn get_power(State(state): State<RedfishState>, Path(chassis_id): Path<String>) -> Response {
    if state.machines.by_chassis_id(&chassis_id).is_none() {
        return not_found();
    }
    power_resource(&chassis_id)
        .json_patch()
        .patch(json!({
            "PowerControl": [{
                "MemberId": "0",
                "PowerConsumedWatts": 120,
                "PowerCapacityWatts": 500,
            }],
            "Voltages": [{
                "MemberId": "0",
                "Name": "VRM1 Voltage",
                "ReadingVolts": 12.1,
            }],
        }))
        .into_ok_response()
}

async fn get_thermal(
    State(state): State<RedfishState>,
    Path(chassis_id): Path<String>,
) -> Response {
    if state.machines.by_chassis_id(&chassis_id).is_none() {
        return not_found();
    }
    thermal_resource(&chassis_id)
        .json_patch()
        .patch(json!({
            "Temperatures": [{
                "MemberId": "0",
                "Name": "CPU Temp",
                "ReadingCelsius": 42,
                "Status": {"State": "Enabled", "Health": "OK"},
            }],
            "Fans": [{
                "MemberId": "0",
                "Name": "System Fan",
                "Reading": 2800,
                "ReadingUnits": "RPM",
                "Status": {"State": "Enabled", "Health": "OK"},
            }],
        }))
        .into_ok_response()
}
