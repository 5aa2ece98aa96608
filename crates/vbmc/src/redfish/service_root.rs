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

use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::json;

use crate::json::{JsonExt, JsonPatch};

use super::{
    chassis, computer_system, manager, session_service, task_service, update_service,
    RedfishState, Resource,
};

pub fn resource<'a>() -> Resource<'a> {
    Resource {
        odata_id: Cow::Borrowed("/redfish/v1"),
        odata_type: Cow::Borrowed("#ServiceRoot.v1_5_0.ServiceRoot"),
        id: Cow::Borrowed("RootService"),
        name: Cow::Borrowed("Root Service"),
    }
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish", get(get_version_index))
        .route("/redfish/v1", get(get_service_root))
        .route("/redfish/v1/", get(get_service_root))
}

async fn get_version_index() -> Response {
    json!({"v1": "/redfish/v1/"}).into_ok_response()
}

async fn get_service_root() -> Response {
    resource()
        .json_patch()
        .patch(json!({"RedfishVersion": "1.8.0"}))
        .patch(computer_system::collection().nav_property("Systems"))
        .patch(chassis::collection().nav_property("Chassis"))
        .patch(manager::collection().nav_property("Managers"))
        .patch(session_service::resource().nav_property("SessionService"))
        .patch(task_service::resource().nav_property("Tasks"))
        .patch(update_service::resource().nav_property("UpdateService"))
        .patch(json!({
            "Links": {
                "Sessions": session_service::sessions_collection().entity_ref(),
            }
        }))
        .into_ok_response()
}
