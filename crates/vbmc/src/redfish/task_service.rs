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
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use crate::json::{JsonExt, JsonPatch};
use crate::tasks::Task;

use super::{not_found, Collection, RedfishState, Resource};

pub fn resource<'a>() -> Resource<'a> {
    Resource {
        odata_id: Cow::Borrowed("/redfish/v1/TaskService"),
        odata_type: Cow::Borrowed("#TaskService.v1_1_0.TaskService"),
        id: Cow::Borrowed("TaskService"),
        name: Cow::Borrowed("Task Service"),
    }
}

pub fn tasks_collection<'a>() -> Collection<'a> {
    Collection {
        odata_id: Cow::Borrowed("/redfish/v1/TaskService/Tasks"),
        odata_type: Cow::Borrowed("#TaskCollection.TaskCollection"),
        name: Cow::Borrowed("Task Collection"),
    }
}

pub fn task_resource(task_id: &str) -> Resource<'_> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/TaskService/Tasks/{task_id}")),
        odata_type: Cow::Borrowed("#Task.v1_4_3.Task"),
        id: Cow::Borrowed(task_id),
        name: Cow::Borrowed("Task"),
    }
}

pub fn render_task(task: &Task) -> Value {
    let mut value = task_resource(&task.id).json_patch().patch(json!({
        "Name": task.name,
        "TaskState": task.state.redfish_name(),
        "TaskStatus": task.state.redfish_status(),
        "PercentComplete": task.percent_complete,
        "StartTime": task.started.to_rfc3339(),
        "Messages": task.messages.iter().map(|message| json!({"Message": message})).collect::<Vec<_>>(),
    }));
    if let Some(ended) = task.ended {
        value = value.patch(json!({"EndTime": ended.to_rfc3339()}));
    }
    value
}

/// 202 Accepted with the task monitor in `Location`, for async operations.
pub fn accepted(task: &Task) -> Response {
    let monitor = task_resource(&task.id).odata_id.to_string();
    let mut response = render_task(task).into_response(StatusCode::ACCEPTED);
    if let Ok(location) = HeaderValue::from_str(&monitor) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/TaskService", get(get_task_service))
        .route("/redfish/v1/TaskService/Tasks", get(get_tasks))
        .route(
            "/redfish/v1/TaskService/Tasks/{task_id}",
            get(get_task).delete(delete_task),
        )
}

async fn get_task_service() -> Response {
    resource()
        .json_patch()
        .patch(json!({
            "ServiceEnabled": true,
            "CompletedTaskOverWritePolicy": "Oldest",
            "Status": {"State": "Enabled", "Health": "OK"},
        }))
        .patch(tasks_collection().nav_property("Tasks"))
        .into_ok_response()
}

async fn get_tasks(State(state): State<RedfishState>) -> Response {
    let members: Vec<Value> = state
        .tasks
        .ids()
        .iter()
        .map(|id| task_resource(id).entity_ref())
        .collect();
    tasks_collection().with_members(&members).into_ok_response()
}

async fn get_task(State(state): State<RedfishState>, Path(task_id): Path<String>) -> Response {
    let Some(task) = state.tasks.get(&task_id) else {
        return not_found();
    };
    render_task(&task).into_ok_response()
}

/// Cancels a running task. Terminal tasks cannot be deleted before the
/// retention sweep retires them.
async fn delete_task(State(state): State<RedfishState>, Path(task_id): Path<String>) -> Response {
    if state.tasks.get(&task_id).is_none() {
        return not_found();
    }
    if state.tasks.cancel(&task_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        super::error_body(
            "Base.1.0.OperationNotAllowed",
            "Task already reached a terminal state",
        )
        .into_response(StatusCode::CONFLICT)
    }
}
