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
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::json::{JsonExt, JsonPatch};

use super::auth::{unauthorized, RedfishSession};
use super::{not_found, Collection, RedfishError, RedfishState, Resource};

pub fn resource<'a>() -> Resource<'a> {
    Resource {
        odata_id: Cow::Borrowed("/redfish/v1/SessionService"),
        odata_type: Cow::Borrowed("#SessionService.v1_1_0.SessionService"),
        id: Cow::Borrowed("SessionService"),
        name: Cow::Borrowed("Session Service"),
    }
}

pub fn sessions_collection<'a>() -> Collection<'a> {
    Collection {
        odata_id: Cow::Borrowed("/redfish/v1/SessionService/Sessions"),
        odata_type: Cow::Borrowed("#SessionCollection.SessionCollection"),
        name: Cow::Borrowed("Session Collection"),
    }
}

fn session_resource(session_id: &str) -> Resource<'_> {
    Resource {
        odata_id: Cow::Owned(format!("/redfish/v1/SessionService/Sessions/{session_id}")),
        odata_type: Cow::Borrowed("#Session.v1_1_0.Session"),
        id: Cow::Borrowed(session_id),
        name: Cow::Borrowed("User Session"),
    }
}

fn render_session(session: &RedfishSession) -> Value {
    session_resource(&session.id).json_patch().patch(json!({
        "UserName": session.username,
        "CreatedTime": session.created.to_rfc3339(),
    }))
}

pub fn add_routes(router: Router<RedfishState>) -> Router<RedfishState> {
    router
        .route("/redfish/v1/SessionService", get(get_session_service))
        .route(
            "/redfish/v1/SessionService/Sessions",
            get(get_sessions).post(post_session),
        )
        .route(
            "/redfish/v1/SessionService/Sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
}

async fn get_session_service(State(state): State<RedfishState>) -> Response {
    resource()
        .json_patch()
        .patch(json!({
            "ServiceEnabled": true,
            "SessionTimeout": state.sessions.config().session_timeout.as_secs(),
        }))
        .patch(sessions_collection().nav_property("Sessions"))
        .into_ok_response()
}

async fn get_sessions(State(state): State<RedfishState>) -> Response {
    let members: Vec<Value> = state
        .sessions
        .ids()
        .iter()
        .map(|id| session_resource(id).entity_ref())
        .collect();
    sessions_collection().with_members(&members).into_ok_response()
}

async fn post_session(
    State(state): State<RedfishState>,
    Json(body): Json<Value>,
) -> Result<Response, RedfishError> {
    let username = body
        .get("UserName")
        .and_then(Value::as_str)
        .ok_or_else(|| RedfishError::BadRequest("UserName is required".to_string()))?;
    let password = body
        .get("Password")
        .and_then(Value::as_str)
        .ok_or_else(|| RedfishError::BadRequest("Password is required".to_string()))?;
    let Some(session) = state.sessions.create(username, password) else {
        return Ok(unauthorized());
    };
    let mut response = render_session(&session).into_response(StatusCode::CREATED);
    let headers = response.headers_mut();
    if let Ok(token) = HeaderValue::from_str(&session.token) {
        headers.insert("X-Auth-Token", token);
    }
    let location = session_resource(&session.id).odata_id.to_string();
    if let Ok(location) = HeaderValue::from_str(&location) {
        headers.insert(header::LOCATION, location);
    }
    Ok(response)
}

async fn get_session(
    State(state): State<RedfishState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.sessions.get(&session_id) else {
        return not_found();
    };
    render_session(&session).into_ok_response()
}

async fn delete_session(
    State(state): State<RedfishState>,
    Path(session_id): Path<String>,
) -> Response {
    if state.sessions.remove(&session_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found()
    }
}
