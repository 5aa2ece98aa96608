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

//! Redfish resource model and router assembly.
//!
//! Resources render through [`Resource`]/[`Collection`] plus the merge-patch
//! builders in each module, so every payload starts from the same odata
//! skeleton. Handlers read machine state through [`RedfishState`] and only
//! ever touch the hypervisor via the façade.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{middleware, Router};
use serde_json::{json, Value};
use thiserror::Error;

use crate::facade::{FacadeError, VmControl};
use crate::json::JsonExt;
use crate::machine::MachineTable;
use crate::tasks::TaskRegistry;

pub mod auth;
pub mod bios;
pub mod chassis;
pub mod computer_system;
pub mod manager;
pub mod service_root;
pub mod session_service;
pub mod storage;
pub mod task_service;
pub mod update_service;

pub use auth::SessionStore;

/// Member resource identity: odata id/type plus Id and Name.
pub struct Resource<'a> {
    pub odata_id: Cow<'a, str>,
    pub odata_type: Cow<'static, str>,
    pub id: Cow<'a, str>,
    pub name: Cow<'a, str>,
}

impl Resource<'_> {
    pub fn entity_ref(&self) -> Value {
        json!({"@odata.id": self.odata_id})
    }

    /// `{ name: { "@odata.id": ... } }`, for linking from a parent resource.
    pub fn nav_property(&self, name: &str) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(name.to_string(), self.entity_ref());
        Value::Object(map)
    }

    /// Base payload the resource builders patch their fields onto.
    pub fn json_patch(&self) -> Value {
        json!({
            "@odata.id": self.odata_id,
            "@odata.type": self.odata_type,
            "Id": self.id,
            "Name": self.name,
        })
    }
}

/// Collection resource identity.
pub struct Collection<'a> {
    pub odata_id: Cow<'a, str>,
    pub odata_type: Cow<'static, str>,
    pub name: Cow<'static, str>,
}

impl Collection<'_> {
    pub fn entity_ref(&self) -> Value {
        json!({"@odata.id": self.odata_id})
    }

    pub fn nav_property(&self, name: &str) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(name.to_string(), self.entity_ref());
        Value::Object(map)
    }

    pub fn with_members(&self, members: &[Value]) -> Value {
        json!({
            "@odata.id": self.odata_id,
            "@odata.type": self.odata_type,
            "Name": self.name,
            "Members": members,
            "Members@odata.count": members.len(),
        })
    }
}

/// Structured Redfish error body.
pub fn error_body(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

pub fn not_found() -> Response {
    error_body("Base.1.0.ResourceMissingAtURI", "Resource not found")
        .into_response(StatusCode::NOT_FOUND)
}

#[derive(Debug, Error)]
pub enum RedfishError {
    #[error("resource not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Facade(#[from] FacadeError),
}

impl IntoResponse for RedfishError {
    fn into_response(self) -> Response {
        match self {
            RedfishError::NotFound => not_found(),
            RedfishError::BadRequest(message) => {
                error_body("Base.1.0.ActionParameterNotSupported", &message)
                    .into_response(StatusCode::BAD_REQUEST)
            }
            RedfishError::Facade(err) => error_body("Base.1.0.InternalError", &err.to_string())
                .into_response(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

/// Volume as tracked by the emulation; creation and deletion are modeled as
/// tasks but the record itself lives here.
#[derive(Debug, Clone)]
pub struct VolumeRecord {
    pub id: String,
    pub name: String,
    pub capacity_bytes: u64,
    pub raid_type: String,
}

/// Redfish-side display state. Nothing in here is shared with the IPMI
/// engine; the shared machine state stays on [`crate::machine::Machine`].
#[derive(Debug, Default)]
pub struct InventoryState {
    media: Mutex<HashMap<(String, String), String>>,
    secure_boot: Mutex<HashSet<String>>,
    volumes: Mutex<HashMap<String, BTreeMap<String, VolumeRecord>>>,
}

impl InventoryState {
    pub fn media_image(&self, machine: &str, device: &str) -> Option<String> {
        let media = self.media.lock().unwrap();
        media.get(&(machine.to_string(), device.to_string())).cloned()
    }

    pub fn set_media(&self, machine: &str, device: &str, image: String) {
        let mut media = self.media.lock().unwrap();
        media.insert((machine.to_string(), device.to_string()), image);
    }

    pub fn clear_media(&self, machine: &str, device: &str) {
        let mut media = self.media.lock().unwrap();
        media.remove(&(machine.to_string(), device.to_string()));
    }

    pub fn secure_boot_enabled(&self, machine: &str) -> bool {
        self.secure_boot.lock().unwrap().contains(machine)
    }

    pub fn set_secure_boot(&self, machine: &str, enabled: bool) {
        let mut flags = self.secure_boot.lock().unwrap();
        if enabled {
            flags.insert(machine.to_string());
        } else {
            flags.remove(machine);
        }
    }

    fn seed_volumes(volumes: &mut BTreeMap<String, VolumeRecord>) {
        volumes.insert(
            "1".to_string(),
            VolumeRecord {
                id: "1".to_string(),
                name: "System Volume".to_string(),
                capacity_bytes: 256 * 1024 * 1024 * 1024,
                raid_type: "RAID1".to_string(),
            },
        );
    }

    pub fn volumes(&self, machine: &str) -> Vec<VolumeRecord> {
        let mut volumes = self.volumes.lock().unwrap();
        let entry = volumes.entry(machine.to_string()).or_insert_with(|| {
            let mut seeded = BTreeMap::new();
            Self::seed_volumes(&mut seeded);
            seeded
        });
        entry.values().cloned().collect()
    }

    pub fn volume(&self, machine: &str, id: &str) -> Option<VolumeRecord> {
        self.volumes(machine)
            .into_iter()
            .find(|volume| volume.id == id)
    }

    pub fn add_volume(&self, machine: &str, record: VolumeRecord) {
        // touch the entry so the seed volume appears alongside new ones
        self.volumes(machine);
        let mut volumes = self.volumes.lock().unwrap();
        if let Some(entry) = volumes.get_mut(machine) {
            entry.insert(record.id.clone(), record);
        }
    }

    pub fn remove_volume(&self, machine: &str, id: &str) -> bool {
        self.volumes(machine);
        let mut volumes = self.volumes.lock().unwrap();
        volumes
            .get_mut(machine)
            .map(|entry| entry.remove(id).is_some())
            .unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct RedfishState {
    pub machines: Arc<MachineTable>,
    pub facade: Arc<dyn VmControl>,
    pub sessions: Arc<SessionStore>,
    pub tasks: Arc<TaskRegistry>,
    pub inventory: Arc<InventoryState>,
}

/// Router composition per resource module.
pub trait AddRoutes: Sized {
    fn add_routes(self, add: impl FnOnce(Self) -> Self) -> Self {
        add(self)
    }
}

impl<S: Clone + Send + Sync + 'static> AddRoutes for Router<S> {}

/// The complete Redfish router. Authentication wraps every route; the public
/// exemptions (service root, session creation) live in the middleware.
pub fn router(state: RedfishState) -> Router {
    Router::new()
        .add_routes(service_root::add_routes)
        .add_routes(computer_system::add_routes)
        .add_routes(bios::add_routes)
        .add_routes(storage::add_routes)
        .add_routes(chassis::add_routes)
        .add_routes(manager::add_routes)
        .add_routes(session_service::add_routes)
        .add_routes(task_service::add_routes)
        .add_routes(update_service::add_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ))
        .with_state(state)
}
