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

//! BMC protocol emulation for virtual machines.
//!
//! Each configured machine gets its own IPMI-over-LAN UDP listener; one HTTP
//! listener serves the Redfish model for all of them. Every power, boot and
//! media operation goes through the [`facade::VmControl`] trait, which the
//! embedding control plane implements.

pub mod facade;
pub mod ipmi;
pub mod json;
pub mod machine;
pub mod redfish;
pub mod tasks;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::ServiceExt;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower::Layer as _;
use tower_http::normalize_path::NormalizePathLayer;
use tracing::{error, info};

use facade::VmControl;
use ipmi::dispatch::Dispatcher;
use ipmi::session::{SessionConfig, SessionManager};
use ipmi::transport::IpmiServer;
use machine::{MachineIdentity, MachineTable};
use redfish::auth::AuthConfig;
use redfish::{InventoryState, RedfishState, SessionStore};
use tasks::TaskRegistry;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum VbmcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:8443".parse().unwrap()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_ipmi_idle_timeout_secs() -> u64 {
    300
}

fn default_session_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct VbmcConfig {
    /// Bind address of the Redfish HTTP listener.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default)]
    pub ipmi: IpmiConfig,
    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpmiConfig {
    /// Straight-password shared secret. Absent means auth-type-none only.
    #[serde(default)]
    pub secret: Option<String>,
    /// Accept chassis commands without an activated session.
    #[serde(default)]
    pub allow_implicit_session: bool,
    #[serde(default = "default_ipmi_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for IpmiConfig {
    fn default() -> Self {
        Self {
            secret: None,
            allow_implicit_session: false,
            idle_timeout_secs: default_ipmi_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    pub name: String,
    /// UDP bind address for this machine's IPMI listener.
    pub ipmi_listen: SocketAddr,
}

impl VbmcConfig {
    pub fn from_toml(raw: &str) -> Result<Self, VbmcError> {
        toml::from_str(raw).map_err(|err| VbmcError::Config(err.to_string()))
    }
}

/// Running instance: the HTTP listener, one IPMI listener per machine and
/// the background sweep/scheduler tasks. Dropping the handle stops all of
/// them.
pub struct VbmcHandle {
    http_addr: SocketAddr,
    ipmi_servers: Vec<IpmiServer>,
    background: Vec<JoinHandle<()>>,
}

impl VbmcHandle {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// IPMI listener addresses by machine name.
    pub fn ipmi_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.ipmi_servers
            .iter()
            .map(|server| (server.machine().name().to_string(), server.local_addr()))
            .collect()
    }

    pub fn shutdown(self) {
        for server in &self.ipmi_servers {
            server.abort();
        }
        for task in &self.background {
            task.abort();
        }
    }
}

impl Drop for VbmcHandle {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}

pub async fn run(config: VbmcConfig, facade: Arc<dyn VmControl>) -> Result<VbmcHandle, VbmcError> {
    if config.machines.is_empty() {
        return Err(VbmcError::Config(
            "at least one machine must be configured".to_string(),
        ));
    }

    let machines = Arc::new(MachineTable::new(config.machines.iter().map(|machine| {
        MachineIdentity {
            name: machine.name.clone(),
            ipmi_bind: machine.ipmi_listen,
        }
    })));

    let session_config = SessionConfig {
        username: config.username.clone(),
        secret: config.ipmi.secret.clone(),
        allow_implicit_session: config.ipmi.allow_implicit_session,
        idle_timeout: Duration::from_secs(config.ipmi.idle_timeout_secs),
    };
    let mut ipmi_servers = Vec::with_capacity(machines.len());
    for machine in machines.iter() {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(SessionManager::new(
            session_config.clone(),
        ))));
        let server = IpmiServer::spawn(Arc::clone(machine), Arc::clone(&facade), dispatcher).await?;
        ipmi_servers.push(server);
    }

    let task_registry = Arc::new(TaskRegistry::new());
    let redfish_sessions = Arc::new(SessionStore::new(AuthConfig {
        username: config.username,
        password: config.password,
        session_timeout: Duration::from_secs(config.session_timeout_secs),
    }));
    let state = RedfishState {
        machines,
        facade,
        sessions: Arc::clone(&redfish_sessions),
        tasks: Arc::clone(&task_registry),
        inventory: Arc::new(InventoryState::default()),
    };
    let router = redfish::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    let http_addr = listener.local_addr()?;
    info!(%http_addr, machines = ipmi_servers.len(), "redfish listener up");

    let mut background = vec![tasks::spawn_scheduler(Arc::clone(&task_registry))];

    let ipmi_sessions: Vec<Arc<SessionManager>> = ipmi_servers
        .iter()
        .map(|server| Arc::clone(server.dispatcher().sessions()))
        .collect();
    background.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            redfish_sessions.sweep_idle();
            for manager in &ipmi_sessions {
                manager.sweep_idle();
            }
        }
    }));

    let app = NormalizePathLayer::trim_trailing_slash().layer(router);
    background.push(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await
        {
            error!(%err, "http server exited");
        }
    }));

    Ok(VbmcHandle {
        http_addr,
        ipmi_servers,
        background,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_from_toml() {
        let raw = r#"
            listen = "127.0.0.1:9000"
            username = "operator"
            password = "secret"

            [ipmi]
            secret = "hunter2"
            allow_implicit_session = true

            [[machines]]
            name = "vm-a"
            ipmi_listen = "127.0.0.1:6230"

            [[machines]]
            name = "vm-b"
            ipmi_listen = "127.0.0.1:6231"
        "#;
        let config = VbmcConfig::from_toml(raw).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.username, "operator");
        assert_eq!(config.ipmi.secret.as_deref(), Some("hunter2"));
        assert!(config.ipmi.allow_implicit_session);
        assert_eq!(config.ipmi.idle_timeout_secs, 300);
        assert_eq!(config.session_timeout_secs, 600);
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.machines[1].name, "vm-b");
    }

    #[test]
    fn defaults_fill_an_empty_config() {
        let config = VbmcConfig::from_toml("").unwrap();
        assert_eq!(config.username, "admin");
        assert!(config.ipmi.secret.is_none());
        assert!(!config.ipmi.allow_implicit_session);
        assert!(config.machines.is_empty());
    }

    #[test]
    fn malformed_config_is_rejected() {
        assert!(matches!(
            VbmcConfig::from_toml("machines = 3"),
            Err(VbmcError::Config(_))
        ));
    }
}
