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

//! Routing of decoded IPMI messages to per-netfn command handlers.
//!
//! Session establishment commands run before the authorization gate;
//! everything else requires an active session (or the implicit-session
//! config flag). Unknown function/command pairs always get a reply with
//! completion 0xC1 so clients never wait on a timeout.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::facade::{PowerState, VmControl};
use crate::machine::{BootSelection, Machine};

use super::codec::IpmiFrame;
use super::session::{SequenceCheck, SessionManager};

// Network function codes.
pub const NETFN_CHASSIS: u8 = 0x00;
pub const NETFN_SENSOR_EVENT: u8 = 0x04;
pub const NETFN_APP: u8 = 0x06;
pub const NETFN_STORAGE: u8 = 0x0A;

// Chassis commands.
pub const CMD_GET_CHASSIS_STATUS: u8 = 0x01;
pub const CMD_CHASSIS_CONTROL: u8 = 0x02;
pub const CMD_SET_BOOT_OPTIONS: u8 = 0x08;
pub const CMD_GET_BOOT_OPTIONS: u8 = 0x09;

// Application commands.
pub const CMD_GET_DEVICE_ID: u8 = 0x01;
pub const CMD_GET_CHANNEL_AUTH_CAPABILITIES: u8 = 0x38;
pub const CMD_GET_SESSION_CHALLENGE: u8 = 0x39;
pub const CMD_ACTIVATE_SESSION: u8 = 0x3A;
pub const CMD_SET_SESSION_PRIVILEGE: u8 = 0x3B;
pub const CMD_CLOSE_SESSION: u8 = 0x3C;

// Completion codes.
pub const CC_OK: u8 = 0x00;
pub const CC_PARAM_NOT_SUPPORTED: u8 = 0x80;
pub const CC_INVALID_USERNAME: u8 = 0x81;
pub const CC_INVALID_SESSION_ID: u8 = 0x87;
pub const CC_INVALID_COMMAND: u8 = 0xC1;
pub const CC_REQUEST_DATA_INVALID: u8 = 0xCC;
pub const CC_INSUFFICIENT_PRIVILEGE: u8 = 0xD4;
pub const CC_UNSPECIFIED: u8 = 0xFF;

// Chassis control selectors.
const CONTROL_POWER_DOWN: u8 = 0x00;
const CONTROL_POWER_UP: u8 = 0x01;
const CONTROL_POWER_CYCLE: u8 = 0x02;
const CONTROL_HARD_RESET: u8 = 0x03;
const CONTROL_DIAG_INTERRUPT: u8 = 0x04;
const CONTROL_SOFT_SHUTDOWN: u8 = 0x05;

const BOOT_PARAM_BOOT_FLAGS: u8 = 0x05;

/// Fixed Get Device ID record: device id 0x20, provides-SDRs revision,
/// firmware 0.1, IPMI 2.0, no manufacturer/product/aux identity.
const DEVICE_ID_RECORD: [u8; 15] = [
    0x20, 0x81, 0x00, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Completion code plus response data, before the wire framing is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub completion: u8,
    pub data: Vec<u8>,
}

impl CommandReply {
    pub fn ok(data: Vec<u8>) -> Self {
        Self {
            completion: CC_OK,
            data,
        }
    }

    pub fn completion(completion: u8) -> Self {
        Self {
            completion,
            data: Vec::new(),
        }
    }
}

/// Everything a handler may touch for one request.
pub struct CommandContext<'a> {
    pub machine: &'a Machine,
    pub facade: &'a dyn VmControl,
    pub peer: SocketAddr,
    pub frame: &'a IpmiFrame,
}

/// One handler per network function code.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, ctx: &CommandContext<'_>, command: u8, data: &[u8]) -> CommandReply;
}

#[derive(Debug)]
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    chassis: ChassisHandler,
    app: AppHandler,
    stub: StubHandler,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            chassis: ChassisHandler,
            app: AppHandler {
                sessions: Arc::clone(&sessions),
            },
            stub: StubHandler,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    fn handler_for(&self, netfn: u8) -> Option<&dyn CommandHandler> {
        match netfn {
            NETFN_CHASSIS => Some(&self.chassis),
            NETFN_APP => Some(&self.app),
            NETFN_SENSOR_EVENT | NETFN_STORAGE => Some(&self.stub),
            _ => None,
        }
    }

    pub fn dispatch(&self, ctx: &CommandContext<'_>) -> CommandReply {
        let message = &ctx.frame.message;
        if self.sessions.check_sequence(ctx.peer, &ctx.frame.session, message.command)
            == SequenceCheck::Stale
        {
            return CommandReply::completion(CC_UNSPECIFIED);
        }

        // Establishment commands run outside the authorization gate.
        match (message.netfn, message.command) {
            (NETFN_APP, CMD_GET_CHANNEL_AUTH_CAPABILITIES) => {
                return self.channel_auth_capabilities(&message.data);
            }
            (NETFN_APP, CMD_GET_SESSION_CHALLENGE) => {
                return self.sessions.get_session_challenge(ctx.peer, &message.data);
            }
            (NETFN_APP, CMD_ACTIVATE_SESSION) => {
                return self
                    .sessions
                    .activate_session(ctx.peer, &ctx.frame.session, &message.data);
            }
            (NETFN_APP, CMD_GET_DEVICE_ID) => {
                return CommandReply::ok(DEVICE_ID_RECORD.to_vec());
            }
            _ => {}
        }

        if !self.sessions.authorize(ctx.peer, &ctx.frame.session) {
            warn!(
                peer = %ctx.peer,
                netfn = message.netfn,
                command = message.command,
                "command refused without session"
            );
            return CommandReply::completion(CC_INSUFFICIENT_PRIVILEGE);
        }

        match self.handler_for(message.netfn) {
            Some(handler) => handler.handle(ctx, message.command, &message.data),
            None => {
                debug!(netfn = message.netfn, command = message.command, "unknown netfn");
                CommandReply::completion(CC_INVALID_COMMAND)
            }
        }
    }

    fn channel_auth_capabilities(&self, data: &[u8]) -> CommandReply {
        let mut channel = data.first().copied().unwrap_or(0x0E) & 0x0F;
        if channel == 0x0E {
            // 0x0E means "the channel this request arrived on".
            channel = 0x01;
        }
        let config = self.sessions.config();
        let mut auth_support = 0u8;
        if config.secret.is_some() {
            auth_support |= 0x10; // straight password
        }
        if config.secret.is_none() || config.allow_implicit_session {
            auth_support |= 0x01; // auth type none
        }
        CommandReply::ok(vec![channel, auth_support, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00])
    }
}

#[derive(Debug)]
struct ChassisHandler;

impl CommandHandler for ChassisHandler {
    fn handle(&self, ctx: &CommandContext<'_>, command: u8, data: &[u8]) -> CommandReply {
        match command {
            CMD_GET_CHASSIS_STATUS => self.status(ctx),
            CMD_CHASSIS_CONTROL => self.control(ctx, data),
            CMD_SET_BOOT_OPTIONS => self.set_boot_options(ctx, data),
            CMD_GET_BOOT_OPTIONS => self.get_boot_options(ctx, data),
            other => {
                debug!(command = other, "unknown chassis command");
                CommandReply::completion(CC_INVALID_COMMAND)
            }
        }
    }
}

impl ChassisHandler {
    fn status(&self, ctx: &CommandContext<'_>) -> CommandReply {
        let mut power_byte = 0u8;
        if ctx.machine.power_state(ctx.facade) == PowerState::On {
            power_byte |= 0x01;
        }
        // power state, last power event, misc chassis state, front panel
        CommandReply::ok(vec![power_byte, 0x00, 0x00, 0x00])
    }

    fn control(&self, ctx: &CommandContext<'_>, data: &[u8]) -> CommandReply {
        let Some(&action) = data.first() else {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        };
        let name = ctx.machine.name();
        let result = match action {
            CONTROL_POWER_DOWN => ctx.facade.power_off(name),
            CONTROL_POWER_UP => ctx.facade.power_on(name),
            CONTROL_POWER_CYCLE => ctx
                .facade
                .power_off(name)
                .and_then(|_| ctx.facade.power_on(name)),
            CONTROL_HARD_RESET => ctx.facade.reset(name),
            CONTROL_SOFT_SHUTDOWN => ctx.facade.graceful_shutdown(name),
            CONTROL_DIAG_INTERRUPT => {
                // No diagnostic interrupt line on a virtual machine.
                debug!(machine = %name, "diagnostic interrupt acknowledged and dropped");
                Ok(())
            }
            other => {
                debug!(action = other, "unknown chassis control action");
                return CommandReply::completion(CC_REQUEST_DATA_INVALID);
            }
        };
        ctx.machine.invalidate_power();
        match result {
            Ok(()) => CommandReply::ok(Vec::new()),
            Err(err) => {
                warn!(machine = %name, action, %err, "chassis control failed");
                CommandReply::completion(CC_UNSPECIFIED)
            }
        }
    }

    fn set_boot_options(&self, ctx: &CommandContext<'_>, data: &[u8]) -> CommandReply {
        let Some(&param) = data.first() else {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        };
        if param & 0x7F != BOOT_PARAM_BOOT_FLAGS {
            return CommandReply::completion(CC_PARAM_NOT_SUPPORTED);
        }
        let Some(&flags) = data.get(1) else {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        };
        let Some(selection) = BootSelection::from_byte(flags) else {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        };
        let name = ctx.machine.name();
        if let Err(err) = ctx
            .facade
            .set_boot_device(name, selection.device.facade_target())
        {
            warn!(machine = %name, %err, "boot device change failed");
            return CommandReply::completion(CC_UNSPECIFIED);
        }
        ctx.machine.set_boot_selection(selection);
        debug!(machine = %name, device = ?selection.device, "boot override updated");
        CommandReply::ok(Vec::new())
    }

    fn get_boot_options(&self, ctx: &CommandContext<'_>, data: &[u8]) -> CommandReply {
        if data.len() < 3 {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        }
        let param = data[0] & 0x7F;
        if param != BOOT_PARAM_BOOT_FLAGS {
            return CommandReply::completion(CC_PARAM_NOT_SUPPORTED);
        }
        let selection = ctx.machine.boot_selection();
        // parameter version, parameter selector, boot flags, two reserved
        CommandReply::ok(vec![0x01, param, selection.to_byte(), 0x00, 0x00])
    }
}

#[derive(Debug)]
struct AppHandler {
    sessions: Arc<SessionManager>,
}

impl CommandHandler for AppHandler {
    fn handle(&self, ctx: &CommandContext<'_>, command: u8, data: &[u8]) -> CommandReply {
        match command {
            CMD_SET_SESSION_PRIVILEGE => self.sessions.set_privilege_level(ctx.peer, data),
            CMD_CLOSE_SESSION => self.sessions.close_session(ctx.peer, data),
            other => {
                debug!(command = other, "unknown application command");
                CommandReply::completion(CC_INVALID_COMMAND)
            }
        }
    }
}

/// Sensor/event and storage probes get a "supported, no data" answer so
/// inventory tools move on instead of retrying.
#[derive(Debug)]
struct StubHandler;

impl CommandHandler for StubHandler {
    fn handle(&self, ctx: &CommandContext<'_>, command: u8, _data: &[u8]) -> CommandReply {
        debug!(
            machine = %ctx.machine.name(),
            netfn = ctx.frame.message.netfn,
            command,
            "stub reply for inventory probe"
        );
        CommandReply::ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::facade::{BootTarget, InMemoryVm};
    use crate::ipmi::codec::{LanMessage, SessionHeader, AUTH_TYPE_NONE};
    use crate::ipmi::session::SessionConfig;
    use crate::machine::MachineIdentity;

    use super::*;

    fn machine() -> Machine {
        Machine::new(MachineIdentity {
            name: "vm-test-1".to_string(),
            ipmi_bind: "127.0.0.1:0".parse().unwrap(),
        })
    }

    fn frame(netfn: u8, command: u8, data: Vec<u8>) -> IpmiFrame {
        IpmiFrame {
            rmcp_seq: 0xFF,
            session: SessionHeader {
                auth_type: AUTH_TYPE_NONE,
                sequence: 0,
                session_id: 0,
                auth_code: None,
            },
            message: LanMessage {
                target_addr: 0x20,
                netfn,
                source_addr: 0x81,
                sequence: 1,
                source_lun: 0,
                command,
                data,
            },
        }
    }

    fn implicit_dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(SessionManager::new(SessionConfig {
            allow_implicit_session: true,
            ..SessionConfig::default()
        })))
    }

    fn run(
        dispatcher: &Dispatcher,
        machine: &Machine,
        facade: &dyn VmControl,
        netfn: u8,
        command: u8,
        data: Vec<u8>,
    ) -> CommandReply {
        let frame = frame(netfn, command, data);
        let ctx = CommandContext {
            machine,
            facade,
            peer: "192.0.2.7:4242".parse().unwrap(),
            frame: &frame,
        };
        dispatcher.dispatch(&ctx)
    }

    #[test]
    fn chassis_status_reflects_facade_power() {
        let dispatcher = implicit_dispatcher();
        let machine = machine();
        let facade = InMemoryVm::new();
        facade.power_on(machine.name()).unwrap();

        let reply = run(&dispatcher, &machine, &facade, NETFN_CHASSIS, CMD_GET_CHASSIS_STATUS, vec![]);
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(reply.data[0] & 0x01, 0x01);
    }

    #[test]
    fn power_up_is_idempotent() {
        let dispatcher = implicit_dispatcher();
        let machine = machine();
        let facade = InMemoryVm::new();

        for _ in 0..2 {
            let reply = run(
                &dispatcher,
                &machine,
                &facade,
                NETFN_CHASSIS,
                CMD_CHASSIS_CONTROL,
                vec![CONTROL_POWER_UP],
            );
            assert_eq!(reply.completion, CC_OK);
        }
        assert_eq!(facade.power_state(machine.name()).unwrap(), PowerState::On);

        let reply = run(&dispatcher, &machine, &facade, NETFN_CHASSIS, CMD_GET_CHASSIS_STATUS, vec![]);
        assert_eq!(reply.data[0] & 0x01, 0x01);
    }

    #[test]
    fn power_cycle_ends_powered_on() {
        let dispatcher = implicit_dispatcher();
        let machine = machine();
        let facade = InMemoryVm::new();
        facade.power_on(machine.name()).unwrap();

        let reply = run(
            &dispatcher,
            &machine,
            &facade,
            NETFN_CHASSIS,
            CMD_CHASSIS_CONTROL,
            vec![CONTROL_POWER_CYCLE],
        );
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(facade.power_state(machine.name()).unwrap(), PowerState::On);
    }

    #[test]
    fn boot_options_round_trip() {
        let dispatcher = implicit_dispatcher();
        let machine = machine();
        let facade = InMemoryVm::new();

        // CD/DVD, persistent, valid
        let reply = run(
            &dispatcher,
            &machine,
            &facade,
            NETFN_CHASSIS,
            CMD_SET_BOOT_OPTIONS,
            vec![BOOT_PARAM_BOOT_FLAGS, 0xD4],
        );
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(facade.boot_target(machine.name()), BootTarget::Cdrom);

        let reply = run(
            &dispatcher,
            &machine,
            &facade,
            NETFN_CHASSIS,
            CMD_GET_BOOT_OPTIONS,
            vec![BOOT_PARAM_BOOT_FLAGS, 0x00, 0x00],
        );
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(reply.data, vec![0x01, 0x05, 0xD4, 0x00, 0x00]);
    }

    #[test]
    fn unsupported_boot_parameter_answers_0x80() {
        let dispatcher = implicit_dispatcher();
        let machine = machine();
        let facade = InMemoryVm::new();

        let reply = run(
            &dispatcher,
            &machine,
            &facade,
            NETFN_CHASSIS,
            CMD_SET_BOOT_OPTIONS,
            vec![0x03, 0x00],
        );
        assert_eq!(reply.completion, CC_PARAM_NOT_SUPPORTED);

        let reply = run(
            &dispatcher,
            &machine,
            &facade,
            NETFN_CHASSIS,
            CMD_GET_BOOT_OPTIONS,
            vec![0x03, 0x00, 0x00],
        );
        assert_eq!(reply.completion, CC_PARAM_NOT_SUPPORTED);
    }

    #[test]
    fn unknown_pairs_answer_command_not_supported() {
        let dispatcher = implicit_dispatcher();
        let machine = machine();
        let facade = InMemoryVm::new();

        let reply = run(&dispatcher, &machine, &facade, NETFN_CHASSIS, 0x55, vec![]);
        assert_eq!(reply.completion, CC_INVALID_COMMAND);

        let reply = run(&dispatcher, &machine, &facade, 0x2C, 0x01, vec![]);
        assert_eq!(reply.completion, CC_INVALID_COMMAND);
    }

    #[test]
    fn inventory_probes_get_stub_replies() {
        let dispatcher = implicit_dispatcher();
        let machine = machine();
        let facade = InMemoryVm::new();

        for netfn in [NETFN_SENSOR_EVENT, NETFN_STORAGE] {
            let reply = run(&dispatcher, &machine, &facade, netfn, 0x20, vec![]);
            assert_eq!(reply.completion, CC_OK);
            assert!(reply.data.is_empty());
        }
    }

    #[test]
    fn chassis_control_requires_a_session_by_default() {
        let dispatcher = Dispatcher::new(Arc::new(SessionManager::new(SessionConfig::default())));
        let machine = machine();
        let facade = InMemoryVm::new();

        let reply = run(
            &dispatcher,
            &machine,
            &facade,
            NETFN_CHASSIS,
            CMD_CHASSIS_CONTROL,
            vec![CONTROL_POWER_UP],
        );
        assert_eq!(reply.completion, CC_INSUFFICIENT_PRIVILEGE);
        assert_eq!(facade.power_state(machine.name()).unwrap(), PowerState::Off);
    }

    #[test]
    fn device_id_is_answerable_without_a_session() {
        let dispatcher = Dispatcher::new(Arc::new(SessionManager::new(SessionConfig::default())));
        let machine = machine();
        let facade = InMemoryVm::new();

        let reply = run(&dispatcher, &machine, &facade, NETFN_APP, CMD_GET_DEVICE_ID, vec![]);
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(reply.data.len(), 15);
        assert_eq!(reply.data[0], 0x20);
    }

    #[test]
    fn auth_capabilities_advertise_configured_types() {
        let machine = machine();
        let facade = InMemoryVm::new();

        let open = implicit_dispatcher();
        let reply = run(&open, &machine, &facade, NETFN_APP, CMD_GET_CHANNEL_AUTH_CAPABILITIES, vec![0x0E, 0x04]);
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(reply.data[0], 0x01);
        assert_eq!(reply.data[1] & 0x01, 0x01);

        let secured = Dispatcher::new(Arc::new(SessionManager::new(SessionConfig {
            secret: Some("hunter2".to_string()),
            ..SessionConfig::default()
        })));
        let reply = run(&secured, &machine, &facade, NETFN_APP, CMD_GET_CHANNEL_AUTH_CAPABILITIES, vec![0x0E, 0x04]);
        assert_eq!(reply.data[1], 0x10);
    }
}
