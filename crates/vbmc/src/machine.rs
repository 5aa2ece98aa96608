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

//! Per-machine identity and the small amount of state the two protocol
//! engines share: a cached power state and the current boot override.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::facade::{BootTarget, PowerState, VmControl};

/// How long a power-state answer from the façade stays fresh before the next
/// status query re-polls.
const POWER_CACHE_TTL: Duration = Duration::from_secs(5);

/// Stable naming for the three Redfish resources derived from one machine.
#[derive(Debug, Clone)]
pub struct MachineIdentity {
    pub name: String,
    /// UDP address the machine's IPMI listener binds.
    pub ipmi_bind: SocketAddr,
}

impl MachineIdentity {
    pub fn system_id(&self) -> &str {
        &self.name
    }

    pub fn manager_id(&self) -> String {
        format!("{}-bmc", self.name)
    }

    pub fn chassis_id(&self) -> String {
        format!("{}-chassis", self.name)
    }
}

/// Boot device selector carried in IPMI boot-option parameter 5, bits 2-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootDeviceCode {
    NoOverride = 0x0,
    Pxe = 0x1,
    Hdd = 0x2,
    SafeModeHdd = 0x3,
    DiagPartition = 0x4,
    CdDvd = 0x5,
    BiosSetup = 0x6,
    RemoteFloppy = 0x7,
    RemoteCdDvd = 0x8,
    PrimaryRemoteMedia = 0x9,
}

impl BootDeviceCode {
    /// Parse the 4-bit selector (already shifted down from bits 2-5).
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x0 => Some(Self::NoOverride),
            0x1 => Some(Self::Pxe),
            0x2 => Some(Self::Hdd),
            0x3 => Some(Self::SafeModeHdd),
            0x4 => Some(Self::DiagPartition),
            0x5 => Some(Self::CdDvd),
            0x6 => Some(Self::BiosSetup),
            0x7 => Some(Self::RemoteFloppy),
            0x8 => Some(Self::RemoteCdDvd),
            0x9 => Some(Self::PrimaryRemoteMedia),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn facade_target(self) -> BootTarget {
        match self {
            Self::NoOverride => BootTarget::Default,
            Self::Pxe => BootTarget::Network,
            Self::Hdd | Self::SafeModeHdd => BootTarget::Disk,
            Self::DiagPartition => BootTarget::Diagnostics,
            Self::CdDvd | Self::RemoteCdDvd | Self::PrimaryRemoteMedia => BootTarget::Cdrom,
            Self::BiosSetup => BootTarget::BiosSetup,
            Self::RemoteFloppy => BootTarget::Floppy,
        }
    }

    pub fn redfish_target(self) -> &'static str {
        match self {
            Self::NoOverride => "None",
            Self::Pxe => "Pxe",
            Self::Hdd | Self::SafeModeHdd => "Hdd",
            Self::DiagPartition => "Diags",
            Self::CdDvd | Self::RemoteCdDvd | Self::PrimaryRemoteMedia => "Cd",
            Self::BiosSetup => "BiosSetup",
            Self::RemoteFloppy => "Floppy",
        }
    }

    pub fn from_redfish_target(target: &str) -> Option<Self> {
        match target {
            "None" => Some(Self::NoOverride),
            "Pxe" => Some(Self::Pxe),
            "Hdd" => Some(Self::Hdd),
            "Cd" => Some(Self::CdDvd),
            "BiosSetup" => Some(Self::BiosSetup),
            "Floppy" => Some(Self::RemoteFloppy),
            "Diags" => Some(Self::DiagPartition),
            _ => None,
        }
    }
}

/// Current boot override. `valid` and `persistent` carry bits 7 and 6 of the
/// IPMI boot byte and map onto Redfish `BootSourceOverrideEnabled`.
#[derive(Debug, Clone, Copy)]
pub struct BootSelection {
    pub device: BootDeviceCode,
    pub persistent: bool,
    pub valid: bool,
}

impl Default for BootSelection {
    fn default() -> Self {
        Self {
            device: BootDeviceCode::NoOverride,
            persistent: false,
            valid: false,
        }
    }
}

impl BootSelection {
    /// Encode as the boot-option parameter 5 data byte.
    pub fn to_byte(self) -> u8 {
        let mut byte = self.device.bits() << 2;
        if self.persistent {
            byte |= 0x40;
        }
        if self.valid {
            byte |= 0x80;
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(Self {
            device: BootDeviceCode::from_bits((byte >> 2) & 0x0F)?,
            persistent: byte & 0x40 != 0,
            valid: byte & 0x80 != 0,
        })
    }

    pub fn redfish_enabled(self) -> &'static str {
        if !self.valid {
            "Disabled"
        } else if self.persistent {
            "Continuous"
        } else {
            "Once"
        }
    }
}

#[derive(Debug)]
struct PowerCache {
    state: PowerState,
    fresh_until: Option<Instant>,
}

/// One emulated machine. Cheap to clone via `Arc`; the locks below are the
/// only state the IPMI and Redfish engines share.
#[derive(Debug)]
pub struct Machine {
    pub identity: MachineIdentity,
    power: Mutex<PowerCache>,
    boot: Mutex<BootSelection>,
}

impl Machine {
    pub fn new(identity: MachineIdentity) -> Self {
        Self {
            identity,
            power: Mutex::new(PowerCache {
                state: PowerState::Unknown,
                fresh_until: None,
            }),
            boot: Mutex::new(BootSelection::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Power state, re-polled through the façade when the cache is stale.
    pub fn power_state(&self, facade: &dyn VmControl) -> PowerState {
        let mut cache = self.power.lock().unwrap();
        let stale = match cache.fresh_until {
            Some(deadline) => Instant::now() > deadline,
            None => true,
        };
        if stale {
            match facade.power_state(self.name()) {
                Ok(state) => {
                    cache.state = state;
                    cache.fresh_until = Some(Instant::now() + POWER_CACHE_TTL);
                }
                Err(err) => {
                    warn!(machine = %self.name(), %err, "power state query failed");
                    cache.state = PowerState::Unknown;
                    cache.fresh_until = None;
                }
            }
        }
        cache.state
    }

    /// Drop the cached power state. Called after every control action so the
    /// next status query reflects the action's outcome.
    pub fn invalidate_power(&self) {
        let mut cache = self.power.lock().unwrap();
        cache.fresh_until = None;
    }

    pub fn boot_selection(&self) -> BootSelection {
        *self.boot.lock().unwrap()
    }

    pub fn set_boot_selection(&self, selection: BootSelection) {
        *self.boot.lock().unwrap() = selection;
    }
}

/// All machines this instance fronts, indexed by name.
#[derive(Debug, Default)]
pub struct MachineTable {
    by_name: HashMap<String, Arc<Machine>>,
}

impl MachineTable {
    pub fn new(machines: impl IntoIterator<Item = MachineIdentity>) -> Self {
        let by_name = machines
            .into_iter()
            .map(|identity| (identity.name.clone(), Arc::new(Machine::new(identity))))
            .collect();
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Machine>> {
        self.by_name.get(name)
    }

    /// Resolve a `{name}-bmc` manager id back to its machine.
    pub fn by_manager_id(&self, manager_id: &str) -> Option<&Arc<Machine>> {
        let name = manager_id.strip_suffix("-bmc")?;
        self.by_name.get(name)
    }

    /// Resolve a `{name}-chassis` chassis id back to its machine.
    pub fn by_chassis_id(&self, chassis_id: &str) -> Option<&Arc<Machine>> {
        let name = chassis_id.strip_suffix("-chassis")?;
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Machine>> {
        self.by_name.values()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_byte_round_trip() {
        let selection = BootSelection {
            device: BootDeviceCode::CdDvd,
            persistent: true,
            valid: true,
        };
        assert_eq!(selection.to_byte(), 0xD4);
        let parsed = BootSelection::from_byte(0xD4).unwrap();
        assert_eq!(parsed.device, BootDeviceCode::CdDvd);
        assert!(parsed.persistent);
        assert!(parsed.valid);
    }

    #[test]
    fn boot_byte_rejects_unknown_selector() {
        // Selector 0xB is reserved.
        assert!(BootSelection::from_byte(0xB << 2).is_none());
    }

    #[test]
    fn identity_derives_resource_ids() {
        let identity = MachineIdentity {
            name: "vm-test-1".to_string(),
            ipmi_bind: "127.0.0.1:623".parse().unwrap(),
        };
        assert_eq!(identity.system_id(), "vm-test-1");
        assert_eq!(identity.manager_id(), "vm-test-1-bmc");
        assert_eq!(identity.chassis_id(), "vm-test-1-chassis");
    }

    #[test]
    fn override_enabled_mapping() {
        let mut selection = BootSelection::default();
        assert_eq!(selection.redfish_enabled(), "Disabled");
        selection.valid = true;
        assert_eq!(selection.redfish_enabled(), "Once");
        selection.persistent = true;
        assert_eq!(selection.redfish_enabled(), "Continuous");
    }
}
