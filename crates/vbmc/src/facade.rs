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

//! Seam between the protocol engines and the virtualization control plane.
//!
//! Both the IPMI dispatcher and the Redfish handlers drive machines through
//! [`VmControl`] and never talk to the hypervisor directly. Production
//! deployments implement the trait against their control plane; tests and the
//! standalone binary use [`InMemoryVm`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use thiserror::Error;

/// Power state of a machine as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    /// The control plane could not be reached or gave no answer.
    Unknown,
}

impl PowerState {
    pub fn redfish_name(&self) -> &'static str {
        match self {
            PowerState::On => "On",
            PowerState::Off => "Off",
            PowerState::Unknown => "Unknown",
        }
    }
}

/// Boot device requested of the control plane, already lifted out of the
/// wire-level encodings of either protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootTarget {
    /// Clear any override and boot the configured order.
    Default,
    Network,
    Disk,
    Cdrom,
    BiosSetup,
    Floppy,
    Diagnostics,
}

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("unknown machine: {0}")]
    UnknownMachine(String),

    #[error("control plane rejected the operation: {0}")]
    Rejected(String),

    #[error("control plane unavailable: {0}")]
    Unavailable(String),
}

/// Abstract control over the virtual machines this BMC fronts.
///
/// Implementations are synchronous and must be cheap enough to call from the
/// protocol tasks; anything slow belongs behind the implementor's own queue.
pub trait VmControl: Debug + Send + Sync {
    fn power_on(&self, machine: &str) -> Result<(), FacadeError>;
    fn power_off(&self, machine: &str) -> Result<(), FacadeError>;
    fn reset(&self, machine: &str) -> Result<(), FacadeError>;
    fn graceful_shutdown(&self, machine: &str) -> Result<(), FacadeError>;
    fn power_state(&self, machine: &str) -> Result<PowerState, FacadeError>;
    fn set_boot_device(&self, machine: &str, target: BootTarget) -> Result<(), FacadeError>;
    /// Attach an ISO/floppy image. Returns false if the machine has no
    /// matching removable device.
    fn mount_media(&self, machine: &str, image: &str) -> Result<bool, FacadeError>;
    fn unmount_media(&self, machine: &str) -> Result<bool, FacadeError>;
}

/// Self-contained [`VmControl`] used by the standalone binary and the tests.
/// Keeps per-machine power state in memory and accepts every operation.
#[derive(Debug, Default)]
pub struct InMemoryVm {
    machines: Mutex<HashMap<String, SimulatedVm>>,
}

#[derive(Debug, Clone)]
struct SimulatedVm {
    power: PowerState,
    boot: BootTarget,
    media: Option<String>,
}

impl Default for SimulatedVm {
    fn default() -> Self {
        Self {
            power: PowerState::Off,
            boot: BootTarget::Default,
            media: None,
        }
    }
}

impl InMemoryVm {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_vm<T>(&self, machine: &str, f: impl FnOnce(&mut SimulatedVm) -> T) -> T {
        let mut machines = self.machines.lock().unwrap();
        let vm = machines.entry(machine.to_string()).or_default();
        f(vm)
    }

    /// Current boot target, for assertions in tests.
    pub fn boot_target(&self, machine: &str) -> BootTarget {
        self.with_vm(machine, |vm| vm.boot)
    }

    /// Currently mounted image, for assertions in tests.
    pub fn mounted_image(&self, machine: &str) -> Option<String> {
        self.with_vm(machine, |vm| vm.media.clone())
    }
}

impl VmControl for InMemoryVm {
    fn power_on(&self, machine: &str) -> Result<(), FacadeError> {
        self.with_vm(machine, |vm| vm.power = PowerState::On);
        Ok(())
    }

    fn power_off(&self, machine: &str) -> Result<(), FacadeError> {
        self.with_vm(machine, |vm| vm.power = PowerState::Off);
        Ok(())
    }

    fn reset(&self, machine: &str) -> Result<(), FacadeError> {
        self.with_vm(machine, |vm| vm.power = PowerState::On);
        Ok(())
    }

    fn graceful_shutdown(&self, machine: &str) -> Result<(), FacadeError> {
        self.with_vm(machine, |vm| vm.power = PowerState::Off);
        Ok(())
    }

    fn power_state(&self, machine: &str) -> Result<PowerState, FacadeError> {
        Ok(self.with_vm(machine, |vm| vm.power))
    }

    fn set_boot_device(&self, machine: &str, target: BootTarget) -> Result<(), FacadeError> {
        self.with_vm(machine, |vm| vm.boot = target);
        Ok(())
    }

    fn mount_media(&self, machine: &str, image: &str) -> Result<bool, FacadeError> {
        self.with_vm(machine, |vm| vm.media = Some(image.to_string()));
        Ok(true)
    }

    fn unmount_media(&self, machine: &str) -> Result<bool, FacadeError> {
        Ok(self.with_vm(machine, |vm| vm.media.take().is_some()))
    }
}
