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

use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use vbmc::facade::{InMemoryVm, VmControl};
use vbmc::VbmcConfig;

#[derive(Debug, Parser)]
#[command(name = "vbmc", about = "IPMI and Redfish emulation for virtual machines")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "VBMC_CONFIG", default_value = "vbmc.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.config)
        .wrap_err_with(|| format!("reading {}", args.config))?;
    let config = VbmcConfig::from_toml(&raw)?;

    // Standalone mode keeps machine state in memory. Deployments embed the
    // library and pass a façade backed by their control plane instead.
    let facade: Arc<dyn VmControl> = Arc::new(InMemoryVm::new());
    let handle = vbmc::run(config, facade).await?;
    for (name, addr) in handle.ipmi_addrs() {
        tracing::info!(machine = %name, %addr, "ipmi endpoint");
    }
    tracing::info!(http = %handle.http_addr(), "vbmc running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.shutdown();
    Ok(())
}
