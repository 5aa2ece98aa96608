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

//! One UDP listener task per machine. Datagrams on a socket are handled in
//! arrival order, so a slow request only delays its own machine's traffic.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::facade::VmControl;
use crate::machine::Machine;

use super::codec::{self, Frame};
use super::dispatch::{CommandContext, Dispatcher};

const MAX_DATAGRAM: usize = 4096;

/// Running IPMI listener for one machine.
#[derive(Debug)]
pub struct IpmiServer {
    machine: Arc<Machine>,
    dispatcher: Arc<Dispatcher>,
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl IpmiServer {
    pub async fn spawn(
        machine: Arc<Machine>,
        facade: Arc<dyn VmControl>,
        dispatcher: Arc<Dispatcher>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(machine.identity.ipmi_bind).await?;
        let local_addr = socket.local_addr()?;
        info!(machine = %machine.name(), %local_addr, "ipmi listener up");
        let handle = tokio::spawn(serve(
            socket,
            Arc::clone(&machine),
            facade,
            Arc::clone(&dispatcher),
        ));
        Ok(Self {
            machine,
            dispatcher,
            local_addr,
            handle,
        })
    }

    pub fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for IpmiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    socket: UdpSocket,
    machine: Arc<Machine>,
    facade: Arc<dyn VmControl>,
    dispatcher: Arc<Dispatcher>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!(machine = %machine.name(), %err, "udp receive failed");
                continue;
            }
        };
        let Some(reply) = handle_datagram(&machine, facade.as_ref(), &dispatcher, peer, &buf[..len])
        else {
            continue;
        };
        if let Err(err) = socket.send_to(&reply, peer).await {
            warn!(machine = %machine.name(), %peer, %err, "udp send failed");
        }
    }
}

/// Decode one datagram and produce the reply bytes, if any. Malformed
/// datagrams are logged and dropped without an answer.
pub fn handle_datagram(
    machine: &Machine,
    facade: &dyn VmControl,
    dispatcher: &Dispatcher,
    peer: SocketAddr,
    datagram: &[u8],
) -> Option<Vec<u8>> {
    match codec::decode_datagram(datagram) {
        Ok(Frame::Ping(ping)) => {
            debug!(machine = %machine.name(), %peer, "presence ping");
            Some(ping.encode_pong())
        }
        Ok(Frame::Ipmi(frame)) => {
            let ctx = CommandContext {
                machine,
                facade,
                peer,
                frame: &frame,
            };
            let reply = dispatcher.dispatch(&ctx);
            debug!(
                machine = %machine.name(),
                %peer,
                netfn = frame.message.netfn,
                command = frame.message.command,
                completion = reply.completion,
                "ipmi request handled"
            );
            Some(frame.encode_reply(reply.completion, &reply.data))
        }
        Err(err) => {
            warn!(machine = %machine.name(), %peer, %err, "dropping malformed datagram");
            None
        }
    }
}
