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

//! IPMI session lifecycle: challenge/activate handshake, auth-code checks,
//! per-peer sequence tracking and idle sweeping.
//!
//! At most one session exists per client address. A new challenge from the
//! same address replaces whatever was there, so a crashed client can always
//! start over without waiting for the sweep.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use super::codec::{SessionHeader, AUTH_TYPE_NONE, AUTH_TYPE_PASSWORD};
use super::dispatch::{
    CommandReply, CC_INSUFFICIENT_PRIVILEGE, CC_INVALID_SESSION_ID, CC_INVALID_USERNAME,
    CC_REQUEST_DATA_INVALID,
};

/// Administrator privilege level, the highest this BMC grants.
const PRIVILEGE_ADMIN: u8 = 0x04;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub username: String,
    /// Shared secret for straight-password authentication. `None` means only
    /// auth-type-none sessions are possible.
    pub secret: Option<String>,
    /// Accept chassis/app commands outside any activated session.
    pub allow_implicit_session: bool,
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            secret: None,
            allow_implicit_session: false,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Challenge issued, waiting for Activate Session.
    Challenge { temp_id: u32 },
    Active { session_id: u32 },
}

#[derive(Debug)]
struct PeerSession {
    phase: Phase,
    auth_type: u8,
    privilege: u8,
    last_seq: u32,
    /// Header sequence and command of the last accepted request, for the
    /// exact-retransmit allowance.
    last_request: Option<(u32, u8)>,
    last_activity: Instant,
}

/// Outcome of the sequence-number gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    Accept,
    /// Regressed or reused sequence that is not an exact retransmit.
    Stale,
}

#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    peers: Mutex<HashMap<SocketAddr, PeerSession>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn padded_secret(&self) -> Option<[u8; 16]> {
        let secret = self.config.secret.as_deref()?;
        let mut padded = [0u8; 16];
        let len = secret.len().min(16);
        padded[..len].copy_from_slice(&secret.as_bytes()[..len]);
        Some(padded)
    }

    fn auth_code_matches(&self, header: &SessionHeader) -> bool {
        match (self.padded_secret(), header.auth_type) {
            (None, AUTH_TYPE_NONE) => true,
            (Some(secret), AUTH_TYPE_PASSWORD) => header.auth_code == Some(secret),
            _ => false,
        }
    }

    /// Sequence gate, applied before dispatch. Only traffic inside an active
    /// session is tracked; sessionless datagrams carry sequence zero.
    pub fn check_sequence(&self, peer: SocketAddr, header: &SessionHeader, command: u8) -> SequenceCheck {
        let mut peers = self.peers.lock().unwrap();
        let Some(session) = peers.get_mut(&peer) else {
            return SequenceCheck::Accept;
        };
        let Phase::Active { session_id } = session.phase else {
            return SequenceCheck::Accept;
        };
        if header.session_id != session_id {
            return SequenceCheck::Accept;
        }
        session.last_activity = Instant::now();
        let seq = header.sequence;
        let wrapped = session.last_seq == u32::MAX && seq == 0;
        if seq > session.last_seq || wrapped {
            session.last_seq = seq;
            session.last_request = Some((seq, command));
            SequenceCheck::Accept
        } else if session.last_request == Some((seq, command)) {
            debug!(%peer, seq, command, "retransmitted request accepted");
            SequenceCheck::Accept
        } else {
            warn!(%peer, seq, last = session.last_seq, "stale session sequence");
            SequenceCheck::Stale
        }
    }

    /// Whether a non-establishment command may run for this peer.
    pub fn authorize(&self, peer: SocketAddr, header: &SessionHeader) -> bool {
        let peers = self.peers.lock().unwrap();
        if let Some(session) = peers.get(&peer) {
            if let Phase::Active { session_id } = session.phase {
                return header.session_id == session_id
                    && header.auth_type == session.auth_type
                    && self.auth_code_matches(header);
            }
        }
        self.config.allow_implicit_session
    }

    /// Get Session Challenge: records the pending activation and answers a
    /// temporary session id plus a 16-byte challenge.
    pub fn get_session_challenge(&self, peer: SocketAddr, data: &[u8]) -> CommandReply {
        if data.len() < 17 {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        }
        let auth_type = data[0] & 0x0F;
        let username: Vec<u8> = data[1..17].iter().copied().take_while(|&b| b != 0).collect();
        if username != self.config.username.as_bytes() {
            return CommandReply::completion(CC_INVALID_USERNAME);
        }
        let temp_id: u32 = rand::rng().random();
        let mut peers = self.peers.lock().unwrap();
        peers.insert(
            peer,
            PeerSession {
                phase: Phase::Challenge { temp_id },
                auth_type,
                privilege: PRIVILEGE_ADMIN,
                last_seq: 0,
                last_request: None,
                last_activity: Instant::now(),
            },
        );
        let mut reply = temp_id.to_le_bytes().to_vec();
        reply.extend_from_slice(&[0u8; 16]); // challenge string, unused by the password path
        CommandReply::ok(reply)
    }

    /// Activate Session: verifies the auth code against the configured
    /// secret and promotes the pending challenge to an active session.
    pub fn activate_session(
        &self,
        peer: SocketAddr,
        header: &SessionHeader,
        data: &[u8],
    ) -> CommandReply {
        if data.len() < 22 {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        }
        if !self.auth_code_matches(header) {
            warn!(%peer, "session activation with bad credentials");
            return CommandReply::completion(CC_INSUFFICIENT_PRIVILEGE);
        }
        {
            // When a challenge is pending the activation must quote its
            // temporary session id.
            let peers = self.peers.lock().unwrap();
            if let Some(PeerSession {
                phase: Phase::Challenge { temp_id },
                ..
            }) = peers.get(&peer)
            {
                if header.session_id != *temp_id {
                    return CommandReply::completion(CC_INVALID_SESSION_ID);
                }
            }
        }
        let requested_privilege = data[1] & 0x0F;
        let privilege = requested_privilege.min(PRIVILEGE_ADMIN);
        let session_id = loop {
            let id: u32 = rand::rng().random();
            if id != 0 {
                break id;
            }
        };
        let mut peers = self.peers.lock().unwrap();
        peers.insert(
            peer,
            PeerSession {
                phase: Phase::Active { session_id },
                auth_type: header.auth_type,
                privilege,
                last_seq: 0,
                last_request: None,
                last_activity: Instant::now(),
            },
        );
        info!(%peer, session_id, privilege, "session activated");
        let mut reply = vec![header.auth_type];
        reply.extend_from_slice(&session_id.to_le_bytes());
        reply.extend_from_slice(&1u32.to_le_bytes()); // initial inbound sequence
        reply.push(privilege);
        CommandReply::ok(reply)
    }

    /// Set Session Privilege Level: clamps to administrator and echoes the
    /// granted level.
    pub fn set_privilege_level(&self, peer: SocketAddr, data: &[u8]) -> CommandReply {
        if data.is_empty() {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        }
        let granted = (data[0] & 0x0F).min(PRIVILEGE_ADMIN);
        let mut peers = self.peers.lock().unwrap();
        if let Some(session) = peers.get_mut(&peer) {
            session.privilege = granted;
        }
        CommandReply::ok(vec![granted])
    }

    pub fn close_session(&self, peer: SocketAddr, data: &[u8]) -> CommandReply {
        if data.len() < 4 {
            return CommandReply::completion(CC_REQUEST_DATA_INVALID);
        }
        let requested = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let mut peers = self.peers.lock().unwrap();
        let matches = peers
            .get(&peer)
            .map(|session| matches!(session.phase, Phase::Active { session_id } if session_id == requested))
            .unwrap_or(false);
        if !matches {
            return CommandReply::completion(CC_INVALID_SESSION_ID);
        }
        peers.remove(&peer);
        info!(%peer, session_id = requested, "session closed");
        CommandReply::ok(Vec::new())
    }

    /// Drop sessions idle longer than the configured timeout. Returns how
    /// many were removed.
    pub fn sweep_idle(&self) -> usize {
        let mut peers = self.peers.lock().unwrap();
        let before = peers.len();
        peers.retain(|peer, session| {
            let keep = session.last_activity.elapsed() <= self.config.idle_timeout;
            if !keep {
                info!(%peer, privilege = session.privilege, "expiring idle session");
            }
            keep
        });
        before - peers.len()
    }

    #[cfg(test)]
    pub(crate) fn active_session_id(&self, peer: SocketAddr) -> Option<u32> {
        let peers = self.peers.lock().unwrap();
        match peers.get(&peer)?.phase {
            Phase::Active { session_id } => Some(session_id),
            Phase::Challenge { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::dispatch::CC_OK;
    use super::*;

    fn peer() -> SocketAddr {
        "192.0.2.10:54321".parse().unwrap()
    }

    fn header(auth_type: u8, sequence: u32, session_id: u32, code: Option<[u8; 16]>) -> SessionHeader {
        SessionHeader {
            auth_type,
            sequence,
            session_id,
            auth_code: code,
        }
    }

    fn padded(secret: &str) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..secret.len()].copy_from_slice(secret.as_bytes());
        out
    }

    fn challenge_data(username: &str) -> Vec<u8> {
        let mut data = vec![AUTH_TYPE_PASSWORD];
        let mut name = [0u8; 16];
        name[..username.len()].copy_from_slice(username.as_bytes());
        data.extend_from_slice(&name);
        data
    }

    fn activate_data() -> Vec<u8> {
        let mut data = vec![AUTH_TYPE_PASSWORD, 0x04];
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&1u32.to_le_bytes());
        data
    }

    fn manager_with_secret() -> SessionManager {
        SessionManager::new(SessionConfig {
            secret: Some("hunter2".to_string()),
            ..SessionConfig::default()
        })
    }

    fn temp_id(reply: &CommandReply) -> u32 {
        u32::from_le_bytes([reply.data[0], reply.data[1], reply.data[2], reply.data[3]])
    }

    #[test]
    fn full_handshake_grants_admin() {
        let manager = manager_with_secret();
        let reply = manager.get_session_challenge(peer(), &challenge_data("admin"));
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(reply.data.len(), 20);

        let hdr = header(AUTH_TYPE_PASSWORD, 0, temp_id(&reply), Some(padded("hunter2")));
        let reply = manager.activate_session(peer(), &hdr, &activate_data());
        assert_eq!(reply.completion, CC_OK);
        assert_eq!(reply.data[9], 0x04);
        let session_id = u32::from_le_bytes([reply.data[1], reply.data[2], reply.data[3], reply.data[4]]);
        assert_eq!(manager.active_session_id(peer()), Some(session_id));

        let session_hdr = header(AUTH_TYPE_PASSWORD, 1, session_id, Some(padded("hunter2")));
        assert!(manager.authorize(peer(), &session_hdr));

        let reply = manager.close_session(peer(), &session_id.to_le_bytes());
        assert_eq!(reply.completion, CC_OK);
        assert!(manager.active_session_id(peer()).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let manager = manager_with_secret();
        manager.get_session_challenge(peer(), &challenge_data("admin"));
        let hdr = header(AUTH_TYPE_PASSWORD, 0, 0, Some(padded("wrong")));
        let reply = manager.activate_session(peer(), &hdr, &activate_data());
        assert_eq!(reply.completion, CC_INSUFFICIENT_PRIVILEGE);
        assert!(manager.active_session_id(peer()).is_none());
    }

    #[test]
    fn unknown_username_is_rejected() {
        let manager = manager_with_secret();
        let reply = manager.get_session_challenge(peer(), &challenge_data("root"));
        assert_eq!(reply.completion, CC_INVALID_USERNAME);
    }

    #[test]
    fn sequence_never_regresses_except_exact_retransmit() {
        let manager = manager_with_secret();
        let reply = manager.get_session_challenge(peer(), &challenge_data("admin"));
        let hdr = header(AUTH_TYPE_PASSWORD, 0, temp_id(&reply), Some(padded("hunter2")));
        manager.activate_session(peer(), &hdr, &activate_data());
        let session_id = manager.active_session_id(peer()).unwrap();

        let at = |seq| header(AUTH_TYPE_PASSWORD, seq, session_id, Some(padded("hunter2")));
        assert_eq!(manager.check_sequence(peer(), &at(5), 0x01), SequenceCheck::Accept);
        assert_eq!(manager.check_sequence(peer(), &at(6), 0x01), SequenceCheck::Accept);
        // exact retransmit of the last request
        assert_eq!(manager.check_sequence(peer(), &at(6), 0x01), SequenceCheck::Accept);
        // same sequence, different command
        assert_eq!(manager.check_sequence(peer(), &at(6), 0x02), SequenceCheck::Stale);
        // regression
        assert_eq!(manager.check_sequence(peer(), &at(3), 0x01), SequenceCheck::Stale);
    }

    #[test]
    fn sequence_wraps_from_max_to_zero_only() {
        let manager = manager_with_secret();
        let reply = manager.get_session_challenge(peer(), &challenge_data("admin"));
        let hdr = header(AUTH_TYPE_PASSWORD, 0, temp_id(&reply), Some(padded("hunter2")));
        manager.activate_session(peer(), &hdr, &activate_data());
        let session_id = manager.active_session_id(peer()).unwrap();

        let at = |seq| header(AUTH_TYPE_PASSWORD, seq, session_id, Some(padded("hunter2")));
        assert_eq!(
            manager.check_sequence(peer(), &at(u32::MAX), 0x01),
            SequenceCheck::Accept
        );
        // only zero restarts the counter after the top of the range
        assert_eq!(manager.check_sequence(peer(), &at(2), 0x01), SequenceCheck::Stale);
        assert_eq!(manager.check_sequence(peer(), &at(0), 0x01), SequenceCheck::Accept);
        assert_eq!(manager.check_sequence(peer(), &at(1), 0x01), SequenceCheck::Accept);
    }

    #[test]
    fn implicit_sessions_follow_the_config_flag() {
        let strict = SessionManager::new(SessionConfig::default());
        let hdr = header(AUTH_TYPE_NONE, 0, 0, None);
        assert!(!strict.authorize(peer(), &hdr));

        let permissive = SessionManager::new(SessionConfig {
            allow_implicit_session: true,
            ..SessionConfig::default()
        });
        assert!(permissive.authorize(peer(), &hdr));
    }

    #[test]
    fn idle_sessions_are_swept() {
        let manager = SessionManager::new(SessionConfig {
            secret: Some("hunter2".to_string()),
            idle_timeout: Duration::from_secs(0),
            ..SessionConfig::default()
        });
        let reply = manager.get_session_challenge(peer(), &challenge_data("admin"));
        let hdr = header(AUTH_TYPE_PASSWORD, 0, temp_id(&reply), Some(padded("hunter2")));
        manager.activate_session(peer(), &hdr, &activate_data());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(manager.sweep_idle(), 1);
        assert!(manager.active_session_id(peer()).is_none());
    }
}
