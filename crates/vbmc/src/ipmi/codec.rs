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

//! RMCP/ASF framing and the IPMI-over-LAN message codec.
//!
//! Every multi-byte session-header field is big-endian on the wire; payload
//! fields inside individual commands stay little-endian. Both checksums are
//! verified strictly and any violation surfaces as a [`DecodeError`], which
//! the transport logs and drops without replying.

use thiserror::Error;

pub const RMCP_VERSION: u8 = 0x06;
pub const RMCP_CLASS_ASF: u8 = 0x06;
pub const RMCP_CLASS_IPMI: u8 = 0x07;

pub const AUTH_TYPE_NONE: u8 = 0x00;
pub const AUTH_TYPE_PASSWORD: u8 = 0x04;

const ASF_MSG_PING: u8 = 0x80;
const ASF_MSG_PONG: u8 = 0x40;

/// Fixed pong body: ASF header (IANA enterprise 4542, pong, tag 0, data
/// length 4) plus the supported-entities word advertising IPMI.
pub const PONG_DATA: [u8; 12] = [
    0x00, 0x00, 0x11, 0xBE, ASF_MSG_PONG, 0x00, 0x00, 0x04, 0x81, 0x00, 0x00, 0x00,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("unsupported RMCP version {0:#04x}")]
    BadVersion(u8),

    #[error("unknown RMCP message class {0:#04x}")]
    UnknownClass(u8),

    #[error("unsupported ASF message type {0:#04x}")]
    UnsupportedAsf(u8),

    #[error("unsupported authentication type {0:#04x}")]
    UnsupportedAuthType(u8),

    #[error("header checksum mismatch")]
    HeaderChecksum,

    #[error("payload checksum mismatch")]
    DataChecksum,
}

/// Two's-complement checksum over a byte range. A range followed by its
/// checksum sums to zero mod 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

fn sums_to_zero(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
}

/// A decoded datagram: either an ASF presence ping or an IPMI session frame.
#[derive(Debug)]
pub enum Frame {
    Ping(PingFrame),
    Ipmi(IpmiFrame),
}

#[derive(Debug)]
pub struct PingFrame {
    pub rmcp_seq: u8,
}

/// IPMI session wrapper preceding the LAN message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    pub auth_type: u8,
    pub sequence: u32,
    pub session_id: u32,
    pub auth_code: Option<[u8; 16]>,
}

/// Inner IPMI LAN message with both address bytes and checksums stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanMessage {
    pub target_addr: u8,
    pub netfn: u8,
    pub source_addr: u8,
    pub sequence: u8,
    pub source_lun: u8,
    pub command: u8,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct IpmiFrame {
    pub rmcp_seq: u8,
    pub session: SessionHeader,
    pub message: LanMessage,
}

pub fn decode_datagram(buf: &[u8]) -> Result<Frame, DecodeError> {
    if buf.len() < 4 {
        return Err(DecodeError::Truncated {
            need: 4,
            got: buf.len(),
        });
    }
    if buf[0] != RMCP_VERSION {
        return Err(DecodeError::BadVersion(buf[0]));
    }
    let rmcp_seq = buf[2];
    match buf[3] {
        RMCP_CLASS_ASF => decode_ping(rmcp_seq, &buf[4..]).map(Frame::Ping),
        RMCP_CLASS_IPMI => decode_ipmi(rmcp_seq, &buf[4..]).map(Frame::Ipmi),
        other => Err(DecodeError::UnknownClass(other)),
    }
}

fn decode_ping(rmcp_seq: u8, body: &[u8]) -> Result<PingFrame, DecodeError> {
    // Liveness probes may be as short as the bare RMCP header. When the ASF
    // header is present its message type (IANA number first, type at offset
    // 4) must be a ping.
    if body.len() > 4 && body[4] != ASF_MSG_PING {
        return Err(DecodeError::UnsupportedAsf(body[4]));
    }
    Ok(PingFrame { rmcp_seq })
}

fn decode_ipmi(rmcp_seq: u8, body: &[u8]) -> Result<IpmiFrame, DecodeError> {
    if body.len() < 10 {
        return Err(DecodeError::Truncated {
            need: 14,
            got: body.len() + 4,
        });
    }
    let auth_type = body[0];
    let sequence = u32::from_be_bytes([body[1], body[2], body[3], body[4]]);
    let session_id = u32::from_be_bytes([body[5], body[6], body[7], body[8]]);
    let mut offset = 9;
    let auth_code = match auth_type {
        AUTH_TYPE_NONE => None,
        AUTH_TYPE_PASSWORD => {
            if body.len() < offset + 17 {
                return Err(DecodeError::Truncated {
                    need: offset + 17 + 4,
                    got: body.len() + 4,
                });
            }
            let mut code = [0u8; 16];
            code.copy_from_slice(&body[offset..offset + 16]);
            offset += 16;
            Some(code)
        }
        other => return Err(DecodeError::UnsupportedAuthType(other)),
    };
    let msg_len = body[offset] as usize;
    offset += 1;
    let remaining = &body[offset..];
    if remaining.len() < msg_len {
        return Err(DecodeError::Truncated {
            need: offset + msg_len + 4,
            got: body.len() + 4,
        });
    }
    let message = decode_message(&remaining[..msg_len])?;
    Ok(IpmiFrame {
        rmcp_seq,
        session: SessionHeader {
            auth_type,
            sequence,
            session_id,
            auth_code,
        },
        message,
    })
}

/// Decode a bare LAN message (the part after the session header).
pub fn decode_message(buf: &[u8]) -> Result<LanMessage, DecodeError> {
    if buf.len() < 7 {
        return Err(DecodeError::Truncated {
            need: 7,
            got: buf.len(),
        });
    }
    if !sums_to_zero(&buf[..3]) {
        return Err(DecodeError::HeaderChecksum);
    }
    if !sums_to_zero(&buf[3..]) {
        return Err(DecodeError::DataChecksum);
    }
    Ok(LanMessage {
        target_addr: buf[0],
        netfn: buf[1] >> 2,
        source_addr: buf[3],
        sequence: buf[4] >> 2,
        source_lun: buf[4] & 0x03,
        command: buf[5],
        data: buf[6..buf.len() - 1].to_vec(),
    })
}

/// Build the reply message for a request: addresses mirrored, response netfn
/// (request | 1), requester sequence and LUN preserved, completion code
/// prefixed to the data, both checksums recomputed.
pub fn encode_message_reply(request: &LanMessage, completion: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len());
    out.push(request.source_addr);
    out.push(((request.netfn | 1) << 2) | request.source_lun);
    out.push(checksum(&out[..2]));
    let body_start = out.len();
    out.push(request.target_addr);
    out.push((request.sequence << 2) | request.source_lun);
    out.push(request.command);
    out.push(completion);
    out.extend_from_slice(data);
    let body_checksum = checksum(&out[body_start..]);
    out.push(body_checksum);
    out
}

impl IpmiFrame {
    /// Encode a full reply datagram echoing the request's RMCP sequence and
    /// session header. Authenticated requests get the request's 16-byte auth
    /// code echoed back so strict clients can validate the response.
    pub fn encode_reply(&self, completion: u8, data: &[u8]) -> Vec<u8> {
        let message = encode_message_reply(&self.message, completion, data);
        let mut out = Vec::with_capacity(30 + message.len());
        out.extend_from_slice(&[RMCP_VERSION, 0x00, self.rmcp_seq, RMCP_CLASS_IPMI]);
        out.push(self.session.auth_type);
        out.extend_from_slice(&self.session.sequence.to_be_bytes());
        out.extend_from_slice(&self.session.session_id.to_be_bytes());
        if self.session.auth_type != AUTH_TYPE_NONE {
            out.extend_from_slice(&self.session.auth_code.unwrap_or([0u8; 16]));
        }
        out.push(message.len() as u8);
        out.extend_from_slice(&message);
        out
    }
}

impl PingFrame {
    pub fn encode_pong(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&[RMCP_VERSION, 0x00, self.rmcp_seq, RMCP_CLASS_ASF]);
        out.extend_from_slice(&PONG_DATA);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lan_message(netfn: u8, command: u8, data: &[u8]) -> Vec<u8> {
        let mut msg = vec![0x20, netfn << 2];
        msg.push(checksum(&msg[..2]));
        let body_start = msg.len();
        msg.push(0x81);
        msg.push(0x04); // requester sequence 1, LUN 0
        msg.push(command);
        msg.extend_from_slice(data);
        let body_checksum = checksum(&msg[body_start..]);
        msg.push(body_checksum);
        msg
    }

    fn session_datagram(netfn: u8, command: u8, data: &[u8]) -> Vec<u8> {
        let msg = lan_message(netfn, command, data);
        let mut out = vec![RMCP_VERSION, 0x00, 0xFF, RMCP_CLASS_IPMI];
        out.push(AUTH_TYPE_NONE);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.push(msg.len() as u8);
        out.extend_from_slice(&msg);
        out
    }

    #[test]
    fn checksum_known_value() {
        assert_eq!(checksum(&[0x20, 0x18]), 0xC8);
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn presence_ping_gets_fixed_pong() {
        let ping = [
            0x06, 0x00, 0xFF, 0x06, // RMCP header, ASF class
            0x00, 0x00, 0x11, 0xBE, // IANA 4542
            0x80, 0x42, 0x00, 0x00, // ping, tag, reserved, no data
        ];
        let Frame::Ping(frame) = decode_datagram(&ping).unwrap() else {
            panic!("expected ping");
        };
        let pong = frame.encode_pong();
        assert_eq!(&pong[..4], &[0x06, 0x00, 0xFF, 0x06]);
        assert_eq!(&pong[4..], &PONG_DATA);
    }

    #[test]
    fn bare_rmcp_header_counts_as_ping() {
        // Some probes send nothing past the RMCP header.
        let Frame::Ping(frame) = decode_datagram(&[0x06, 0x00, 0xFF, 0x06]).unwrap() else {
            panic!("expected ping");
        };
        let pong = frame.encode_pong();
        assert_eq!(&pong[..4], &[0x06, 0x00, 0xFF, 0x06]);
        assert_eq!(&pong[4..], &PONG_DATA);
    }

    #[test]
    fn non_ping_asf_message_is_rejected() {
        let mut datagram = vec![0x06, 0x00, 0xFF, 0x06];
        datagram.extend_from_slice(&[0x00, 0x00, 0x11, 0xBE, ASF_MSG_PONG, 0x00, 0x00, 0x00]);
        assert!(matches!(
            decode_datagram(&datagram),
            Err(DecodeError::UnsupportedAsf(ASF_MSG_PONG))
        ));
    }

    #[test]
    fn decodes_chassis_status_request() {
        let datagram = session_datagram(0x00, 0x01, &[]);
        let Frame::Ipmi(frame) = decode_datagram(&datagram).unwrap() else {
            panic!("expected ipmi frame");
        };
        assert_eq!(frame.session.auth_type, AUTH_TYPE_NONE);
        assert_eq!(frame.session.sequence, 0);
        assert_eq!(frame.message.netfn, 0x00);
        assert_eq!(frame.message.command, 0x01);
        assert_eq!(frame.message.target_addr, 0x20);
        assert_eq!(frame.message.source_addr, 0x81);
        assert_eq!(frame.message.sequence, 1);
        assert!(frame.message.data.is_empty());
    }

    #[test]
    fn reply_mirrors_addresses_and_sets_response_netfn() {
        let datagram = session_datagram(0x00, 0x01, &[]);
        let Frame::Ipmi(frame) = decode_datagram(&datagram).unwrap() else {
            panic!("expected ipmi frame");
        };
        let reply = frame.encode_reply(0x00, &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(&reply[..4], &[0x06, 0x00, 0xFF, 0x07]);
        // session echo: auth none, sequence 0, session id 0
        assert_eq!(&reply[4..13], &[0; 9]);
        let msg = &reply[14..];
        assert_eq!(msg.len(), reply[13] as usize);
        assert_eq!(msg[0], 0x81); // requester address mirrored back
        assert_eq!(msg[1] >> 2, 0x01); // chassis response netfn
        assert_eq!(msg[3], 0x20);
        assert_eq!(msg[4] >> 2, 1); // requester sequence preserved
        assert_eq!(msg[5], 0x01);
        assert_eq!(msg[6], 0x00); // completion code
        assert_eq!(msg[7], 0x01); // power bit
        // reply must itself decode cleanly
        let parsed = decode_message(msg).unwrap();
        assert_eq!(parsed.data, &[0x00, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn authenticated_header_round_trip() {
        let msg = lan_message(0x06, 0x3B, &[0x04]);
        let mut out = vec![RMCP_VERSION, 0x00, 0x02, RMCP_CLASS_IPMI];
        out.push(AUTH_TYPE_PASSWORD);
        out.extend_from_slice(&7u32.to_be_bytes());
        out.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        let mut code = [0u8; 16];
        code[..6].copy_from_slice(b"secret");
        out.extend_from_slice(&code);
        out.push(msg.len() as u8);
        out.extend_from_slice(&msg);

        let Frame::Ipmi(frame) = decode_datagram(&out).unwrap() else {
            panic!("expected ipmi frame");
        };
        assert_eq!(frame.session.auth_type, AUTH_TYPE_PASSWORD);
        assert_eq!(frame.session.sequence, 7);
        assert_eq!(frame.session.session_id, 0xDEAD_BEEF);
        assert_eq!(frame.session.auth_code, Some(code));
        assert_eq!(frame.message.command, 0x3B);

        let reply = frame.encode_reply(0x00, &[0x04]);
        assert_eq!(reply[4], AUTH_TYPE_PASSWORD);
        assert_eq!(&reply[5..9], &7u32.to_be_bytes());
        assert_eq!(&reply[9..13], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(&reply[13..29], &code); // auth code echoed in replies
    }

    #[test]
    fn rejects_corrupted_header_checksum() {
        let mut msg = lan_message(0x00, 0x01, &[]);
        msg[2] = msg[2].wrapping_add(1);
        assert_eq!(decode_message(&msg), Err(DecodeError::HeaderChecksum));
    }

    #[test]
    fn rejects_corrupted_data_checksum() {
        let mut msg = lan_message(0x00, 0x02, &[0x01]);
        let last = msg.len() - 1;
        msg[last] = msg[last].wrapping_add(1);
        assert_eq!(decode_message(&msg), Err(DecodeError::DataChecksum));
    }

    #[test]
    fn rejects_truncated_and_foreign_datagrams() {
        assert!(matches!(
            decode_datagram(&[0x06, 0x00]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            decode_datagram(&[0x07, 0x00, 0x00, 0x07]),
            Err(DecodeError::BadVersion(0x07))
        ));
        assert!(matches!(
            decode_datagram(&[0x06, 0x00, 0x00, 0x08]),
            Err(DecodeError::UnknownClass(0x08))
        ));
    }

    #[test]
    fn rejects_unsupported_auth_type() {
        let mut out = vec![RMCP_VERSION, 0x00, 0x00, RMCP_CLASS_IPMI];
        out.push(0x02); // MD5
        out.extend_from_slice(&[0u8; 9]);
        assert!(matches!(
            decode_datagram(&out),
            Err(DecodeError::UnsupportedAuthType(0x02))
        ));
    }
}
