//! UDP discovery responder.
//!
//! Slimproto devices broadcast a one-byte-tagged probe on port 3483 before
//! they ever open a TCP connection. Three dialects exist in the wild and
//! all three are answered:
//!
//! - `d` — legacy discovery. Reply is `D` followed by the server hostname,
//!   null-padded/truncated to [`crate::protocol_constants::MAX_HOSTNAME_LENGTH`] bytes.
//! - `e` — TLV discovery. The payload after the tag is a sequence of 4-byte
//!   tag names (`NAME`, `IPAD`, `JSON`, `VERS`, `UUID`, `JVID`); the reply
//!   echoes each requested tag back as `tag + len(1 byte) + value`, except
//!   `JVID`, which is logged and otherwise ignored (no reply).
//! - `h` — SLIMP3 hello. Reply is `h` followed by 17 zero bytes.
//!
//! `IPAD` is resolved per-peer: a short-lived UDP socket is "connected" to
//! the requesting peer's address purely so the OS tells us which local
//! interface would be used to reach it, without sending any traffic.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::protocol_constants::{
    MAX_DISCOVERY_RESPONSE_SIZE, MAX_HOSTNAME_LENGTH, SERVER_VERSION, SLIMPROTO_PORT,
};

/// Configuration the responder needs to answer TLV probes.
#[derive(Debug, Clone)]
pub struct DiscoveryInfo {
    pub hostname: String,
    pub http_port: u16,
    pub server_uuid: String,
}

/// Binds the discovery UDP socket.
///
/// Per the original implementation, a bind failure with `EADDRINUSE` is not
/// fatal: on some platforms the Slimproto TCP acceptor holds port 3483
/// exclusively, and discovery is a nice-to-have next to a working TCP
/// control connection. Any other bind failure is still returned as an error.
pub async fn bind() -> io::Result<Option<UdpSocket>> {
    match UdpSocket::bind(("0.0.0.0", SLIMPROTO_PORT)).await {
        Ok(socket) => Ok(Some(socket)),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            log::warn!(
                "[Discovery] port {} already in use, discovery disabled (Slimproto TCP likely holds it)",
                SLIMPROTO_PORT
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Runs the discovery responder loop until the socket errors out.
pub async fn serve(socket: UdpSocket, info: DiscoveryInfo) -> io::Result<()> {
    let mut buf = [0u8; 1500];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        if len == 0 {
            continue;
        }
        if let Some(reply) = handle_probe(&buf[..len], peer, &info) {
            if reply.len() <= MAX_DISCOVERY_RESPONSE_SIZE {
                if let Err(e) = socket.send_to(&reply, peer).await {
                    log::warn!("[Discovery] failed to reply to {peer}: {e}");
                }
            }
        }
    }
}

fn handle_probe(payload: &[u8], peer: SocketAddr, info: &DiscoveryInfo) -> Option<Vec<u8>> {
    match payload.first() {
        Some(b'd') => Some(legacy_reply(&info.hostname)),
        Some(b'e') => Some(tlv_reply(&payload[1..], peer, info)),
        Some(b'h') => Some(slimp3_reply()),
        _ => {
            log::debug!("[Discovery] ignoring unknown probe from {peer}");
            None
        }
    }
}

fn legacy_reply(hostname: &str) -> Vec<u8> {
    let mut reply = vec![b'D'];
    let mut name_bytes = hostname.as_bytes().to_vec();
    name_bytes.truncate(MAX_HOSTNAME_LENGTH);
    name_bytes.resize(MAX_HOSTNAME_LENGTH, 0);
    reply.extend_from_slice(&name_bytes);
    reply
}

fn slimp3_reply() -> Vec<u8> {
    let mut reply = vec![b'h'];
    reply.extend_from_slice(&[0u8; 17]);
    reply
}

fn tlv_reply(request: &[u8], peer: SocketAddr, info: &DiscoveryInfo) -> Vec<u8> {
    let mut reply = vec![b'E'];
    let mut offset = 0;
    while offset + 4 <= request.len() {
        let tag = &request[offset..offset + 4];
        offset += 4;
        // Requests may carry a trailing length byte for the tag; skip it if present.
        if offset < request.len() {
            offset += 1;
        }

        let value: Vec<u8> = match tag {
            b"NAME" => info.hostname.as_bytes().to_vec(),
            b"IPAD" => local_ip_for_peer(peer).unwrap_or_default().into_bytes(),
            b"JSON" => info.http_port.to_string().into_bytes(),
            b"VERS" => SERVER_VERSION.as_bytes().to_vec(),
            b"UUID" => info.server_uuid.as_bytes().to_vec(),
            b"JVID" => {
                log::debug!("[Discovery] ignoring JVID probe tag from {peer} (no reply by design)");
                continue;
            }
            _ => continue,
        };

        reply.extend_from_slice(tag);
        reply.push(value.len().min(255) as u8);
        reply.extend_from_slice(&value[..value.len().min(255)]);
    }
    reply
}

/// Determines the local IP the kernel would route through to reach `peer`,
/// without sending any packets, via a connected UDP socket.
fn local_ip_for_peer(peer: SocketAddr) -> Option<String> {
    let socket = std::net::UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(peer).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_info() -> DiscoveryInfo {
        DiscoveryInfo {
            hostname: "resonance".to_string(),
            http_port: 9000,
            server_uuid: "11111111-2222-3333-4444-555555555555".to_string(),
        }
    }

    #[test]
    fn legacy_reply_pads_to_fixed_length() {
        let reply = legacy_reply("short");
        assert_eq!(reply[0], b'D');
        assert_eq!(reply.len(), 1 + MAX_HOSTNAME_LENGTH);
    }

    #[test]
    fn legacy_reply_truncates_long_hostnames() {
        let reply = legacy_reply("a_much_longer_hostname_than_allowed");
        assert_eq!(reply.len(), 1 + MAX_HOSTNAME_LENGTH);
    }

    #[test]
    fn slimp3_reply_is_eighteen_bytes() {
        let reply = slimp3_reply();
        assert_eq!(reply.len(), 18);
        assert_eq!(reply[0], b'h');
    }

    #[test]
    fn tlv_reply_includes_requested_tags_only() {
        let info = test_info();
        let peer: SocketAddr = "127.0.0.1:3483".parse().unwrap();
        let mut request = Vec::new();
        request.extend_from_slice(b"NAME");
        request.push(0);
        request.extend_from_slice(b"VERS");
        request.push(0);

        let reply = tlv_reply(&request, peer, &info);
        assert_eq!(reply[0], b'E');
        let reply_str = String::from_utf8_lossy(&reply);
        assert!(reply_str.contains("NAME"));
        assert!(reply_str.contains("VERS"));
        assert!(!reply_str.contains("JSON"));
    }

    #[test]
    fn tlv_reply_omits_jvid() {
        let info = test_info();
        let peer: SocketAddr = "127.0.0.1:3483".parse().unwrap();
        let mut request = Vec::new();
        request.extend_from_slice(b"JVID");
        request.push(0);

        let reply = tlv_reply(&request, peer, &info);
        assert_eq!(reply, vec![b'E']);
    }

    #[test]
    fn unknown_probe_byte_is_ignored() {
        let info = test_info();
        let peer: SocketAddr = "127.0.0.1:3483".parse().unwrap();
        assert!(handle_probe(b"zzz", peer, &info).is_none());
    }
}
