//! Slimproto TCP server: the per-player control connection.
//!
//! Every frame is `{4-byte op}{length}{payload}`. Inbound `HELO` is the one
//! exception in the wire format: its length prefix is 4 bytes big-endian
//! instead of the usual 2 — a long-standing LMS quirk every client and
//! server implementation has to special-case. Every other frame, inbound
//! or outbound, uses the standard 2-byte prefix.
//!
//! One task per connection runs [`handle_connection`]'s reader loop; a
//! second task per connection drains the player's outbound frame channel
//! and writes to the socket. Neither task touches the other's half of the
//! socket, so a stalled write never blocks parsing inbound `STAT` frames.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::events::{Event, EventBus};
use crate::player::{DeviceType, PlayerClient, PlayerIdentity, PlayerInfo, PlayerRegistry};
use crate::protocol_constants::{HELO_LENGTH_PREFIX_LEN, STANDARD_LENGTH_PREFIX_LEN};
use crate::streaming::StreamingCoordinator;

/// A decoded inbound frame: 4-byte ASCII op code plus raw payload.
#[derive(Debug)]
pub struct InboundFrame {
    pub op: [u8; 4],
    pub payload: Bytes,
}

impl InboundFrame {
    #[must_use]
    pub fn op_str(&self) -> String {
        String::from_utf8_lossy(&self.op).to_string()
    }
}

/// Reads one frame from `stream`, applying the `HELO` 4-byte-length quirk.
///
/// Returns `Ok(None)` on clean EOF before any bytes of the next frame.
pub async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<InboundFrame>> {
    let mut op = [0u8; 4];
    match stream.read_exact(&mut op).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let length = if &op == b"HELO" {
        let mut len_buf = [0u8; HELO_LENGTH_PREFIX_LEN];
        stream.read_exact(&mut len_buf).await?;
        u32::from_be_bytes(len_buf) as usize
    } else {
        let mut len_buf = [0u8; STANDARD_LENGTH_PREFIX_LEN];
        stream.read_exact(&mut len_buf).await?;
        u16::from_be_bytes(len_buf) as usize
    };

    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).await?;

    Ok(Some(InboundFrame {
        op,
        payload: Bytes::from(payload),
    }))
}

/// Encodes an outbound frame using the standard 2-byte length prefix.
///
/// No outbound frame in this server's repertoire (`strm`, `aude`, `audg`)
/// uses the `HELO` quirk; that prefix style is inbound-only.
#[must_use]
pub fn encode_frame(op: &[u8; 4], payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + 2 + payload.len());
    buf.put_slice(op);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    buf.freeze()
}

/// `strm` subcommands the server can send to direct playback.
#[derive(Debug, Clone)]
pub enum StrmCommand {
    /// Begin streaming from the given HTTP request line/headers.
    Start { http_request: String, format: u8, autostart: u8 },
    Pause,
    Unpause,
    Stop,
    Flush,
}

/// Builds the 24-byte `strm` header plus an optional trailing HTTP request,
/// exactly as a real LMS server would hand a player the request it should
/// issue back to fetch `/stream.mp3`.
#[must_use]
pub fn encode_strm(cmd: &StrmCommand, replay_gain: u32, server_port: u16) -> Bytes {
    let (command, autostart, format, http_request) = match cmd {
        StrmCommand::Start { http_request, format, autostart } => {
            (b's', *autostart, *format, http_request.as_str())
        }
        StrmCommand::Pause => (b'p', 0, b'?', ""),
        StrmCommand::Unpause => (b'u', 0, b'?', ""),
        StrmCommand::Stop => (b'q', 0, b'?', ""),
        StrmCommand::Flush => (b'f', 0, b'?', ""),
    };

    let mut header = BytesMut::with_capacity(24 + http_request.len());
    header.put_u8(command);
    header.put_u8(autostart);
    header.put_u8(format);
    header.put_u8(b'o'); // pcm_sample_size: unused for compressed formats
    header.put_u8(b'o'); // pcm_sample_rate
    header.put_u8(b'o'); // pcm_channels
    header.put_u8(b'o'); // pcm_endian
    header.put_u8(0); // output_threshold
    header.put_u8(0); // reserved
    header.put_u8(0); // spdif_enable
    header.put_u8(0); // transition_period
    header.put_u8(0); // transition_type
    header.put_u8(1); // flags: flush buffer
    header.put_u8(0); // output_channels
    header.put_u8(0); // reserved
    header.put_u32(replay_gain);
    header.put_u16(server_port);
    header.put_u32(0); // server_ip: 0 means "same as control connection"
    header.put_slice(http_request.as_bytes());

    encode_frame(b"strm", &header)
}

/// Encodes an `audg` (audio gain) frame. Volume is `0..100`; scaled to the
/// 16.16 fixed-point gain LMS players expect, with no separate preamp
/// adjustment (old/new gain fields both carry the same value — this server
/// has no notion of a prior gain to ramp from).
#[must_use]
pub fn encode_audg(volume: u8) -> Bytes {
    let gain = (u32::from(volume.min(100)) * 65536) / 100;
    let mut payload = BytesMut::with_capacity(18);
    payload.put_u32(gain); // old gain left
    payload.put_u32(gain); // old gain right
    payload.put_u8(0); // digital volume control: use gain as-is
    payload.put_u8(0); // reserved
    payload.put_u32(gain); // new gain left
    payload.put_u32(gain); // new gain right
    encode_frame(b"audg", &payload)
}

/// Parsed `HELO` handshake payload.
#[derive(Debug)]
struct HeloPayload {
    device_id: u8,
    revision: u8,
    mac: [u8; 6],
    capabilities: Vec<String>,
}

/// Parses a `HELO` payload defensively: firmware revisions disagree on
/// whether the UUID and wlan-channel-list fields are present, so only the
/// fields every known device sends (device id, revision, MAC) are required;
/// everything after offset 8 is treated as an opaque tail from which the
/// trailing comma-separated capability string is recovered.
fn parse_helo(mut payload: Bytes) -> Option<HeloPayload> {
    if payload.len() < 8 {
        return None;
    }
    let device_id = payload.get_u8();
    let revision = payload.get_u8();
    let mut mac = [0u8; 6];
    payload.copy_to_slice(&mut mac);

    let tail = String::from_utf8_lossy(&payload);
    let capabilities = tail
        .rsplit(|c: char| c.is_control())
        .next()
        .unwrap_or("")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Some(HeloPayload {
        device_id,
        revision,
        mac,
        capabilities,
    })
}

/// Parsed fields of interest from a `STAT` frame. Real payloads carry more
/// (buffer fullness, jiffies, signal strength); only the fields the state
/// machine and seek math consume are decoded here.
#[derive(Debug, Default)]
pub struct StatPayload {
    pub event: String,
    pub bytes_received: u64,
    pub elapsed_milliseconds: u32,
}

fn parse_stat(payload: &[u8]) -> StatPayload {
    let event = String::from_utf8_lossy(payload.get(0..4).unwrap_or(b"????")).to_string();
    let bytes_received = payload
        .get(15..23)
        .map(|b| u64::from_be_bytes(b.try_into().unwrap()))
        .unwrap_or(0);
    let elapsed_milliseconds = payload
        .get(43..47)
        .map(|b| u32::from_be_bytes(b.try_into().unwrap()))
        .unwrap_or(0);

    StatPayload {
        event,
        bytes_received,
        elapsed_milliseconds,
    }
}

/// Accepts Slimproto connections until the listener errors out.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<PlayerRegistry>,
    events: Arc<EventBus>,
    streaming: Arc<StreamingCoordinator>,
) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let registry = registry.clone();
        let events = events.clone();
        let streaming = streaming.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr.to_string(), registry, events, streaming).await {
                log::debug!("[Slimproto] connection from {addr} ended: {e}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    remote_addr: String,
    registry: Arc<PlayerRegistry>,
    events: Arc<EventBus>,
    streaming: Arc<StreamingCoordinator>,
) -> std::io::Result<()> {
    let first = match read_frame(&mut stream).await? {
        Some(frame) if &frame.op == b"HELO" => frame,
        Some(other) => {
            log::warn!("[Slimproto] expected HELO, got {} from {remote_addr}", other.op_str());
            return Ok(());
        }
        None => return Ok(()),
    };

    let Some(helo) = parse_helo(first.payload) else {
        log::warn!("[Slimproto] malformed HELO from {remote_addr}");
        return Ok(());
    };

    let identity = PlayerIdentity::from_mac_bytes(helo.mac);
    let info = PlayerInfo {
        identity: identity.clone(),
        name: identity.to_string(),
        device_type: DeviceType::from_byte(helo.device_id),
        firmware_rev: helo.revision,
        capabilities: helo.capabilities,
        remote_addr: remote_addr.clone(),
    };

    log::info!("[Slimproto] player {identity} connected from {remote_addr}");
    let client = Arc::new(PlayerClient::new(info.clone()));
    registry.register(client.clone());
    events
        .publish(Event::PlayerConnected {
            player_id: identity.to_string(),
            name: info.name.clone(),
            model: format!("{:?}", info.device_type),
        })
        .await;

    let (read_half, mut write_half) = stream.into_split();
    let mut read_half = read_half;
    let mut frame_rx = client.take_frame_receiver().expect("receiver taken once");

    let writer_identity = identity.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = write_half.write_all(&frame).await {
                log::debug!("[Slimproto] write to {writer_identity} failed: {e}");
                break;
            }
        }
    });

    loop {
        let op = {
            let mut op_buf = [0u8; 4];
            match read_half.read_exact(&mut op_buf).await {
                Ok(()) => op_buf,
                Err(_) => break,
            }
        };
        let length = if &op == b"HELO" {
            let mut len_buf = [0u8; HELO_LENGTH_PREFIX_LEN];
            if read_half.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            u32::from_be_bytes(len_buf) as usize
        } else {
            let mut len_buf = [0u8; STANDARD_LENGTH_PREFIX_LEN];
            if read_half.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            u16::from_be_bytes(len_buf) as usize
        };
        let mut payload = vec![0u8; length];
        if read_half.read_exact(&mut payload).await.is_err() {
            break;
        }

        match &op {
            b"STAT" => {
                let stat = parse_stat(&payload);
                let new_status = client.update_status(|s| {
                    s.state = s.state.apply_stat_event(&stat.event);
                    s.elapsed_milliseconds = u64::from(stat.elapsed_milliseconds);
                });

                events
                    .publish(Event::PlayerStatus {
                        player_id: identity.to_string(),
                        state: format!("{:?}", new_status.state),
                        volume: new_status.volume,
                        muted: new_status.muted,
                        elapsed_seconds: new_status.elapsed_milliseconds as f64 / 1000.0,
                        elapsed_milliseconds: new_status.elapsed_milliseconds,
                        duration: new_status.duration_seconds,
                        current_track: None,
                        playlist_index: new_status.playlist_index,
                        playlist_tracks: new_status.playlist_tracks,
                    })
                    .await;

                if stat.event == "STMu" {
                    let status = client.status();
                    let current_generation = streaming.get_stream_generation(&identity);
                    if status.should_advance_on_track_finished(Some(current_generation)) {
                        events
                            .publish(Event::PlayerTrackFinished {
                                player_id: identity.to_string(),
                                stream_generation: Some(current_generation),
                            })
                            .await;
                    }
                }
                // STMd is intentionally not treated as a transport signal.
            }
            b"BYE!" => break,
            b"RESP" | b"META" | b"ANIC" | b"SETD" => {
                log::debug!("[Slimproto] ignoring {} from {identity}", InboundFrame { op, payload: Bytes::new() }.op_str());
            }
            _ => log::debug!("[Slimproto] unhandled frame from {identity}"),
        }
    }

    writer.abort();
    registry.remove(&identity);
    events
        .publish(Event::PlayerDisconnected {
            player_id: identity.to_string(),
        })
        .await;
    log::info!("[Slimproto] player {identity} disconnected");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_frame_uses_two_byte_length_prefix() {
        let frame = encode_frame(b"audg", &[1, 2, 3]);
        assert_eq!(&frame[0..4], b"audg");
        assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 3);
    }

    #[test]
    fn parse_helo_extracts_mac_and_capabilities() {
        let mut payload = BytesMut::new();
        payload.put_u8(4); // Squeezebox2
        payload.put_u8(1); // revision
        payload.put_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        payload.put_slice(b"Mp3,Flc,Ogg");
        let helo = parse_helo(payload.freeze()).unwrap();
        assert_eq!(helo.mac, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert!(helo.capabilities.contains(&"Mp3".to_string()));
    }

    #[test]
    fn parse_stat_reads_event_code() {
        let mut payload = vec![0u8; 53];
        payload[0..4].copy_from_slice(b"STMu");
        let stat = parse_stat(&payload);
        assert_eq!(stat.event, "STMu");
    }

    #[test]
    fn parse_stat_tolerates_short_payload() {
        let stat = parse_stat(b"STMt");
        assert_eq!(stat.event, "STMt");
        assert_eq!(stat.elapsed_milliseconds, 0);
    }

    #[test]
    fn strm_start_embeds_http_request() {
        let cmd = StrmCommand::Start {
            http_request: "GET /stream.mp3?player=aa HTTP/1.0\r\n\r\n".to_string(),
            format: b'm',
            autostart: b'1',
        };
        let frame = encode_strm(&cmd, 0, 9000);
        assert_eq!(&frame[0..4], b"strm");
        assert!(frame.len() > 24);
    }
}
