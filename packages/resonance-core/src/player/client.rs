//! Per-player connection handle.
//!
//! One `PlayerClient` is created per Slimproto TCP connection. Its socket's
//! reader loop runs as its own task (see `protocol::slimproto`); outbound
//! frames are handed to this handle's channel rather than written directly,
//! so any component holding an `Arc<PlayerClient>` can queue a frame without
//! touching the socket itself.

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::identity::{PlayerIdentity, PlayerInfo};
use super::status::PlayerStatus;
use crate::protocol::slimproto::{encode_audg, encode_strm, StrmCommand};
use crate::utils::now_millis;

/// Handle to a connected player.
pub struct PlayerClient {
    info: PlayerInfo,
    status: RwLock<PlayerStatus>,
    frame_tx: mpsc::UnboundedSender<Bytes>,
    frame_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    connected_at_ms: u64,
}

impl PlayerClient {
    #[must_use]
    pub fn new(info: PlayerInfo) -> Self {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        Self {
            info,
            status: RwLock::new(PlayerStatus::default()),
            frame_tx,
            frame_rx: parking_lot::Mutex::new(Some(frame_rx)),
            connected_at_ms: now_millis(),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &PlayerIdentity {
        &self.info.identity
    }

    #[must_use]
    pub fn info(&self) -> &PlayerInfo {
        &self.info
    }

    #[must_use]
    pub fn connected_at_ms(&self) -> u64 {
        self.connected_at_ms
    }

    /// Returns a snapshot of the current status.
    #[must_use]
    pub fn status(&self) -> PlayerStatus {
        self.status.read().clone()
    }

    /// Mutates status under the lock and returns the updated snapshot.
    pub fn update_status(&self, f: impl FnOnce(&mut PlayerStatus)) -> PlayerStatus {
        let mut guard = self.status.write();
        f(&mut guard);
        guard.clone()
    }

    /// Queues a raw Slimproto frame to be written to the socket.
    ///
    /// Returns `false` if the connection's writer task has already exited
    /// (socket closed) — callers treat this the same as any other
    /// peer-disappeared condition: log and drop, don't propagate as an error.
    pub fn send_frame(&self, frame: Bytes) -> bool {
        self.frame_tx.send(frame).is_ok()
    }

    /// Takes ownership of the outbound frame receiver.
    ///
    /// Called exactly once by the connection's writer task at setup time.
    pub fn take_frame_receiver(&self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        self.frame_rx.lock().take()
    }

    /// Points the player at `http_request` (a full HTTP request line plus
    /// headers, CRLF-terminated) and tells it to start decoding `format`.
    /// The caller builds the request string — this handle only owns the
    /// wire framing, not knowledge of the server's host/port.
    pub fn start_track(&self, http_request: String, format: u8, autostart: u8) -> bool {
        self.send_frame(encode_strm(
            &StrmCommand::Start { http_request, format, autostart },
            0,
            0,
        ))
    }

    pub fn pause(&self) -> bool {
        self.send_frame(encode_strm(&StrmCommand::Pause, 0, 0))
    }

    pub fn unpause(&self) -> bool {
        self.send_frame(encode_strm(&StrmCommand::Unpause, 0, 0))
    }

    pub fn stop(&self) -> bool {
        self.send_frame(encode_strm(&StrmCommand::Stop, 0, 0))
    }

    pub fn flush(&self) -> bool {
        self.send_frame(encode_strm(&StrmCommand::Flush, 0, 0))
    }

    /// Sets playback volume (0..100), pushing the new gain to the device
    /// and updating the locally-held status to match.
    pub fn set_volume(&self, volume: u8) -> bool {
        let volume = volume.min(100);
        self.update_status(|s| s.volume = volume);
        self.send_frame(encode_audg(volume))
    }
}

impl std::fmt::Debug for PlayerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerClient")
            .field("identity", &self.info.identity)
            .field("name", &self.info.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::identity::DeviceType;

    fn test_info() -> PlayerInfo {
        PlayerInfo {
            identity: PlayerIdentity::from_str_lossy("aa:bb:cc:dd:ee:ff"),
            name: "Kitchen".to_string(),
            device_type: DeviceType::Squeezebox2,
            firmware_rev: 1,
            capabilities: vec!["Mp3".to_string()],
            remote_addr: "192.168.1.50".to_string(),
        }
    }

    #[test]
    fn send_frame_before_receiver_taken_succeeds() {
        let client = PlayerClient::new(test_info());
        assert!(client.send_frame(Bytes::from_static(b"hello")));
    }

    #[test]
    fn send_frame_after_receiver_dropped_fails() {
        let client = PlayerClient::new(test_info());
        let rx = client.take_frame_receiver().unwrap();
        drop(rx);
        assert!(!client.send_frame(Bytes::from_static(b"hello")));
    }

    #[test]
    fn update_status_mutates_in_place() {
        let client = PlayerClient::new(test_info());
        let updated = client.update_status(|s| s.volume = 42);
        assert_eq!(updated.volume, 42);
        assert_eq!(client.status().volume, 42);
    }
}
