//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the Slimproto/LMS wire protocols and by
//! long-standing firmware quirks; changing them breaks compatibility with
//! real hardware.

// ─────────────────────────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────────────────────────

/// UDP discovery port and Slimproto TCP port. Both protocols share 3483;
/// on some OSes the TCP acceptor may hold the port exclusively, in which
/// case discovery degrades gracefully (see `protocol::discovery`).
pub const SLIMPROTO_PORT: u16 = 3483;

/// Default HTTP port for the control/streaming surface.
pub const DEFAULT_HTTP_PORT: u16 = 9000;

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum hostname length embedded in the legacy discovery reply, in bytes.
pub const MAX_HOSTNAME_LENGTH: usize = 16;

/// Discovery replies larger than this are dropped rather than sent, to stay
/// within the MTU headroom legacy devices expect.
pub const MAX_DISCOVERY_RESPONSE_SIZE: usize = 1450;

/// Server version string reported to devices. Deliberately held below
/// `8.0.0` — some firmware (<= 7.7.3) rejects any version that compares as
/// `>= 8.0.0`, so a "future" version number must still look like `7.x.x`.
pub const SERVER_VERSION: &str = "7.999.999";

// ─────────────────────────────────────────────────────────────────────────────
// Slimproto framing
// ─────────────────────────────────────────────────────────────────────────────

/// Length of a Slimproto operation code, in bytes (`strm`, `STAT`, `HELO`, …).
pub const SLIMPROTO_OP_LEN: usize = 4;

/// HELO is the one inbound frame whose length prefix is 4 bytes instead of
/// the usual 2-byte big-endian length. A long-standing LMS quirk.
pub const HELO_LENGTH_PREFIX_LEN: usize = 4;

/// Length prefix for every other Slimproto frame, in bytes.
pub const STANDARD_LENGTH_PREFIX_LEN: usize = 2;

/// Per-player suppression window after a manual track start during which a
/// stale `STMu` must not be allowed to auto-advance the playlist, even if by
/// some race its generation tag matched (belt-and-suspenders on top of the
/// generation check itself).
pub const TRACK_FINISHED_SUPPRESSION_MS: u64 = 1000;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Chunk size used for direct-stream HTTP reads, in bytes.
pub const STREAM_BUFFER_SIZE: usize = 65536;

/// Check the per-chunk cancellation token after this many chunks in the
/// direct-stream path.
pub const CANCEL_CHECK_CHUNK_INTERVAL: usize = 4;

/// Floor applied to a byte-offset seek so it never lands inside the trailing
/// frames of a file (some decoders choke on a truncated final frame).
pub const BYTE_OFFSET_TAIL_GUARD: u64 = 8192;

// ─────────────────────────────────────────────────────────────────────────────
// Seek coordination
// ─────────────────────────────────────────────────────────────────────────────

/// Delay after a seek request before its executor runs, so rapid repeated
/// seeks (scrubbing) collapse into a single execution.
pub const SEEK_COALESCE_DELAY_MS: u64 = 20;

/// Timeout for acquiring a player's seek lock. Timing out here means a prior
/// seek's stop/flush/start cycle hasn't finished; this is treated as
/// expected backpressure, not an error.
pub const SEEK_LOCK_TIMEOUT_MS: u64 = 500;

/// Graceful-terminate deadline for a transcoder subprocess.
pub const TERMINATE_TIMEOUT_MS: u64 = 2000;

/// Force-kill deadline after escalation, once terminate has timed out.
pub const KILL_TIMEOUT_MS: u64 = 1000;

// ─────────────────────────────────────────────────────────────────────────────
// Cometd / Bayeux
// ─────────────────────────────────────────────────────────────────────────────

/// Default long-poll wait, in milliseconds, for `/meta/connect`.
pub const COMETD_CONNECT_TIMEOUT_MS: u64 = 60_000;

/// Maximum duration of a single streaming-mode chunked response, in seconds.
pub const COMETD_STREAM_MAX_SECS: u64 = 300;

/// Heartbeat interval for idle streaming-mode connections, in seconds.
pub const COMETD_HEARTBEAT_SECS: u64 = 30;

/// Poll interval while waiting on a session's wake signal in streaming mode.
pub const COMETD_WAKE_POLL_MS: u64 = 1000;

/// A Cometd session is garbage-collected after this many seconds of silence.
pub const COMETD_SESSION_TIMEOUT_SECS: u64 = 180;

// ─────────────────────────────────────────────────────────────────────────────
// Application identity
// ─────────────────────────────────────────────────────────────────────────────

/// Server name reported in discovery and JSON-RPC `serverstatus`.
pub const APP_NAME: &str = "Resonance";
