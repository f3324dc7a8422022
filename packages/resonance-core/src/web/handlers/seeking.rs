//! `time` — query or change playback position.
//!
//! `time ?` reports the current position; `time S` / `time +S` / `time -S`
//! clamp the target into `[0, duration-1]` and hand it to the
//! `SeekCoordinator`, which debounces rapid scrubs and, once settled,
//! drives the actual stop/reposition/restart cycle through whatever
//! `SeekExecutor` this server was wired up with.

use serde_json::{json, Value};

use super::{str_param, CommandContext};
use crate::player::PlayerIdentity;

pub async fn cmd_time(ctx: &CommandContext, params: &[Value]) -> Value {
    let identity = PlayerIdentity::from_str_lossy(&ctx.player_id);
    let Some(client) = ctx.registry.get(&identity) else {
        return json!({ "error": "player not found" });
    };
    let status = client.status();

    let Some(raw) = str_param(params, 1) else {
        return json!({ "_time": status.elapsed_milliseconds as f64 / 1000.0 });
    };

    if raw == "?" {
        return json!({ "_time": status.elapsed_milliseconds as f64 / 1000.0 });
    }

    let current_s = status.elapsed_milliseconds as f64 / 1000.0;
    let target = if let Some(delta) = raw.strip_prefix('+') {
        current_s + delta.parse::<f64>().unwrap_or(0.0)
    } else if let Some(delta) = raw.strip_prefix('-') {
        current_s - delta.parse::<f64>().unwrap_or(0.0)
    } else {
        raw.parse::<f64>().unwrap_or(current_s)
    };

    let max_seconds = (status.duration_seconds.max(1.0)) - 1.0;
    let clamped = target.clamp(0.0, max_seconds.max(0.0));

    ctx.seek.request_seek(&identity, clamped, ctx.seek_executor.as_ref()).await;

    json!({ "_time": clamped })
}

/// Byte offset an MP3's audio data begins at: 10-byte ID3v2 header plus the
/// synchsafe-encoded tag size, or `0` if no `ID3` magic is present.
#[must_use]
pub fn mp3_audio_data_start(header: &[u8]) -> u64 {
    if header.len() < 10 || &header[0..3] != b"ID3" {
        return 0;
    }
    let size = (u64::from(header[6] & 0x7f) << 21) | (u64::from(header[7] & 0x7f) << 14) | (u64::from(header[8] & 0x7f) << 7) | u64::from(header[9] & 0x7f);
    10 + size
}

/// Computes the byte offset to seek to for a direct-streamed (non-transcoded)
/// file, given the target position and the file's total duration/size.
/// Clamped to leave at least [`crate::protocol_constants::BYTE_OFFSET_TAIL_GUARD`]
/// bytes before the end, since landing in the last few hundred bytes of a
/// file tends to produce a truncated final frame the decoder chokes on.
#[must_use]
pub fn byte_offset_for_seek(target_s: f64, duration_s: f64, file_size: u64, audio_data_start: u64) -> u64 {
    if duration_s <= 0.0 {
        return audio_data_start;
    }
    let playable = file_size.saturating_sub(audio_data_start) as f64;
    let offset = audio_data_start as f64 + target_s * playable / duration_s;
    let max_offset = file_size.saturating_sub(crate::protocol_constants::BYTE_OFFSET_TAIL_GUARD);
    (offset as u64).clamp(audio_data_start, max_offset.max(audio_data_start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_id3_tag_starts_at_zero() {
        assert_eq!(mp3_audio_data_start(b"not an id3 header!!"), 0);
    }

    #[test]
    fn id3_tag_size_is_synchsafe_decoded() {
        let mut header = vec![0u8; 10];
        header[0..3].copy_from_slice(b"ID3");
        header[6..10].copy_from_slice(&[0x00, 0x00, 0x02, 0x01]); // 257 bytes
        assert_eq!(mp3_audio_data_start(&header), 10 + 257);
    }

    #[test]
    fn byte_offset_scales_linearly_with_duration() {
        let offset = byte_offset_for_seek(60.0, 120.0, 2_000_000, 0);
        assert_eq!(offset, 1_000_000);
    }

    #[test]
    fn byte_offset_clamps_away_from_file_tail() {
        let offset = byte_offset_for_seek(119.9, 120.0, 10_000, 0);
        assert!(offset <= 10_000 - crate::protocol_constants::BYTE_OFFSET_TAIL_GUARD);
    }
}
