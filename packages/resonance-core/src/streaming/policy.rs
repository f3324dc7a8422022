//! Hard-coded transcode policy.
//!
//! Two small fixed sets cover the overwhelming majority of libraries:
//! formats that always need transcoding before Slimproto devices can play
//! them (the MPEG-4 container family, whose seeking and gapless behavior
//! legacy firmware handles poorly), and formats no device needs transcoded
//! at all. Anything outside both sets defers to the device-capability table
//! (see `streaming::device_config`).

use crate::streaming::device_config::DeviceConfig;

/// Output format every transcode targets.
pub const TRANSCODE_TARGET_FORMAT: &str = "mp3";

const ALWAYS_TRANSCODE_FORMATS: &[&str] = &["m4a", "m4b", "mp4", "m4p", "m4r", "alac", "aac"];

const NEVER_TRANSCODE_FORMATS: &[&str] = &["mp3", "flac", "flc", "ogg", "wav", "aiff", "aif"];

/// Decides whether a source format needs transcoding before being served to
/// a given device.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodePolicy;

impl TranscodePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns whether `source_format` (a lowercase extension without the
    /// dot, e.g. `"m4a"`) needs transcoding for the given device.
    ///
    /// Falls back to `device_config.needs_transcoding` for formats in
    /// neither hard-coded set.
    #[must_use]
    pub fn needs_transcoding(&self, source_format: &str, device_config: &DeviceConfig) -> bool {
        let fmt = source_format.to_lowercase();
        if ALWAYS_TRANSCODE_FORMATS.contains(&fmt.as_str()) {
            return true;
        }
        if NEVER_TRANSCODE_FORMATS.contains(&fmt.as_str()) {
            return false;
        }
        device_config.needs_transcoding(&fmt)
    }

    /// Returns the Slimproto `strm` format-hint byte the server should tell
    /// the device to expect, given whatever format the stream will actually
    /// be served in (post-transcode, if any).
    #[must_use]
    pub fn strm_expected_format_hint(&self, effective_format: &str) -> u8 {
        match effective_format.to_lowercase().as_str() {
            "mp3" => b'm',
            "flac" | "flc" => b'f',
            "ogg" => b'o',
            "aac" => b'a',
            "wav" | "aiff" | "aif" | "pcm" => b'p',
            _ => b'm',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m4b_always_transcodes() {
        let policy = TranscodePolicy::new();
        let config = DeviceConfig::default();
        assert!(policy.needs_transcoding("m4b", &config));
    }

    #[test]
    fn flac_never_transcodes() {
        let policy = TranscodePolicy::new();
        let config = DeviceConfig::default();
        assert!(!policy.needs_transcoding("flac", &config));
    }

    #[test]
    fn format_hint_maps_mp3_to_m() {
        let policy = TranscodePolicy::new();
        assert_eq!(policy.strm_expected_format_hint("mp3"), b'm');
    }
}
