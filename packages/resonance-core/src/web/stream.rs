//! `/stream.mp3` — the URL a player's `strm` Start command points at.
//!
//! Serves the coordinator's queued file one of two ways: a direct
//! byte-range read when the device can decode the source format natively,
//! or piped through the transcoder pipeline when it can't. Both paths
//! check the stream's [`CancellationToken`] every few chunks so a
//! superseded or stopped stream drops rather than running to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::handlers::seeking::{byte_offset_for_seek, mp3_audio_data_start};
use super::AppState;
use crate::player::{PlayerIdentity, PlayerRegistry};
use crate::protocol_constants::{CANCEL_CHECK_CHUNK_INTERVAL, STREAM_BUFFER_SIZE};
use crate::streaming::policy::TRANSCODE_TARGET_FORMAT;
use crate::streaming::transcoder::{build_stage_argv, output_content_type, transcode_stream};
use crate::streaming::{content_type_for_extension, parse_range_header, CancellationToken, DeviceConfig, SeekExecutor, StreamingCoordinator, TranscodeConfig, TranscodePolicy};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub player: String,
}

pub async fn stream_mp3(Query(query): Query<StreamQuery>, State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = PlayerIdentity::from_str_lossy(&query.player);

    let Some(queued) = state.streaming.get_queued_file(&identity) else {
        return (StatusCode::NOT_FOUND, "no stream queued for this player").into_response();
    };
    let Some(token) = state.streaming.get_cancellation_token(&identity) else {
        return (StatusCode::NOT_FOUND, "no stream queued for this player").into_response();
    };

    let device_type = state.registry.get(&identity).map(|c| format!("{:?}", c.info().device_type).to_lowercase()).unwrap_or_default();
    let source_format = queued.path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let needs_transcode = state.transcode_policy.needs_transcoding(&source_format, &state.device_config);

    if needs_transcode {
        serve_transcoded(&state, &queued.path, &source_format, &device_type, queued.seek_seconds, token, &identity).await
    } else {
        serve_direct(&queued.path, &headers, queued.byte_offset, token, state.streaming.clone(), identity.clone()).await
    }
}

/// Builds the pipeline stages for a transcode from the matching rule in the
/// legacy-conf-style table. Returns `None` if no rule matches (or the only
/// matching rule is a passthrough, which contradicts the caller having
/// already decided transcoding is required) — callers respond `500` rather
/// than guessing at a pipeline.
fn build_transcode_stages(path: &Path, source_format: &str, device_type: &str, seek_seconds: Option<f64>, transcode_config: &TranscodeConfig, third_party_bin_dir: &Path) -> Option<Vec<Vec<String>>> {
    let rule = transcode_config.find_rule(source_format, Some(TRANSCODE_TARGET_FORMAT), device_type, "*")?;
    if rule.is_passthrough() {
        return None;
    }
    Some(rule.command.iter().map(|stage| build_stage_argv(stage, path, seek_seconds, None, third_party_bin_dir)).collect())
}

async fn serve_transcoded(state: &AppState, path: &Path, source_format: &str, device_type: &str, seek_seconds: Option<f64>, token: CancellationToken, player: &PlayerIdentity) -> Response {
    let third_party_bin_dir = PathBuf::from(&state.third_party_bin_dir);
    let Some(stages) = build_transcode_stages(path, source_format, device_type, seek_seconds, &state.transcode_config, &third_party_bin_dir) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "no transcode rule configured for this source/device combination").into_response();
    };

    let streaming = state.streaming.clone();
    let player = player.clone();
    let mut cleared_seek = false;
    let mut chunk_count = 0usize;
    let body_stream = transcode_stream(stages)
        .map(move |item| {
            if !cleared_seek {
                cleared_seek = true;
                streaming.clear_seek_position(&player);
            }
            item
        })
        .take_while(move |_| {
            chunk_count += 1;
            let keep = chunk_count % CANCEL_CHECK_CHUNK_INTERVAL != 0 || !token.is_cancelled();
            futures::future::ready(keep)
        });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, output_content_type())
        .header(header::ACCEPT_RANGES, "none")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn serve_direct(path: &Path, headers: &HeaderMap, byte_offset: Option<u64>, token: CancellationToken, streaming: Arc<StreamingCoordinator>, player: PlayerIdentity) -> Response {
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return (StatusCode::NOT_FOUND, "file not found").into_response();
    };
    let Ok(metadata) = file.metadata().await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "could not stat file").into_response();
    };
    let file_size = metadata.len();
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let content_type = content_type_for_extension(extension);

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok()).and_then(|v| parse_range_header(v, file_size));

    let (start, end, status) = match (range, byte_offset) {
        (Some(r), _) => (r.start, r.end, StatusCode::PARTIAL_CONTENT),
        (None, Some(offset)) => (offset.min(file_size.saturating_sub(1)), file_size.saturating_sub(1), StatusCode::OK),
        (None, None) => (0, file_size.saturating_sub(1), StatusCode::OK),
    };

    if file.seek(std::io::SeekFrom::Start(start)).await.is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "seek failed").into_response();
    }

    let remaining = end.saturating_sub(start) + 1;
    let body_stream = file_chunk_stream(file, remaining, token, streaming, player);

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, remaining.to_string());
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}"));
    }

    builder.body(Body::from_stream(body_stream)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn file_chunk_stream(mut file: tokio::fs::File, mut remaining: u64, token: CancellationToken, streaming: Arc<StreamingCoordinator>, player: PlayerIdentity) -> impl futures::Stream<Item = std::io::Result<Bytes>> {
    async_stream::stream! {
        let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
        let mut chunk_count = 0usize;
        let mut cleared_offset = false;
        while remaining > 0 {
            chunk_count += 1;
            if chunk_count % CANCEL_CHECK_CHUNK_INTERVAL == 0 && token.is_cancelled() {
                break;
            }
            let to_read = (buf.len() as u64).min(remaining) as usize;
            match file.read(&mut buf[..to_read]).await {
                Ok(0) => break,
                Ok(n) => {
                    remaining -= n as u64;
                    if !cleared_offset {
                        cleared_offset = true;
                        streaming.clear_byte_offset(&player);
                    }
                    yield Ok(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

/// Drives a seek's stop/reposition/restart cycle over HTTP: stops and
/// flushes the player, re-queues the file at the new position (time-based
/// for a transcode, byte-offset for a direct stream), and restarts it.
pub struct HttpSeekExecutor {
    pub registry: Arc<PlayerRegistry>,
    pub streaming: Arc<StreamingCoordinator>,
    pub transcode_policy: Arc<TranscodePolicy>,
    pub device_config: Arc<DeviceConfig>,
}

#[async_trait]
impl SeekExecutor for HttpSeekExecutor {
    async fn execute_seek(&self, player: &PlayerIdentity, seconds: f64) {
        let Some(client) = self.registry.get(player) else {
            return;
        };
        let Some(queued) = self.streaming.get_queued_file(player) else {
            return;
        };

        let source_format = queued.path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        let needs_transcode = self.transcode_policy.needs_transcoding(&source_format, &self.device_config);

        client.stop();
        client.flush();

        let token = if needs_transcode {
            self.streaming.queue_file_with_seek(player, queued.path.clone(), seconds)
        } else {
            let duration = client.status().duration_seconds;
            let file_size = tokio::fs::metadata(&queued.path).await.map(|m| m.len()).unwrap_or(0);
            let mut header = [0u8; 10];
            let audio_data_start = match tokio::fs::File::open(&queued.path).await {
                Ok(mut f) => {
                    let _ = f.read_exact(&mut header).await;
                    mp3_audio_data_start(&header)
                }
                Err(_) => 0,
            };
            let offset = byte_offset_for_seek(seconds, duration, file_size, audio_data_start);
            self.streaming.queue_file_with_byte_offset(player, queued.path.clone(), offset)
        };
        client.update_status(|s| s.begin_track(token.generation()));

        let effective_format = if needs_transcode { TRANSCODE_TARGET_FORMAT } else { source_format.as_str() };
        let format_hint = self.transcode_policy.strm_expected_format_hint(effective_format);
        let http_request = format!("GET /stream.mp3?player={player} HTTP/1.0\r\n\r\n");
        client.start_track(http_request, format_hint, b'1');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::transcoder::TranscodeRule;

    fn passthrough_rule() -> TranscodeRule {
        TranscodeRule {
            source_format: "mp3".to_string(),
            dest_format: "mp3".to_string(),
            device_type: "*".to_string(),
            device_id: "*".to_string(),
            command: vec![vec!["-".to_string()]],
            capabilities: Vec::new(),
        }
    }

    fn ffmpeg_rule() -> TranscodeRule {
        TranscodeRule {
            source_format: "flac".to_string(),
            dest_format: "mp3".to_string(),
            device_type: "*".to_string(),
            device_id: "*".to_string(),
            command: vec![vec!["ffmpeg".to_string(), "-i".to_string(), "$FILE$".to_string()]],
            capabilities: Vec::new(),
        }
    }

    #[test]
    fn build_transcode_stages_returns_none_without_a_matching_rule() {
        let config = TranscodeConfig::default();
        let stages = build_transcode_stages(Path::new("/music/a.flac"), "flac", "squeezebox", None, &config, Path::new("/bin"));
        assert!(stages.is_none());
    }

    #[test]
    fn build_transcode_stages_returns_none_for_a_passthrough_rule() {
        let config = TranscodeConfig { rules: vec![passthrough_rule()] };
        let stages = build_transcode_stages(Path::new("/music/a.mp3"), "mp3", "squeezebox", None, &config, Path::new("/bin"));
        assert!(stages.is_none());
    }

    #[test]
    fn build_transcode_stages_builds_argv_from_matching_rule() {
        let config = TranscodeConfig { rules: vec![ffmpeg_rule()] };
        let stages = build_transcode_stages(Path::new("/music/a.flac"), "flac", "squeezebox", None, &config, Path::new("/bin")).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0], vec!["ffmpeg", "-i", "/music/a.flac"]);
    }
}
