//! Transcode rule table, the `legacy.conf`-style loader for it, and the
//! subprocess pipeline that actually runs a transcode.
//!
//! Rules are matched first-match-wins against `(source_format, dest_format,
//! device_type, device_id)`, with `"*"` as a wildcard in any position. A
//! rule's command is either a literal pipeline template or `-`, meaning
//! "passthrough, no transcode needed for this combination despite being
//! listed."
//!
//! A multi-stage pipeline is NOT chained through OS pipes: each stage's
//! stdout is read into memory chunk-by-chunk by a dedicated copy task and
//! written to the next stage's stdin, because relying on OS pipe chaining
//! made process cleanup platform-dependent. This costs a few extra copies
//! per chunk in exchange for uniform, testable cleanup on every platform.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::protocol_constants::{KILL_TIMEOUT_MS, STREAM_BUFFER_SIZE, TERMINATE_TIMEOUT_MS};

/// One rule in the transcode table.
#[derive(Debug, Clone)]
pub struct TranscodeRule {
    pub source_format: String,
    pub dest_format: String,
    pub device_type: String,
    pub device_id: String,
    /// Pipeline stages, each a shell-style argv already split on whitespace
    /// (honoring quoted segments). `["-"]` means passthrough.
    pub command: Vec<Vec<String>>,
    /// Single-letter capability flags from `#` comments (`F` = needs
    /// seeking support, `T` = needs byte count, `I` = needs ICY metadata,
    /// etc. — preserved opaquely since the core only needs to pass them
    /// through, not interpret them).
    pub capabilities: Vec<char>,
}

impl TranscodeRule {
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.command.len() == 1 && self.command[0].len() == 1 && self.command[0][0] == "-"
    }

    #[must_use]
    pub fn matches(&self, source: &str, dest: Option<&str>, device_type: &str, device_id: &str) -> bool {
        let field_matches = |rule_field: &str, value: &str| rule_field == "*" || rule_field.eq_ignore_ascii_case(value);

        if !field_matches(&self.source_format, source) {
            return false;
        }
        if let Some(dest) = dest {
            if !field_matches(&self.dest_format, dest) {
                return false;
            }
        }
        field_matches(&self.device_type, device_type) && field_matches(&self.device_id, device_id)
    }
}

/// The full rule table.
#[derive(Debug, Clone, Default)]
pub struct TranscodeConfig {
    pub rules: Vec<TranscodeRule>,
}

impl TranscodeConfig {
    /// Finds the first rule matching the given criteria. `dest_format` may
    /// be `None` to match any destination.
    #[must_use]
    pub fn find_rule(&self, source: &str, dest: Option<&str>, device_type: &str, device_id: &str) -> Option<&TranscodeRule> {
        self.rules.iter().find(|r| r.matches(source, dest, device_type, device_id))
    }

    /// Whether transcoding is required for this combination. A format with
    /// no matching rule at all is transcoded for safety rather than risking
    /// an unplayable direct stream.
    #[must_use]
    pub fn needs_transcoding(&self, source: &str, dest: Option<&str>, device_type: &str, device_id: &str) -> bool {
        match self.find_rule(source, dest, device_type, device_id) {
            Some(rule) => !rule.is_passthrough(),
            None => true,
        }
    }
}

/// Parses a `legacy.conf`-style transcode table.
///
/// Grammar: header lines of four whitespace-separated fields (`src dst
/// device_type device_id`), each followed by one or more indented command
/// lines (the pipeline's stages, one shell-style command per line) and
/// optional `#`-prefixed capability-flag comments (e.g. `# FT`) attached to
/// the header.
///
/// # Errors
///
/// Returns an error if a header line does not have exactly four fields or a
/// command line appears before any header.
pub fn parse_legacy_conf(text: &str) -> Result<TranscodeConfig, String> {
    let mut rules = Vec::new();
    let mut current: Option<TranscodeRule> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let is_indented = raw_line.starts_with(' ') || raw_line.starts_with('\t');
        let trimmed = line.trim();

        if !is_indented {
            if let Some(rest) = trimmed.strip_prefix('#') {
                if let Some(rule) = current.as_mut() {
                    rule.capabilities.extend(rest.trim().chars().filter(|c| !c.is_whitespace()));
                }
                continue;
            }

            if let Some(rule) = current.take() {
                rules.push(rule);
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(format!("malformed header line: {trimmed:?}"));
            }
            current = Some(TranscodeRule {
                source_format: fields[0].to_string(),
                dest_format: fields[1].to_string(),
                device_type: fields[2].to_string(),
                device_id: fields[3].to_string(),
                command: Vec::new(),
                capabilities: Vec::new(),
            });
        } else {
            let rule = current
                .as_mut()
                .ok_or_else(|| format!("command line before any header: {trimmed:?}"))?;
            rule.command.push(split_command_line(trimmed));
        }
    }

    if let Some(rule) = current.take() {
        rules.push(rule);
    }

    Ok(TranscodeConfig { rules })
}

fn split_command_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Resolves a transcoder binary name to a full path: checks a
/// vendored `third_party/bin/` directory first, then falls back to `PATH`.
#[must_use]
pub fn resolve_binary(name: &str, third_party_bin_dir: &Path) -> Option<PathBuf> {
    let bundled = third_party_bin_dir.join(name);
    if bundled.is_file() {
        return Some(bundled);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(name)).find(|candidate| candidate.is_file())
}

/// Builds one pipeline stage's argv, substituting `$FILE$`, `$START$`, and
/// `$END$`, and resolving a leading `[binary]`-bracketed token to its full
/// path via [`resolve_binary`]. A template token that is exactly `$START$`
/// or `$END$` expands to two argv entries (`-j 12.500`, `-e 45.000`) rather
/// than one, matching how the original implementation re-splits the
/// expansion after the fact.
#[must_use]
pub fn build_stage_argv(
    template: &[String],
    file_path: &Path,
    start_seconds: Option<f64>,
    end_seconds: Option<f64>,
    third_party_bin_dir: &Path,
) -> Vec<String> {
    let mut argv = Vec::with_capacity(template.len());
    for (i, token) in template.iter().enumerate() {
        let token = if i == 0 {
            if let Some(name) = token.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                resolve_binary(name, third_party_bin_dir).map(|p| p.to_string_lossy().to_string()).unwrap_or_else(|| token.clone())
            } else {
                token.clone()
            }
        } else {
            token.clone()
        };
        argv.extend(substitute_placeholders(&token, file_path, start_seconds, end_seconds));
    }
    argv
}

/// Substitutes `$FILE$`/`$START$`/`$END$` in one template token. A bare
/// `$START$`/`$END$` token (the whole argv entry, nothing else) expands to
/// its own flag and value as two separate entries; an occurrence embedded
/// in a larger token is substituted in place. A seek placeholder with no
/// seek position (or a non-positive one) drops out entirely rather than
/// leaving an empty argv entry.
fn substitute_placeholders(token: &str, file_path: &Path, start: Option<f64>, end: Option<f64>) -> Vec<String> {
    let mut arg = token.to_string();

    if arg.contains("$FILE$") {
        arg = arg.replace("$FILE$", &file_path.to_string_lossy());
    }

    if arg.contains("$START$") {
        match start.filter(|s| *s > 0.0) {
            Some(seconds) => {
                let replacement = format!("-j {seconds:.3}");
                if arg == "$START$" {
                    return replacement.split_whitespace().map(str::to_string).collect();
                }
                arg = arg.replace("$START$", &replacement);
            }
            None => {
                if arg == "$START$" {
                    return Vec::new();
                }
                arg = arg.replace("$START$", "");
            }
        }
    }

    if arg.contains("$END$") {
        match end.filter(|e| *e > 0.0) {
            Some(seconds) => {
                let replacement = format!("-e {seconds:.3}");
                if arg == "$END$" {
                    return replacement.split_whitespace().map(str::to_string).collect();
                }
                arg = arg.replace("$END$", &replacement);
            }
            None => {
                if arg == "$END$" {
                    return Vec::new();
                }
                arg = arg.replace("$END$", "");
            }
        }
    }

    if arg.is_empty() {
        Vec::new()
    } else {
        vec![arg]
    }
}

/// MIME type for the transcoder's output. Currently always MP3; kept as a
/// function rather than a constant for symmetry with `content_type_for_extension`
/// and in case a future target format is added.
#[must_use]
pub fn output_content_type() -> &'static str {
    "audio/mpeg"
}

/// Terminate/kill ladder for a transcoder subprocess: close stdin, send a
/// graceful terminate and wait up to [`TERMINATE_TIMEOUT_MS`], then escalate
/// to a forceful kill with up to [`KILL_TIMEOUT_MS`] more. Each step is
/// best-effort; a process that is already gone is not an error.
pub async fn terminate_child(mut child: Child) {
    if let Some(stdin) = child.stdin.take() {
        drop(stdin);
    }

    if let Err(e) = child.start_kill() {
        log::debug!("[Transcoder] terminate signal failed (process likely already exited): {e}");
        return;
    }

    if timeout(Duration::from_millis(TERMINATE_TIMEOUT_MS), child.wait()).await.is_ok() {
        return;
    }

    log::warn!("[Transcoder] process did not exit after terminate, escalating to kill");
    let _ = child.start_kill();
    let _ = timeout(Duration::from_millis(KILL_TIMEOUT_MS), child.wait()).await;
}

/// Spawns the pipeline described by `stages` and returns a stream of audio
/// chunks read from the final stage's stdout.
///
/// Each stage after the first has its stdin fed by a background task that
/// copies the previous stage's stdout, rather than the OS connecting the
/// pipes directly — this keeps shutdown behavior identical across
/// platforms when a consumer drops the stream early.
pub fn transcode_stream(
    stages: Vec<Vec<String>>,
) -> impl Stream<Item = std::io::Result<Bytes>> {
    stream! {
        let mut children: Vec<Child> = Vec::with_capacity(stages.len());
        let mut pipe_tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();
        let mut spawn_error = None;

        let mut prev_stdout: Option<tokio::process::ChildStdout> = None;
        for argv in &stages {
            if argv.is_empty() {
                spawn_error = Some(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty pipeline stage"));
                break;
            }
            let mut cmd = Command::new(&argv[0]);
            cmd.args(&argv[1..]);
            cmd.stdin(if prev_stdout.is_some() { Stdio::piped() } else { Stdio::null() });
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::null());

            let mut child = match cmd.spawn() {
                Ok(c) => c,
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            };

            if let Some(mut upstream_stdout) = prev_stdout.take() {
                if let Some(mut stdin) = child.stdin.take() {
                    pipe_tasks.push(tokio::spawn(async move {
                        let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
                        loop {
                            match upstream_stdout.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    if stdin.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }));
                }
            }

            prev_stdout = child.stdout.take();
            children.push(child);
        }

        if let Some(e) = spawn_error {
            for task in &pipe_tasks {
                task.abort();
            }
            for child in children {
                terminate_child(child).await;
            }
            yield Err(e);
            return;
        }

        let mut final_stdout = prev_stdout;
        let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
        if let Some(stdout) = final_stdout.as_mut() {
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => yield Ok(Bytes::copy_from_slice(&buf[..n])),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }

        for task in pipe_tasks {
            task.abort();
        }
        for child in children {
            terminate_child(child).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_rule_with_capability_comment() {
        let text = "mp3 mp3 * *\n# FT\n    [lame] --mp3input $FILE$ -\n";
        let config = parse_legacy_conf(text).unwrap();
        assert_eq!(config.rules.len(), 1);
        let rule = &config.rules[0];
        assert_eq!(rule.source_format, "mp3");
        assert!(rule.capabilities.contains(&'F'));
        assert!(rule.capabilities.contains(&'T'));
    }

    #[test]
    fn dash_command_is_passthrough() {
        let text = "flac flac * *\n    -\n";
        let config = parse_legacy_conf(text).unwrap();
        assert!(config.rules[0].is_passthrough());
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(parse_legacy_conf("only three fields\n    -\n").is_err());
    }

    #[test]
    fn wildcard_device_matches_any_device() {
        let rule = TranscodeRule {
            source_format: "m4a".to_string(),
            dest_format: "mp3".to_string(),
            device_type: "*".to_string(),
            device_id: "*".to_string(),
            command: vec![vec!["-".to_string()]],
            capabilities: Vec::new(),
        };
        assert!(rule.matches("m4a", Some("mp3"), "squeezebox2", "4"));
    }

    #[test]
    fn missing_rule_requires_transcode_for_safety() {
        let config = TranscodeConfig::default();
        assert!(config.needs_transcoding("wma", Some("mp3"), "squeezebox2", "4"));
    }

    #[test]
    fn start_placeholder_splits_into_separate_argv_entries() {
        let template = vec!["[ffmpeg]".to_string(), "$START$".to_string(), "-i".to_string(), "$FILE$".to_string()];
        let argv = build_stage_argv(&template, Path::new("/music/a.mp3"), Some(12.5), None, Path::new("/nonexistent"));
        assert!(argv.iter().any(|a| a == "-j"));
        assert!(argv.iter().any(|a| a == "12.500"));
        assert!(argv.iter().any(|a| a == "/music/a.mp3"));
    }

    #[test]
    fn start_placeholder_drops_when_no_seek_position() {
        let template = vec!["-i".to_string(), "$FILE$".to_string(), "$START$".to_string()];
        let argv = build_stage_argv(&template, Path::new("/music/a.mp3"), None, None, Path::new("/nonexistent"));
        assert_eq!(argv, vec!["-i".to_string(), "/music/a.mp3".to_string()]);
    }

    #[test]
    fn embedded_start_placeholder_substitutes_in_place() {
        let template = vec!["--seek=$START$".to_string()];
        let argv = build_stage_argv(&template, Path::new("/music/a.mp3"), Some(5.0), None, Path::new("/nonexistent"));
        assert_eq!(argv, vec!["--seek=-j 5.000".to_string()]);
    }
}
