//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::context::{LocalIpDetector, NetworkContext};
use crate::error::{ResonanceError, ResonanceResult};
use crate::events::{Event, EventBus, EventHandler};
use crate::library::Library;
use crate::player::PlayerRegistry;
use crate::playlist::PlaylistManager;
use crate::protocol::discovery::{self, DiscoveryInfo};
use crate::protocol::slimproto;
use crate::config::Config;
use crate::protocol_constants::APP_NAME;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::streaming::{DeviceConfig, SeekCoordinator, SeekExecutor, StreamingCoordinator, TranscodeConfig, TranscodePolicy};
use crate::web::cometd::{CometdEventBridge, CometdManager};
use crate::web::handlers::playback::start_current_track;
use crate::web::handlers::CommandContext;
use crate::web::jsonrpc::JsonRpcHandler;
use crate::web::stream::HttpSeekExecutor;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap. It's
/// consumed by `apps/server` to build the shared [`crate::web::AppState`]
/// and to spawn the Slimproto/discovery accept loops.
pub struct BootstrappedServices {
    pub events: Arc<EventBus>,
    pub registry: Arc<PlayerRegistry>,
    pub playlists: Arc<PlaylistManager>,
    pub library: Arc<dyn Library>,
    pub streaming: Arc<StreamingCoordinator>,
    pub seek: Arc<SeekCoordinator>,
    pub seek_executor: Arc<dyn SeekExecutor>,
    pub device_config: Arc<DeviceConfig>,
    pub transcode_config: Arc<TranscodeConfig>,
    pub transcode_policy: Arc<TranscodePolicy>,
    pub network: NetworkContext,
    pub cometd: Arc<CometdManager>,
    pub jsonrpc: Arc<JsonRpcHandler>,
    pub server_uuid: String,
    /// Bound but not yet accepting; `apps/server` hands this to
    /// [`spawn_slimproto`] once the HTTP listener's port is also known.
    pub slimproto_listener: Option<TcpListener>,
    pub discovery_socket: Option<tokio::net::UdpSocket>,
    spawner: TokioSpawner,
    cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Signals every component watching the shared cancellation token.
    ///
    /// The Slimproto and discovery accept loops do not currently observe
    /// this token (a TCP/UDP accept loop has no natural cancellation point
    /// short of closing the socket); it exists for components added later
    /// that do need cooperative shutdown, and so `apps/server`'s shutdown
    /// path has one signal to fire rather than threading a new one through
    /// later.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Spawns the Slimproto TCP accept loop as a background task.
    pub fn spawn_slimproto(&mut self) {
        let Some(listener) = self.slimproto_listener.take() else {
            log::warn!("[Bootstrap] Slimproto listener already spawned or unavailable");
            return;
        };
        let registry = self.registry.clone();
        let events = self.events.clone();
        let streaming = self.streaming.clone();
        self.spawner.spawn(async move {
            if let Err(e) = slimproto::serve(listener, registry, events, streaming).await {
                log::error!("[Bootstrap] Slimproto accept loop exited: {e}");
            }
        });
    }

    /// Spawns the UDP discovery responder as a background task, if a
    /// socket was bound (discovery is disabled, or the port was already
    /// held by the Slimproto listener).
    pub fn spawn_discovery(&mut self, http_port: u16) {
        let Some(socket) = self.discovery_socket.take() else {
            return;
        };
        let info = DiscoveryInfo {
            hostname: hostname(),
            http_port,
            server_uuid: self.server_uuid.clone(),
        };
        self.spawner.spawn(async move {
            if let Err(e) = discovery::serve(socket, info).await {
                log::error!("[Bootstrap] Discovery responder exited: {e}");
            }
        });
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| APP_NAME.to_string())
}

/// Bridges `player.track_finished` events to playlist auto-advance.
///
/// The Slimproto connection only knows how to publish the event (see
/// `protocol::slimproto`'s `STMu` handling); it has no knowledge of
/// playlists or the streaming pipeline. This handler is where the two
/// meet: it advances the player's playlist cursor and, if there is a next
/// track, starts it the same way `playback::cmd_play` would.
struct PlaylistAdvancer {
    library: Arc<dyn Library>,
    registry: Arc<PlayerRegistry>,
    playlists: Arc<PlaylistManager>,
    streaming: Arc<StreamingCoordinator>,
    seek: Arc<SeekCoordinator>,
    seek_executor: Arc<dyn SeekExecutor>,
    device_config: Arc<DeviceConfig>,
    transcode_policy: Arc<TranscodePolicy>,
    server_host: String,
    server_port: u16,
    server_uuid: String,
}

#[async_trait]
impl EventHandler for PlaylistAdvancer {
    async fn handle(&self, event: &Event) {
        let Event::PlayerTrackFinished { player_id, .. } = event else {
            return;
        };

        let identity = crate::player::PlayerIdentity::from_str_lossy(player_id);
        let Some(client) = self.registry.get(&identity) else {
            return;
        };

        let advanced = self.playlists.with_playlist(player_id, |p| p.next().is_some());
        if !advanced {
            log::debug!("[PlaylistAdvancer] {player_id} has no next track, stopping");
            client.stop();
            return;
        }

        let ctx = CommandContext {
            player_id: player_id.clone(),
            registry: self.registry.clone(),
            playlists: self.playlists.clone(),
            library: self.library.clone(),
            streaming: self.streaming.clone(),
            seek: self.seek.clone(),
            seek_executor: self.seek_executor.clone(),
            device_config: self.device_config.clone(),
            transcode_policy: self.transcode_policy.clone(),
            server_host: self.server_host.clone(),
            server_port: self.server_port,
            server_uuid: self.server_uuid.clone(),
        };

        if !start_current_track(&ctx, &client) {
            log::warn!("[PlaylistAdvancer] failed to start next track for {player_id}");
        }
    }
}

/// Loads the device capability table from `path`, falling back to
/// [`DeviceConfig::default`] (and logging) on any read or parse failure —
/// a malformed override file should not prevent the server from starting.
fn load_device_config(path: Option<&str>) -> DeviceConfig {
    let Some(path) = path else {
        return DeviceConfig::default();
    };
    match std::fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|text| DeviceConfig::from_toml(&text).map_err(|e| e.to_string())) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("[Bootstrap] failed to load device config from {path}: {e}, using defaults");
            DeviceConfig::default()
        }
    }
}

/// Loads the transcode rule table from `path`, falling back to an empty
/// table (every non-passthrough format transcodes via the synthesized
/// ffmpeg pipeline in `web::stream`) on any failure.
fn load_transcode_config(path: Option<&str>) -> TranscodeConfig {
    let Some(path) = path else {
        return TranscodeConfig::default();
    };
    match std::fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|text| TranscodeConfig::parse_legacy_conf(&text)) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("[Bootstrap] failed to load transcode rules from {path}: {e}, using defaults");
            TranscodeConfig::default()
        }
    }
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters - services are created in
/// dependency order:
///
/// 1. Event bus and player registry (no dependencies)
/// 2. Playlist manager, streaming coordinator, seek coordinator
/// 3. Device capability table and transcode rule table (loaded from disk,
///    falling back to built-in defaults)
/// 4. Network context (local IP detection)
/// 5. The HTTP seek executor (depends on registry, streaming, device/transcode config)
/// 6. JSON-RPC handler (depends on everything above plus the injected library)
/// 7. CometD manager, wired to dispatch through the JSON-RPC handler
/// 8. Event subscribers: CometD's event bridge and the playlist auto-advancer
/// 9. Slimproto TCP listener and discovery UDP socket (bound, not yet accepting)
///
/// # Arguments
/// * `config` - Application configuration
/// * `library` - External catalog implementation (resolves track ids to files)
///
/// # Errors
///
/// Returns an error if local IP detection or the Slimproto TCP bind fails.
pub async fn bootstrap_services(config: &Config, library: Arc<dyn Library>) -> ResonanceResult<BootstrappedServices> {
    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let events = Arc::new(EventBus::new());
    let registry = Arc::new(PlayerRegistry::new());
    let playlists = Arc::new(PlaylistManager::new());
    let streaming = Arc::new(StreamingCoordinator::new());
    let seek = Arc::new(SeekCoordinator::new());

    let device_config = Arc::new(load_device_config(config.streaming.device_config_path.as_deref()));
    let transcode_config = Arc::new(load_transcode_config(config.streaming.transcode_rules_path.as_deref()));
    let transcode_policy = Arc::new(TranscodePolicy::new());

    let network = NetworkContext::auto_detect(config.http_port, LocalIpDetector::arc()).map_err(|e| ResonanceError::Configuration(format!("failed to detect local IP: {e}")))?;

    let seek_executor: Arc<dyn SeekExecutor> = Arc::new(HttpSeekExecutor {
        registry: registry.clone(),
        streaming: streaming.clone(),
        transcode_policy: transcode_policy.clone(),
        device_config: device_config.clone(),
    });

    let server_uuid = uuid::Uuid::new_v4().to_string();
    let server_host = network.get_local_ip();

    let jsonrpc = Arc::new(JsonRpcHandler::new(
        library.clone(),
        registry.clone(),
        playlists.clone(),
        streaming.clone(),
        seek.clone(),
        seek_executor.clone(),
        device_config.clone(),
        transcode_policy.clone(),
        server_host.clone(),
        config.http_port,
        server_uuid.clone(),
    ));

    let cometd = Arc::new(CometdManager::new());
    let dispatch_handler = jsonrpc.clone();
    cometd.set_jsonrpc_handler(Arc::new(move |player_id, command| {
        let handler = dispatch_handler.clone();
        Box::pin(async move { handler.execute_command(player_id, command).await })
    }));

    events.subscribe("player.*", Arc::new(CometdEventBridge { manager: cometd.clone() }));

    events.subscribe(
        "player.track_finished",
        Arc::new(PlaylistAdvancer {
            library: library.clone(),
            registry: registry.clone(),
            playlists: playlists.clone(),
            streaming: streaming.clone(),
            seek: seek.clone(),
            seek_executor: seek_executor.clone(),
            device_config: device_config.clone(),
            transcode_policy: transcode_policy.clone(),
            server_host,
            server_port: config.http_port,
            server_uuid: server_uuid.clone(),
        }),
    );

    let slimproto_listener = if config.slimproto_port != 0 {
        let std_listener = StdTcpListener::bind(("0.0.0.0", config.slimproto_port)).map_err(ResonanceError::from)?;
        std_listener.set_nonblocking(true).map_err(ResonanceError::from)?;
        Some(TcpListener::from_std(std_listener).map_err(ResonanceError::from)?)
    } else {
        None
    };

    let discovery_socket = if config.discovery_enabled { discovery::bind().await.map_err(ResonanceError::from)? } else { None };

    Ok(BootstrappedServices {
        events,
        registry,
        playlists,
        library,
        streaming,
        seek,
        seek_executor,
        device_config,
        transcode_config,
        transcode_policy,
        network,
        cometd,
        jsonrpc,
        server_uuid,
        slimproto_listener,
        discovery_socket,
        spawner,
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::EmptyLibrary;

    #[tokio::test]
    async fn bootstrap_wires_services_with_default_config() {
        let config = Config { slimproto_port: 0, discovery_enabled: false, ..Config::default() };
        let services = bootstrap_services(&config, Arc::new(EmptyLibrary)).await.unwrap();
        assert_eq!(services.registry.len(), 0);
        assert!(services.slimproto_listener.is_none());
        assert!(services.discovery_socket.is_none());
    }
}
