//! Resonance Core - shared library for the Resonance music server.
//!
//! This crate implements the server-side half of the Slimproto/LMS
//! protocol family: it speaks Slimproto to hardware and software players,
//! serves JSON-RPC and CometD to control apps, and streams audio (direct
//! or transcoded) over HTTP. It does not scan or catalog a music library
//! itself — that lives behind the [`library::Library`] trait, implemented
//! by whatever embeds this crate.
//!
//! # Architecture
//!
//! - [`player`]: Connected-player registry, identity, and transport state
//! - [`protocol`]: Wire protocols — UDP discovery and the Slimproto TCP connection
//! - [`streaming`]: Transcode policy, device capability table, stream
//!   coordination, seek debouncing, and the transcoder subprocess pipeline
//! - [`playlist`]: Per-player playlist (queue) management
//! - [`web`]: HTTP surface — `/stream.mp3`, `/jsonrpc.js`, `/cometd`
//! - [`library`]: External collaborator trait for catalog browsing
//! - [`events`]: Event bus decoupling protocol state changes from Cometd/playlist consumers
//! - [`context`]: Network configuration and URL building
//! - [`config`]: Core server configuration
//! - [`bootstrap`]: Composition root wiring every service together
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple core logic from
//! platform-specific or deployment-specific concerns:
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`IpDetector`](context::IpDetector): Local IP detection
//! - [`Lifecycle`](lifecycle::Lifecycle): Restart/shutdown requests
//! - [`Library`](library::Library): Catalog browsing and track resolution
//!
//! Each trait has a default implementation suitable for the standalone
//! server binary in `apps/server`.

#![warn(clippy::all)]

pub mod artwork;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod library;
pub mod lifecycle;
pub mod player;
pub mod playlist;
pub mod protocol;
pub mod protocol_constants;
pub mod runtime;
pub mod streaming;
pub mod utils;
pub mod web;

pub use artwork::{ArtworkData, ArtworkProvider, NoArtworkProvider};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use config::Config;
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{ErrorCode, ResonanceError, ResonanceResult};
pub use events::{Event, EventBus, EventHandler};
pub use library::{BrowsePage, BrowseParams, EmptyLibrary, Library, TrackInfo};
pub use lifecycle::{Lifecycle, NoopLifecycle, ServerLifecycle};
pub use player::{PlayerClient, PlayerIdentity, PlayerInfo, PlayerRegistry, PlayerState, PlayerStatus};
pub use playlist::{Playlist, PlaylistManager, PlaylistTrack, RepeatMode, ShuffleMode};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use streaming::{DeviceConfig, SeekCoordinator, SeekExecutor, StreamingCoordinator, TranscodeConfig, TranscodePolicy};
pub use web::{create_router, AppState};
