//! Player identity, transport state, and the connection registry.

mod client;
mod identity;
mod registry;
mod status;

pub use client::PlayerClient;
pub use identity::{DeviceType, PlayerIdentity, PlayerInfo};
pub use registry::PlayerRegistry;
pub use status::{PlayerState, PlayerStatus};
