//! Streaming subsystem: transcode policy, device capability table,
//! per-player stream coordination, seek debouncing, and the transcoder
//! subprocess pipeline.

pub mod coordinator;
pub mod device_config;
pub mod policy;
pub mod seek;
pub mod transcoder;

pub use coordinator::{ByteRange, CancellationToken, QueuedFile, StreamingCoordinator};
pub use device_config::{DeviceCapabilities, DeviceConfig, DeviceTier};
pub use policy::TranscodePolicy;
pub use seek::{SeekCoordinator, SeekExecutor};
pub use transcoder::{TranscodeConfig, TranscodeRule};
