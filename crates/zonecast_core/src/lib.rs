//! ZoneCast Core - Bridge Engine
//!
//! This crate provides the bridge engine for ZoneCast, including:
//! - Stream configuration and the host-facing open/close/write/read contract
//! - The soft real-time pacing clock shared by output and input streams
//! - The inert host device surface (§6's behaviorally-fixed operations)
//! - Process-wide setup (SIGPIPE) and acceptor-thread lifecycle
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AudioBridge                             │
//! │   open_output_stream/open_input_stream ──▶ OutputStream /   │
//! │   InputStream, each bound to one client id                  │
//! └───────────────────────────┬───────────────────────────────────┘
//!                              │ zonecast_net::OutputTable/InputTable
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │         out-acceptor thread        in-acceptor thread       │
//! │         (port 8768)                (port 8767)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod device;
mod engine;
mod error;
mod stream;

pub use config::{input_buffer_size_bytes, AudioFormat, BridgeConfig, StreamConfig};
pub use device::{inert, HalStatus};
pub use engine::AudioBridge;
pub use error::{BridgeError, BridgeResult};
pub use stream::{InputStream, OutputStream};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _config = BridgeConfig::default();
        let _format = AudioFormat::default();
    }
}
