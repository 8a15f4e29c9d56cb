//! Stream and bridge configuration.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{BridgeError, BridgeResult};

/// PCM sample format carried in the OPEN frame's `format` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Pcm8,
    Pcm16,
    PcmFloat,
}

impl AudioFormat {
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            AudioFormat::Pcm8 => 1,
            AudioFormat::Pcm16 => 2,
            AudioFormat::PcmFloat => 4,
        }
    }

    fn wire_value(self) -> u32 {
        match self {
            AudioFormat::Pcm8 => 0,
            AudioFormat::Pcm16 => 1,
            AudioFormat::PcmFloat => 2,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat::Pcm16
    }
}

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_STEREO_MASK: u32 = 0b11;
const DEFAULT_STREAM_BUFFER_MS: u32 = 10;

/// A host stream's negotiated audio format (§3 DATA MODEL: StreamConfig).
///
/// `new` applies the host-contract defaults whenever the caller passes a
/// zero/default value, mirroring `adev_open_output_stream`/
/// `adev_open_input_stream`'s substitution of `config->sample_rate = 48000`
/// etc. when the host leaves a field unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channel_mask: u32,
    pub format: AudioFormat,
    pub frame_count: u32,
}

impl StreamConfig {
    /// `format` is the host-requested sample format, or `None` when the host
    /// leaves it unspecified (the host contract's "default" format sentinel);
    /// an unspecified format falls back to `AudioFormat::default()` (PCM_16)
    /// the same way an unspecified `sample_rate`/`channel_mask` does.
    pub fn new(sample_rate: u32, channel_mask: u32, format: Option<AudioFormat>, buffer_ms: u32) -> Self {
        let sample_rate = if sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            sample_rate
        };
        let channel_mask = if channel_mask == 0 {
            DEFAULT_STEREO_MASK
        } else {
            channel_mask
        };
        let buffer_ms = if buffer_ms == 0 {
            DEFAULT_STREAM_BUFFER_MS
        } else {
            buffer_ms
        };
        let format = format.unwrap_or_default();
        Self {
            sample_rate,
            channel_mask,
            format,
            frame_count: buffer_ms * sample_rate / 1000,
        }
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_mask.count_ones().max(1)
    }

    pub fn frame_size(&self) -> u32 {
        self.channel_count() * self.format.bytes_per_sample()
    }

    /// Build the OPEN frame's wire payload; `channel_mask_mode` selects
    /// between sending the channel count or the raw mask bits (§4.7).
    pub fn to_wire(&self, channel_mask_mode: bool) -> zonecast_net::StreamWireConfig {
        zonecast_net::StreamWireConfig {
            sample_rate: self.sample_rate,
            channel: if channel_mask_mode {
                self.channel_mask
            } else {
                self.channel_count()
            },
            format: self.format.wire_value(),
            frame_count: self.frame_count,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(0, 0, None, 0)
    }
}

/// `get_input_buffer_size`'s byte computation (§6): samples-per-ms times
/// bytes-per-sample, scaled up for formats that are not one-byte-per-sample
/// proportional (mirrors the `*4` fallback in the original).
pub fn input_buffer_size_bytes(input_buffer_ms: u32, sample_rate: u32, channel_count: u32, format: AudioFormat) -> u32 {
    let samples_per_ms = sample_rate / 1000;
    let frames = samples_per_ms * input_buffer_ms * channel_count;
    let bytes = frames * format.bytes_per_sample();
    if format == AudioFormat::PcmFloat {
        bytes * 4
    } else {
        bytes
    }
}

/// The five recognized options (§6), as a typed in-process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub out_port: u16,
    pub in_port: u16,
    pub num_concurrent_users: u32,
    pub input_buffer_ms: u32,
    pub channel_mask_mode: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            out_port: 8768,
            in_port: 8767,
            num_concurrent_users: 0,
            input_buffer_ms: 10,
            channel_mask_mode: false,
        }
    }
}

impl BridgeConfig {
    /// Load from `path`; a missing or corrupt file silently falls back to
    /// `BridgeConfig::default()` with a logged warning, the way the teacher's
    /// settings loader degrades rather than failing device open.
    pub fn from_file(path: &Path) -> Self {
        if !path.exists() {
            info!(?path, "no bridge config file found, using defaults");
            return Self::default();
        }
        match fs::File::open(path) {
            Ok(file) => match serde_json::from_reader(file) {
                Ok(config) => {
                    info!(?path, "loaded bridge config");
                    config
                }
                Err(e) => {
                    warn!(?path, "failed to parse bridge config, using defaults: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                error!(?path, "failed to open bridge config, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Apply `ZONECAST_*` environment overrides on top of `self`, leaving
    /// any absent variable untouched.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_u16("ZONECAST_OUT_PORT") {
            self.out_port = v;
        }
        if let Some(v) = env_u16("ZONECAST_IN_PORT") {
            self.in_port = v;
        }
        if let Some(v) = env_u32("ZONECAST_CONCURRENT_USERS") {
            self.num_concurrent_users = v;
        }
        if let Some(v) = env_u32("ZONECAST_IN_BUFFER_MS") {
            self.input_buffer_ms = v;
        }
        if let Ok(v) = env::var("ZONECAST_CHANNEL_MASK_MODE") {
            self.channel_mask_mode = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        self
    }

    /// Compiled-in defaults, then an optional config file, then env
    /// overrides -- the priority order described in `SPEC_FULL.md` §2.1.
    pub fn load(path: Option<&Path>) -> Self {
        let base = match path {
            Some(p) => Self::from_file(p),
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// Defaults plus `ZONECAST_*` environment overrides, with no config
    /// file in the lookup chain -- the host-contract-compatible surface
    /// named directly in the configuration table (§6).
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Clamp `input_buffer_ms` to `[10, 1000]` (§6 boundary table).
    /// Infallible today -- always returns `Ok` -- but kept `Result`-shaped
    /// for option combinations that might later be rejected outright.
    pub fn validate(&mut self) -> BridgeResult<()> {
        self.input_buffer_ms = self.input_buffer_ms.clamp(10, 1000);
        if self.num_concurrent_users as usize > zonecast_net::MAX_CLIENTS {
            return Err(BridgeError::InvalidConfig(format!(
                "num_concurrent_users {} exceeds MAX_CLIENTS {}",
                self.num_concurrent_users,
                zonecast_net::MAX_CLIENTS
            )));
        }
        Ok(())
    }
}

fn env_u16(name: &str) -> Option<u16> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bridge_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.out_port, 8768);
        assert_eq!(config.in_port, 8767);
        assert_eq!(config.num_concurrent_users, 0);
        assert_eq!(config.input_buffer_ms, 10);
        assert!(!config.channel_mask_mode);
    }

    #[test]
    fn test_input_buffer_ms_clamps_up_from_zero() {
        let mut config = BridgeConfig {
            input_buffer_ms: 0,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.input_buffer_ms, 10);
    }

    #[test]
    fn test_input_buffer_ms_clamps_down_from_large() {
        let mut config = BridgeConfig {
            input_buffer_ms: 5000,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.input_buffer_ms, 1000);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = BridgeConfig::from_file(Path::new("/nonexistent/zonecast.json"));
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_stream_config_defaults_applied_on_zero() {
        let cfg = StreamConfig::new(0, 0, None, 0);
        assert_eq!(cfg.sample_rate, 48000);
        assert_eq!(cfg.channel_count(), 2);
        assert_eq!(cfg.frame_count, 480);
        assert_eq!(cfg.format, AudioFormat::Pcm16);
    }

    #[test]
    fn test_stream_config_preserves_caller_values() {
        let cfg = StreamConfig::new(44100, 0b1, Some(AudioFormat::PcmFloat), 20);
        assert_eq!(cfg.sample_rate, 44100);
        assert_eq!(cfg.channel_count(), 1);
        assert_eq!(cfg.frame_count, 44100 * 20 / 1000);
        assert_eq!(cfg.format, AudioFormat::PcmFloat);
    }

    #[test]
    fn test_input_buffer_size_is_monotone() {
        let small = input_buffer_size_bytes(10, 44100, 2, AudioFormat::Pcm16);
        let bigger_rate = input_buffer_size_bytes(10, 48000, 2, AudioFormat::Pcm16);
        let bigger_channels = input_buffer_size_bytes(10, 44100, 4, AudioFormat::Pcm16);
        let bigger_format = input_buffer_size_bytes(10, 44100, 2, AudioFormat::PcmFloat);
        assert!(bigger_rate >= small);
        assert!(bigger_channels >= small);
        assert!(bigger_format >= small);
    }

    #[test]
    fn test_env_override_out_port_but_absent_var_leaves_default() {
        env::remove_var("ZONECAST_OUT_PORT");
        let untouched = BridgeConfig::default().with_env_overrides();
        assert_eq!(untouched.out_port, 8768);

        env::set_var("ZONECAST_OUT_PORT", "9999");
        let overridden = BridgeConfig::default().with_env_overrides();
        assert_eq!(overridden.out_port, 9999);
        env::remove_var("ZONECAST_OUT_PORT");
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = BridgeConfig {
            channel_mask_mode: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
