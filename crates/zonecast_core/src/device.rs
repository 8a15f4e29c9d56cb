//! Host audio-device contract: status codes and the inert operations that
//! the spec calls out as behaviorally fixed (§6).
//!
//! None of these carry per-zone state; they exist so `AudioBridge` can
//! expose a device surface shaped like the host's conventional audio HAL
//! without reintroducing the excluded host-property parser or HAL loader.

/// Negative-error-code convention used by the host device contract.
/// `Ok` variants always translate to 0; `Err` carries the negative code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalStatus {
    Ok,
    NoMemory,
    NotSupported,
    InvalidArgument,
}

impl HalStatus {
    pub fn as_code(self) -> i32 {
        match self {
            HalStatus::Ok => 0,
            HalStatus::NoMemory => -12,      // -ENOMEM
            HalStatus::NotSupported => -38,  // -ENOSYS
            HalStatus::InvalidArgument => -22, // -EINVAL
        }
    }
}

/// Inert per-stream operations: dump, parameter get/set, effects, volume,
/// gain, render-position, write-timestamp, lost-frame count, and metadata
/// update all behave as fixed no-ops or fixed sentinel returns, regardless
/// of bridge state (§6's "behaviorally inert" list).
pub mod inert {
    use super::HalStatus;

    pub fn dump() -> HalStatus {
        HalStatus::Ok
    }

    pub fn set_parameters(_kv_pairs: &str) -> HalStatus {
        HalStatus::Ok
    }

    pub fn get_parameters(_keys: &str) -> String {
        String::new()
    }

    pub fn add_remove_effect() -> HalStatus {
        HalStatus::Ok
    }

    pub fn set_voice_volume(_volume: f32) -> HalStatus {
        HalStatus::Ok
    }

    pub fn set_master_volume(_volume: f32) -> HalStatus {
        HalStatus::Ok
    }

    pub fn set_master_mute(_muted: bool) -> HalStatus {
        HalStatus::Ok
    }

    pub fn get_master_mute() -> bool {
        false
    }

    pub fn set_mode(_mode: i32) -> HalStatus {
        HalStatus::Ok
    }

    pub fn set_volume(_left: f32, _right: f32) -> HalStatus {
        HalStatus::Ok
    }

    pub fn set_gain(_gain: f32) -> HalStatus {
        HalStatus::Ok
    }

    pub fn get_render_position() -> Result<u32, HalStatus> {
        Err(HalStatus::InvalidArgument)
    }

    pub fn get_next_write_timestamp() -> Result<i64, HalStatus> {
        Err(HalStatus::InvalidArgument)
    }

    pub fn get_input_frames_lost() -> u32 {
        0
    }

    pub fn update_source_metadata() -> HalStatus {
        HalStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_status_codes() {
        assert_eq!(HalStatus::Ok.as_code(), 0);
        assert_eq!(HalStatus::NoMemory.as_code(), -12);
        assert_eq!(HalStatus::InvalidArgument.as_code(), -22);
    }

    #[test]
    fn test_inert_get_parameters_is_empty() {
        assert_eq!(inert::get_parameters("any"), "");
    }

    #[test]
    fn test_inert_render_position_is_invalid_argument() {
        assert_eq!(inert::get_render_position(), Err(HalStatus::InvalidArgument));
    }

    #[test]
    fn test_inert_input_frames_lost_is_zero() {
        assert_eq!(inert::get_input_frames_lost(), 0);
    }

    #[test]
    fn test_inert_master_mute_defaults_unmuted() {
        assert!(!inert::get_master_mute());
        assert_eq!(inert::set_master_mute(true), HalStatus::Ok);
    }

    #[test]
    fn test_inert_set_mode_is_ok() {
        assert_eq!(inert::set_mode(0), HalStatus::Ok);
    }
}
