//! Bus-address parsing: maps a stream's routing string to a client id.

/// Upper bound on concurrent zones; also the bound every resolved id is
/// checked against before it is used to index a per-direction slot table.
pub const MAX_CLIENTS: usize = 8;

const ZONE_KEYWORD: &str = "_audio_zone_";

/// Parse the client id out of a bus address.
///
/// Finds `_audio_zone_` in `address` and parses the decimal integer that
/// immediately follows it. Absence of the keyword, a parse failure, or a
/// negative value all yield `0` -- this mirrors `get_client_id_from_address`
/// in the original C driver, which has no error return for a malformed
/// address, only a safe default.
pub fn client_id_from_address(address: &str) -> u32 {
    let Some(pos) = address.find(ZONE_KEYWORD) else {
        return 0;
    };
    let digits_start = pos + ZONE_KEYWORD.len();
    let digits: String = address[digits_start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse::<i64>().map(|n| if n < 0 { 0 } else { n as u32 }).unwrap_or(0)
}

/// Input-only remap: secondary-user input ids are offset by 10 in the host's
/// user-id numbering. Output ids are never remapped (see `SPEC_FULL.md` §9 --
/// `get_client_id_from_user_id` is only ever called from the input path in
/// the original source).
pub fn remap_input_client_id(client_id: u32) -> u32 {
    if client_id >= 10 {
        client_id - 10
    } else {
        client_id
    }
}

/// Bounds-check a resolved client id against `MAX_CLIENTS`.
pub fn checked_client_id(client_id: u32) -> Result<usize, crate::error::NetError> {
    let id = client_id as usize;
    if id >= MAX_CLIENTS {
        Err(crate::error::NetError::ClientIdOutOfRange(client_id))
    } else {
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keyword_yields_zero() {
        assert_eq!(client_id_from_address(""), 0);
        assert_eq!(client_id_from_address("some/other/bus"), 0);
    }

    #[test]
    fn test_parses_trailing_integer() {
        assert_eq!(client_id_from_address("zone/_audio_zone_3"), 3);
        assert_eq!(client_id_from_address("_audio_zone_0"), 0);
        assert_eq!(client_id_from_address("_audio_zone_7/extra"), 7);
    }

    #[test]
    fn test_negative_yields_zero() {
        assert_eq!(client_id_from_address("_audio_zone_-1"), 0);
    }

    #[test]
    fn test_garbage_after_keyword_yields_zero() {
        assert_eq!(client_id_from_address("_audio_zone_abc"), 0);
    }

    #[test]
    fn test_input_remap() {
        assert_eq!(remap_input_client_id(9), 9);
        assert_eq!(remap_input_client_id(10), 0);
        assert_eq!(remap_input_client_id(13), 3);
    }

    #[test]
    fn test_checked_client_id_bounds() {
        assert!(checked_client_id(7).is_ok());
        assert!(checked_client_id(8).is_err());
        assert!(checked_client_id(100).is_err());
    }
}
