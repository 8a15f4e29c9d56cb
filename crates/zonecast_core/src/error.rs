//! Bridge-level error types.

use thiserror::Error;

/// Errors surfaced by the bridge engine itself. Per-peer faults (timeout,
/// disconnect, short read/write against a socket) are never promoted to
/// this type -- they are modeled as degraded `Ok` outcomes by
/// `zonecast_net::client_table`, consistent with `SPEC_FULL.md` §7's
/// "silence fallback is a feature, not an error".
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no output stream installed")]
    NoStreamInstalled,

    #[error("a stream is already open for this direction")]
    StreamAlreadyOpen,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("network error: {0}")]
    Net(#[from] zonecast_net::NetError),

    #[error("internal lock was poisoned")]
    Poisoned,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
