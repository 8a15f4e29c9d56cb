//! ZoneCast net - TCP transport for the virtual audio bridge.
//!
//! This crate owns everything between a decoded host audio buffer and a
//! remote zone's socket: the fixed-size control-frame wire codec, bus
//! address to client-id resolution, the per-slot epoll sets, the output
//! and input client tables, and the two acceptor threads that fill them.
//!
//! # Architecture
//!
//! Two directions, each with its own `MAX_CLIENTS`-sized table of slots
//! and its own long-lived TCP listener. A slot's epoll set is created once
//! and reused across every peer that ever occupies that slot.

pub mod acceptor;
pub mod client_table;
pub mod codec;
pub mod epoll;
pub mod error;
pub mod zone;

pub use acceptor::{run_input_acceptor, run_output_acceptor, wake_acceptor};
pub use client_table::{InputSlot, InputTable, OutputSlot, OutputTable, ReadOutcome, WriteOutcome};
pub use codec::{Cmd, Frame, StreamWireConfig, FRAME_SIZE};
pub use error::{NetError, NetResult};
pub use zone::{checked_client_id, client_id_from_address, remap_input_client_id, MAX_CLIENTS};
