//! Per-direction client slot tables.
//!
//! Each direction owns `MAX_CLIENTS` slots; each slot owns one long-lived
//! epoll set (§4.3) and a small mutex guarding its peer socket and flags.
//! All blocking I/O (`epoll_wait`, socket read/write) is done on a cloned
//! `TcpStream` outside the lock, so the mutex is held only for the
//! bookkeeping mutation itself -- matching `SPEC_FULL.md` §5's "none [of
//! the suspension points] hold the direction mutex".

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsFd;

use nix::sys::epoll::EpollFlags;
use parking_lot::Mutex;

use crate::codec::{Frame, StreamWireConfig};
use crate::epoll::{Readiness, SlotEpoll};
use crate::error::NetResult;
use crate::zone::MAX_CLIENTS;

/// Outcome of a write attempt against an output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No peer connected; the caller still reports `bytes` consumed.
    NotConnected,
    /// `epoll_wait` timed out waiting for EPOLLOUT.
    Timeout,
    /// The peer errored or hung up; its fd has been closed and deregistered.
    PeerGone,
    /// DATA frame plus payload were written; carries the payload bytes
    /// actually written (may be short of what was requested).
    Sent(usize),
}

/// Outcome of a read attempt against an input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// No peer connected, a timeout elapsed, or the peer hung up: the
    /// caller silence-fills and reports the requested byte count delivered.
    Silence,
    /// Bytes were read directly from the peer into the caller's buffer.
    Delivered(usize),
}

fn close_peer(peer: TcpStream) {
    let _ = peer.shutdown(Shutdown::Both);
}

fn write_payload_once(mut peer: &TcpStream, payload: &[u8]) -> usize {
    match peer.write(payload) {
        Ok(n) if n == payload.len() => n,
        Ok(n) => {
            tracing::warn!(wrote = n, expected = payload.len(), "short payload write");
            n
        }
        Err(e) => {
            tracing::error!("payload write to peer failed: {e}");
            0
        }
    }
}

struct OutputSlotState {
    peer: Option<TcpStream>,
    open_cmd_sent: bool,
    standby: bool,
}

/// One output zone's peer socket, epoll set, and output-side flags.
pub struct OutputSlot {
    epoll: SlotEpoll,
    state: Mutex<OutputSlotState>,
}

impl OutputSlot {
    fn new() -> NetResult<Self> {
        Ok(Self {
            epoll: SlotEpoll::new()?,
            state: Mutex::new(OutputSlotState {
                peer: None,
                open_cmd_sent: false,
                standby: true,
            }),
        })
    }

    fn peer_clone(&self) -> Option<TcpStream> {
        self.state.lock().peer.as_ref().and_then(|p| p.try_clone().ok())
    }

    pub fn has_peer(&self) -> bool {
        self.state.lock().peer.is_some()
    }

    pub fn open_cmd_sent(&self) -> bool {
        self.state.lock().open_cmd_sent
    }

    pub fn clear_open_cmd_sent(&self) {
        self.state.lock().open_cmd_sent = false;
    }

    /// Acceptor admit/replace (§4.4 steps 3-4): registers `new_peer` for
    /// EPOLLOUT, deregisters and returns any previous peer (not yet closed
    /// -- the caller sends a best-effort CLOSE before dropping it), resets
    /// `open_cmd_sent` and re-enters standby.
    pub fn accept_peer(&self, new_peer: TcpStream) -> NetResult<Option<TcpStream>> {
        self.epoll.register(new_peer.as_fd(), EpollFlags::EPOLLOUT)?;
        let mut state = self.state.lock();
        let previous = state.peer.take();
        if let Some(prev) = &previous {
            self.epoll.deregister(prev.as_fd())?;
        }
        state.peer = Some(new_peer);
        state.open_cmd_sent = false;
        state.standby = true;
        Ok(previous)
    }

    pub fn send_open(&self, cfg: StreamWireConfig) -> NetResult<bool> {
        match self.peer_clone() {
            Some(peer) => {
                Frame::Open(cfg).write_to(&peer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn send_close(&self) -> NetResult<bool> {
        match self.peer_clone() {
            Some(peer) => {
                Frame::Close.write_to(&peer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// `standby()`: tell a connected peer to stop consuming.
    pub fn enter_standby(&self) -> NetResult<bool> {
        match self.peer_clone() {
            Some(peer) => {
                Frame::StreamStop.write_to(&peer)?;
                self.state.lock().standby = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Core of `write()`: re-announce start if leaving standby, wait for
    /// write-readiness, then transmit one DATA frame and its payload.
    pub fn write_frame(&self, payload: &[u8], timeout_ms: u32) -> NetResult<WriteOutcome> {
        let Some(peer) = self.peer_clone() else {
            return Ok(WriteOutcome::NotConnected);
        };
        let was_standby = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.standby, false)
        };
        if was_standby {
            Frame::StreamStart.write_to(&peer)?;
        }
        match self.epoll.wait(timeout_ms)? {
            Readiness::Timeout => Ok(WriteOutcome::Timeout),
            Readiness::ErrorOrHangup => {
                self.disconnect()?;
                Ok(WriteOutcome::PeerGone)
            }
            Readiness::Ready => {
                Frame::Data {
                    data_size: payload.len() as u32,
                }
                .write_to(&peer)?;
                Ok(WriteOutcome::Sent(write_payload_once(&peer, payload)))
            }
        }
    }

    fn disconnect(&self) -> NetResult<()> {
        let mut state = self.state.lock();
        if let Some(prev) = state.peer.take() {
            self.epoll.deregister(prev.as_fd())?;
            close_peer(prev);
        }
        state.open_cmd_sent = false;
        Ok(())
    }

    /// Device teardown: drop the peer (if any) without sending CLOSE.
    fn teardown(&self) {
        if let Some(prev) = self.state.lock().peer.take() {
            let _ = self.epoll.deregister(prev.as_fd());
            close_peer(prev);
        }
    }
}

struct InputSlotState {
    peer: Option<TcpStream>,
    read_started: bool,
}

/// One input zone's peer socket, epoll set, and input-side flags.
pub struct InputSlot {
    epoll: SlotEpoll,
    state: Mutex<InputSlotState>,
}

impl InputSlot {
    fn new() -> NetResult<Self> {
        Ok(Self {
            epoll: SlotEpoll::new()?,
            state: Mutex::new(InputSlotState {
                peer: None,
                read_started: false,
            }),
        })
    }

    fn peer_clone(&self) -> Option<TcpStream> {
        self.state.lock().peer.as_ref().and_then(|p| p.try_clone().ok())
    }

    pub fn has_peer(&self) -> bool {
        self.state.lock().peer.is_some()
    }

    pub fn read_started(&self) -> bool {
        self.state.lock().read_started
    }

    pub fn set_read_started(&self, started: bool) {
        self.state.lock().read_started = started;
    }

    /// Returns the raw value identity of the current peer, used by the
    /// acceptor to decide whether an incoming connection is actually a
    /// reconnect on the same fd (it never is in practice, but mirrors the
    /// original source's explicit `prev_in_fd != new_client_fd` guard).
    pub fn peer_matches(&self, candidate: &TcpStream) -> bool {
        use std::os::fd::AsRawFd;
        self.state
            .lock()
            .peer
            .as_ref()
            .is_some_and(|p| p.as_raw_fd() == candidate.as_raw_fd())
    }

    /// Acceptor admit/replace. Per `DESIGN.md`'s resolution of the
    /// `read_started` open question, replacement does NOT clear
    /// `read_started` -- only `close_input_stream` does that -- so a
    /// reconnecting peer on an already-reading slot gets a fresh OPEN.
    pub fn accept_peer(&self, new_peer: TcpStream) -> NetResult<Option<TcpStream>> {
        self.epoll.register(new_peer.as_fd(), EpollFlags::EPOLLIN)?;
        let mut state = self.state.lock();
        let previous = state.peer.take();
        if let Some(prev) = &previous {
            self.epoll.deregister(prev.as_fd())?;
        }
        state.peer = Some(new_peer);
        Ok(previous)
    }

    pub fn send_open(&self, cfg: StreamWireConfig) -> NetResult<bool> {
        match self.peer_clone() {
            Some(peer) => {
                Frame::Open(cfg).write_to(&peer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn send_close(&self) -> NetResult<bool> {
        match self.peer_clone() {
            Some(peer) => {
                Frame::Close.write_to(&peer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Core of `read()`'s single attempt: wait for read-readiness, then
    /// read directly into `buffer`. Silence-fill on timeout/disconnect is
    /// the caller's responsibility (it knows the exact shortfall to fill).
    pub fn read_once(&self, buffer: &mut [u8], timeout_ms: u32) -> NetResult<ReadOutcome> {
        let Some(mut peer) = self.peer_clone() else {
            return Ok(ReadOutcome::Silence);
        };
        match self.epoll.wait(timeout_ms)? {
            Readiness::Timeout => Ok(ReadOutcome::Silence),
            Readiness::ErrorOrHangup => {
                self.disconnect()?;
                Ok(ReadOutcome::Silence)
            }
            Readiness::Ready => match peer.read(buffer) {
                Ok(n) => Ok(ReadOutcome::Delivered(n)),
                Err(e) => {
                    tracing::error!("payload read from peer failed: {e}");
                    Ok(ReadOutcome::Delivered(0))
                }
            },
        }
    }

    fn disconnect(&self) -> NetResult<()> {
        let mut state = self.state.lock();
        if let Some(prev) = state.peer.take() {
            self.epoll.deregister(prev.as_fd())?;
            close_peer(prev);
        }
        Ok(())
    }

    fn teardown(&self) {
        if let Some(prev) = self.state.lock().peer.take() {
            let _ = self.epoll.deregister(prev.as_fd());
            close_peer(prev);
        }
        self.state.lock().read_started = false;
    }
}

fn build_slots<T>(new: impl Fn() -> NetResult<T>) -> NetResult<[T; MAX_CLIENTS]> {
    let vec: Vec<T> = (0..MAX_CLIENTS).map(|_| new()).collect::<NetResult<Vec<_>>>()?;
    match vec.try_into() {
        Ok(arr) => Ok(arr),
        Err(_) => unreachable!("vec length is fixed to MAX_CLIENTS"),
    }
}

/// The engine's output-side client table: `MAX_CLIENTS` parallel slots.
pub struct OutputTable {
    slots: [OutputSlot; MAX_CLIENTS],
}

impl OutputTable {
    pub fn new() -> NetResult<Self> {
        Ok(Self {
            slots: build_slots(OutputSlot::new)?,
        })
    }

    pub fn slot(&self, client_id: usize) -> &OutputSlot {
        &self.slots[client_id]
    }

    pub fn teardown(&self) {
        for slot in &self.slots {
            slot.teardown();
        }
    }
}

/// The engine's input-side client table: `MAX_CLIENTS` parallel slots.
pub struct InputTable {
    slots: [InputSlot; MAX_CLIENTS],
}

impl InputTable {
    pub fn new() -> NetResult<Self> {
        Ok(Self {
            slots: build_slots(InputSlot::new)?,
        })
    }

    pub fn slot(&self, client_id: usize) -> &InputSlot {
        &self.slots[client_id]
    }

    pub fn teardown(&self) {
        for slot in &self.slots {
            slot.teardown();
        }
    }
}
