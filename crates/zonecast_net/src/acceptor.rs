//! Long-lived acceptor threads for the output and input TCP ports (§4.4).
//!
//! Each acceptor owns one `TcpListener` for the lifetime of the bridge.
//! `accept()` is the only suspension point taken without any table lock
//! held. When `num_concurrent_users` is nonzero, a newly accepted
//! connection must present a USERID frame whose raw id names a slot before
//! it replaces anything; an id at or beyond `MAX_CLIENTS` terminates the
//! acceptor outright, matching the original driver's fatal-configuration
//! treatment of that case.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::socket::{
    bind, listen, setsockopt, socket, sockopt::ReuseAddr, AddressFamily, Backlog, SockFlag,
    SockType, SockaddrIn,
};

use crate::client_table::{InputTable, OutputTable};
use crate::codec::Frame;
use crate::error::{NetError, NetResult};
use crate::zone::checked_client_id;

/// Backlog passed to `listen()` (§4.4: "listens with backlog 5").
const LISTEN_BACKLOG: i32 = 5;

/// Outcome of the handshake step, distinguishing a rejected connection
/// (retry with the next `accept()`) from an out-of-range user id, which the
/// original driver treats as a fatal configuration error and responds to by
/// terminating the acceptor thread outright.
enum HandshakeOutcome {
    Admitted(usize),
    Rejected,
}

/// Resolve the client id a freshly accepted connection belongs to.
///
/// When `num_concurrent_users` is 0 the handshake is skipped entirely and
/// every connection is client 0 (single-zone mode). Otherwise the peer
/// must send a USERID frame first; any other frame, or a disconnect before
/// one arrives, rejects just that connection. The raw user id is used as
/// the slot index directly -- the input-only bus-address remap (§4.2) is
/// never applied to a handshake id in the original source, only to ids
/// resolved from a stream's bus address.
fn resolve_client_id(
    peer: &TcpStream,
    num_concurrent_users: u32,
    port: u16,
) -> NetResult<HandshakeOutcome> {
    if num_concurrent_users == 0 {
        return Ok(HandshakeOutcome::Admitted(0));
    }
    let frame = match Frame::read_from(peer) {
        Ok(frame) => frame,
        Err(_) => return Ok(HandshakeOutcome::Rejected),
    };
    let Frame::UserId(id) = frame else {
        return Ok(HandshakeOutcome::Rejected);
    };
    match checked_client_id(id) {
        Ok(slot) => Ok(HandshakeOutcome::Admitted(slot)),
        Err(_) => Err(NetError::ClientIdOutOfRange(id)),
    }
}

/// Create the `AF_INET` listening socket for one acceptor: `SO_REUSEADDR`
/// set before bind, bound to `port` on every local interface, and listening
/// with backlog 5, per §4.4 step 1. Built directly with `nix::sys::socket`
/// rather than `TcpListener::bind` because the standard library offers no
/// way to set `SO_REUSEADDR` before the bind call.
fn bind_listener(port: u16) -> NetResult<TcpListener> {
    let fd = socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), None)
        .map_err(|e| NetError::Bind(io::Error::from(e), port))?;
    setsockopt(&fd, ReuseAddr, &true).map_err(|e| NetError::Bind(io::Error::from(e), port))?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    bind(fd.as_raw_fd(), &SockaddrIn::from(addr)).map_err(|e| NetError::Bind(io::Error::from(e), port))?;
    listen(&fd, Backlog::new(LISTEN_BACKLOG).map_err(|e| NetError::Listen(io::Error::from(e), port))?)
        .map_err(|e| NetError::Listen(io::Error::from(e), port))?;

    Ok(TcpListener::from(fd))
}

/// Runs the output-port acceptor loop until `shutdown` is observed.
///
/// On each admitted connection: resolve the client id, replace whatever
/// peer currently occupies that slot (sending it a best-effort CLOSE
/// first), and install the new one. `open_cmd_sent` is always reset by
/// `OutputSlot::accept_peer`, so the next `write()` call re-announces OPEN
/// to the new peer -- matching `oss_is_sent_open_cmd` always being reset
/// to 0 on accept in the original source (the "half-disabled latch",
/// `SPEC_FULL.md` §9).
pub fn run_output_acceptor(
    port: u16,
    num_concurrent_users: u32,
    table: Arc<OutputTable>,
    shutdown: Arc<AtomicBool>,
    on_admit: impl Fn(usize),
) -> NetResult<()> {
    let listener = bind_listener(port)?;
    listener.set_nonblocking(false).ok();
    while !shutdown.load(Ordering::Acquire) {
        let (peer, _addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                tracing::error!("output acceptor on port {port}: {e}");
                continue;
            }
        };

        let client_id = match resolve_client_id(&peer, num_concurrent_users, port) {
            Ok(HandshakeOutcome::Admitted(id)) => id,
            Ok(HandshakeOutcome::Rejected) => {
                tracing::warn!("output connection rejected on port {port}: bad or missing USERID");
                continue;
            }
            Err(e) => {
                tracing::error!("output acceptor on port {port} terminating: {e}");
                return Err(e);
            }
        };

        tracing::info!(client_id, port, "admitting output peer");
        match table.slot(client_id).accept_peer(peer) {
            Ok(Some(previous)) => {
                let _ = Frame::Close.write_to(&previous);
                drop(previous);
                on_admit(client_id);
            }
            Ok(None) => on_admit(client_id),
            Err(e) => tracing::error!("failed to register output peer: {e}"),
        }
    }
    Ok(())
}

/// Runs the input-port acceptor loop until `shutdown` is observed.
///
/// Unlike the output acceptor, replacement does **not** clear
/// `read_started` -- only `close_input_stream` does -- matching
/// `in_socket_server_thread` in the original source, which reads but never
/// resets `iss_read_flag` on accept.
pub fn run_input_acceptor(
    port: u16,
    num_concurrent_users: u32,
    table: Arc<InputTable>,
    shutdown: Arc<AtomicBool>,
    on_admit: impl Fn(usize),
) -> NetResult<()> {
    let listener = bind_listener(port)?;
    listener.set_nonblocking(false).ok();
    while !shutdown.load(Ordering::Acquire) {
        let (peer, _addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                tracing::error!("input acceptor on port {port}: {e}");
                continue;
            }
        };

        let client_id = match resolve_client_id(&peer, num_concurrent_users, port) {
            Ok(HandshakeOutcome::Admitted(id)) => id,
            Ok(HandshakeOutcome::Rejected) => {
                tracing::warn!("input connection rejected on port {port}: bad or missing USERID");
                continue;
            }
            Err(e) => {
                tracing::error!("input acceptor on port {port} terminating: {e}");
                return Err(e);
            }
        };

        tracing::info!(client_id, port, "admitting input peer");
        let slot = table.slot(client_id);
        if slot.read_started() {
            let _ = slot.send_close();
        }
        match slot.accept_peer(peer) {
            Ok(previous) => {
                drop(previous);
                on_admit(client_id);
            }
            Err(e) => tracing::error!("failed to register input peer: {e}"),
        }
    }
    Ok(())
}

/// Unblocks a listener's blocking `accept()` by connecting to it once and
/// immediately dropping the connection. Used by shutdown to stop an
/// acceptor thread without needing a nonblocking poll loop on the hot path.
pub fn wake_acceptor(port: u16) {
    if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)) {
        drop(stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FRAME_SIZE;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_zone_mode_skips_handshake() {
        let (_client, server) = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            let client = TcpStream::connect(addr).unwrap();
            let (server, _) = listener.accept().unwrap();
            (client, server)
        };
        let outcome = resolve_client_id(&server, 0, 0).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::Admitted(0)));
    }

    #[test]
    fn test_output_acceptor_installs_peer_without_handshake() {
        let table = Arc::new(OutputTable::new().unwrap());
        let shutdown = Arc::new(AtomicBool::new(false));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let table_clone = table.clone();
        let shutdown_clone = shutdown.clone();
        let handle = thread::spawn(move || {
            run_output_acceptor(port, 0, table_clone, shutdown_clone, |_| {}).ok();
        });

        // Give the acceptor a moment to bind before connecting.
        thread::sleep(Duration::from_millis(50));
        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(table.slot(0).has_peer());

        shutdown.store(true, Ordering::Release);
        wake_acceptor(port);
        handle.join().unwrap();
    }

    #[test]
    fn test_output_acceptor_replacement_sends_close_to_displaced_peer() {
        let table = Arc::new(OutputTable::new().unwrap());
        let shutdown = Arc::new(AtomicBool::new(false));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let table_clone = table.clone();
        let shutdown_clone = shutdown.clone();
        let handle = thread::spawn(move || {
            run_output_acceptor(port, 0, table_clone, shutdown_clone, |_| {}).ok();
        });

        thread::sleep(Duration::from_millis(50));
        let mut peer_a = TcpStream::connect(("127.0.0.1", port)).unwrap();
        thread::sleep(Duration::from_millis(50));
        let peer_a_prime = TcpStream::connect(("127.0.0.1", port)).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut frame_buf = [0u8; FRAME_SIZE];
        std::io::Read::read_exact(&mut peer_a, &mut frame_buf).unwrap();
        assert_eq!(Frame::decode(&frame_buf).unwrap(), Frame::Close);

        let mut probe = [0u8; 1];
        assert_eq!(std::io::Read::read(&mut peer_a, &mut probe).unwrap(), 0);
        drop(peer_a_prime);

        shutdown.store(true, Ordering::Release);
        wake_acceptor(port);
        handle.join().unwrap();
    }

    #[test]
    fn test_handshake_rejects_non_userid_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        Frame::Close.write_to(&client).unwrap();
        let outcome = resolve_client_id(&server, 2, addr.port()).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::Rejected));
    }

    #[test]
    fn test_handshake_uses_raw_user_id_unremapped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        Frame::UserId(3).write_to(&client).unwrap();
        let outcome = resolve_client_id(&server, 4, addr.port()).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::Admitted(3)));
    }

    #[test]
    fn test_handshake_out_of_range_user_id_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        Frame::UserId(8).write_to(&client).unwrap();
        let err = resolve_client_id(&server, 4, addr.port()).unwrap_err();
        assert!(matches!(err, NetError::ClientIdOutOfRange(8)));
    }
}
