//! One `epoll` set per client slot, created once at startup and reused
//! across peer connections -- see `SPEC_FULL.md` §4.3 / §9 ("epoll per
//! slot"). Each set ever holds at most one registered fd, so `wait` never
//! has to disambiguate between multiple ready descriptors.

use std::os::fd::BorrowedFd;

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use crate::error::{NetError, NetResult};

/// Outcome of one `epoll_wait` call against a slot's set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The registered fd became ready for the events it was armed with.
    Ready,
    /// No event arrived within the timeout.
    Timeout,
    /// The registered fd reported EPOLLERR or EPOLLHUP.
    ErrorOrHangup,
}

pub struct SlotEpoll {
    epoll: Epoll,
}

impl SlotEpoll {
    pub fn new() -> NetResult<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty()).map_err(NetError::Epoll)?;
        Ok(Self { epoll })
    }

    /// Arm `fd` with `flags` (EPOLLOUT for output slots, EPOLLIN for input
    /// slots). The fd's own value is used as the event's `data` tag since a
    /// set holds only one fd at a time.
    pub fn register(&self, fd: BorrowedFd<'_>, flags: EpollFlags) -> NetResult<()> {
        use std::os::fd::AsRawFd;
        let event = EpollEvent::new(flags, fd.as_raw_fd() as u64);
        self.epoll.add(fd, event).map_err(NetError::Epoll)
    }

    pub fn deregister(&self, fd: BorrowedFd<'_>) -> NetResult<()> {
        self.epoll.delete(fd).map_err(NetError::Epoll)
    }

    /// Wait up to `timeout_ms` for the registered fd to become ready.
    pub fn wait(&self, timeout_ms: u32) -> NetResult<Readiness> {
        let mut events = [EpollEvent::empty()];
        let timeout = EpollTimeout::try_from(timeout_ms).unwrap_or(EpollTimeout::MAX);
        let n = loop {
            match self.epoll.wait(&mut events, timeout) {
                Ok(n) => break n,
                Err(nix::Error::EINTR) => continue,
                Err(e) => return Err(NetError::Epoll(e)),
            }
        };
        if n == 0 {
            return Ok(Readiness::Timeout);
        }
        let flags = events[0].events();
        if flags.intersects(EpollFlags::EPOLLERR | EpollFlags::EPOLLHUP) {
            Ok(Readiness::ErrorOrHangup)
        } else {
            Ok(Readiness::Ready)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsFd;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_wait_times_out_with_no_activity() {
        let (_client, server) = loopback_pair();
        let slot = SlotEpoll::new().unwrap();
        slot.register(server.as_fd(), EpollFlags::EPOLLIN).unwrap();
        assert_eq!(slot.wait(20).unwrap(), Readiness::Timeout);
    }

    #[test]
    fn test_wait_reports_ready_on_incoming_data() {
        let (mut client, server) = loopback_pair();
        let slot = SlotEpoll::new().unwrap();
        slot.register(server.as_fd(), EpollFlags::EPOLLIN).unwrap();
        client.write_all(b"hi").unwrap();
        assert_eq!(slot.wait(500).unwrap(), Readiness::Ready);
    }

    #[test]
    fn test_wait_reports_hangup_after_peer_closes() {
        let (client, server) = loopback_pair();
        let slot = SlotEpoll::new().unwrap();
        slot.register(server.as_fd(), EpollFlags::EPOLLIN).unwrap();
        drop(client);
        assert_eq!(slot.wait(500).unwrap(), Readiness::ErrorOrHangup);
    }
}
