//! Mock transport for testing

use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;

use super::Transport;
use crate::wire::{self, Packet};

/// Records every datagram instead of sending it.
#[derive(Default)]
pub(crate) struct MockTransport {
    inner: RefCell<MockTransportInner>,
}

#[derive(Default)]
struct MockTransportInner {
    sent: Vec<(SocketAddr, Vec<u8>)>,
    failing: HashSet<SocketAddr>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every send to `addr` fail from now on
    pub(crate) fn fail_for(&self, addr: SocketAddr) {
        self.inner.borrow_mut().failing.insert(addr);
    }

    /// Decoded datagrams in send order
    pub(crate) fn sent(&self) -> Vec<(SocketAddr, Packet)> {
        self.inner
            .borrow()
            .sent
            .iter()
            .map(|(addr, bytes)| (*addr, wire::decode(bytes).unwrap()))
            .collect()
    }

    pub(crate) fn sent_to(&self, addr: SocketAddr) -> Vec<Packet> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == addr)
            .map(|(_, packet)| packet)
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.inner.borrow_mut().sent.clear();
    }
}

impl Transport for MockTransport {
    fn transmit(&self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.failing.contains(&addr) {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        inner.sent.push((addr, buf.to_vec()));
        Ok(())
    }
}
