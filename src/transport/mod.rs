//! Outbound datagram path.
//!
//! Everything the engine sends goes through a [`Transport`], which the daemon
//! implements with its UDP socket and tests implement with a recorder.

use std::io;
use std::net::SocketAddr;

use log::{debug, warn};

use crate::history::{Direction, PacketHistory};
use crate::runtime::{AsyncUdpSocket, UdpSocket};
use crate::wire::Packet;

#[cfg(test)]
pub(crate) mod mock;

/// Best-effort, non-blocking datagram sink.
pub trait Transport {
    /// Send one datagram without waiting.
    ///
    /// A send that would block is an error, not a delay.
    fn transmit(&self, buf: &[u8], addr: SocketAddr) -> io::Result<()>;
}

impl Transport for UdpSocket {
    fn transmit(&self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
        let sent = self.try_send_to(buf, addr)?;
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {sent} of {} bytes", buf.len()),
            ));
        }
        Ok(())
    }
}

/// Encodes packets onto a transport, logging and recording each one.
pub struct Outbound<'a> {
    transport: &'a dyn Transport,
    history: &'a mut PacketHistory,
}

impl<'a> Outbound<'a> {
    pub fn new(transport: &'a dyn Transport, history: &'a mut PacketHistory) -> Self {
        Outbound { transport, history }
    }

    /// Send `packet` to `addr`, returning whether the datagram left.
    pub fn send(&mut self, packet: &Packet, addr: SocketAddr) -> bool {
        let packet_type = packet.packet_type();
        match self.transport.transmit(&packet.encode(), addr) {
            Ok(()) => {
                debug!(
                    "-> {addr} {packet_type} seq={} target={:?}",
                    packet.header.sequence, packet.header.target
                );
                self.history
                    .record(Direction::Sent, addr, packet_type.to_string());
                true
            }
            Err(err) => {
                warn!("failed to send {packet_type} to {addr}: {err}");
                self.history
                    .record_error(&format!("send {packet_type} to {addr}: {err}"));
                false
            }
        }
    }
}
