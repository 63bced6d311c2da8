//! Binary codec for the LIFX LAN protocol.
//!
//! Every packet is a 36-byte header followed by a payload whose size is fixed
//! by the packet type. All integers are little-endian and strings are
//! fixed-width, NUL-padded fields.
//!
//! ```text
//! offset  size  field
//!      0     2  size (whole frame, header included)
//!      2     2  protocol: version:12 | addressable:1 | tagged:1 | origin:2
//!      4     4  source
//!      8     8  target: device address (6 bytes + 2 pad) or tag mask
//!     16     6  site
//!     22     1  flags: ack_required:1 | res_required:1
//!     23     1  sequence
//!     24     8  timestamp
//!     32     2  packet type
//!     34     2  reserved
//! ```
//!
//! # Example
//!
//! ```
//! use lightsd_rs::wire::{self, Header, Packet, Payload, Target};
//! use lightsd_rs::{DeviceId, PowerState, SiteId};
//!
//! let device = DeviceId::new([0xd0, 0x73, 0xd5, 0x01, 0xa0, 0xd5]);
//! let packet = Packet::new(
//!     Header::new(Target::Device(device), SiteId::default()),
//!     Payload::SetPowerState(PowerState::On),
//! );
//!
//! let bytes = wire::encode(&packet);
//! assert_eq!(bytes.len(), 38);
//! assert_eq!(wire::decode(&bytes).unwrap(), packet);
//! ```

mod buf;
mod payload;

use std::num::NonZeroU64;

use buf::{Reader, Writer};
pub use payload::{LightStatus, PacketType, Payload, WaveformParams};

use crate::types::{ADDR_LENGTH, DeviceId, SiteId};

/// UDP port bulbs listen on.
pub const PORT: u16 = 56700;
/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 36;
/// Capacity of label fields in bytes.
pub const LABEL_SIZE: usize = 32;
/// Protocol number spoken by the first generation of bulbs.
pub const PROTOCOL_VERSION: u16 = 1024;

const PROTOCOL_VERSION_MASK: u16 = 0x0fff;
const ADDRESSABLE_BIT: u16 = 1 << 12;
const TAGGED_BIT: u16 = 1 << 13;
const ACK_REQUIRED_BIT: u8 = 1 << 0;
const RES_REQUIRED_BIT: u8 = 1 << 1;

/// Why a datagram could not be decoded.
///
/// These are always recovered from by dropping the datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes are available than the frame declares.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The message type is not one this crate knows.
    #[error("unknown packet type {0:#06x}")]
    UnknownType(u16),

    /// The declared size disagrees with the size rules of the packet type.
    #[error("size mismatch: expected {expected} bytes, frame declares {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// An enumerated field holds a value outside its range.
    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u64 },
}

/// Addressing mode of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every bulb of the site.
    All,
    /// Bulbs carrying any of the tags in the mask.
    Tags(NonZeroU64),
    /// A single bulb.
    Device(DeviceId),
}

impl Target {
    pub fn is_tagged(&self) -> bool {
        !matches!(self, Target::Device(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    protocol: u16,
    pub addressable: bool,
    pub source: u32,
    pub target: Target,
    pub site: SiteId,
    pub ack_required: bool,
    pub res_required: bool,
    pub sequence: u8,
    pub timestamp: u64,
}

impl Header {
    pub fn new(target: Target, site: SiteId) -> Self {
        Header {
            protocol: PROTOCOL_VERSION,
            addressable: true,
            source: 0,
            target,
            site,
            ack_required: false,
            res_required: false,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Protocol number; only the low 12 bits fit in the header.
    pub fn with_protocol(mut self, protocol: u16) -> Self {
        self.protocol = protocol & PROTOCOL_VERSION_MASK;
        self
    }

    pub fn protocol(&self) -> u16 {
        self.protocol
    }

    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    /// Ask the device to answer with its updated state.
    pub fn with_response(mut self) -> Self {
        self.res_required = true;
        self
    }

    fn encode_into(&self, w: &mut Writer, packet_type: PacketType, size: usize) {
        let mut protocol = self.protocol;
        if self.addressable {
            protocol |= ADDRESSABLE_BIT;
        }
        if self.target.is_tagged() {
            protocol |= TAGGED_BIT;
        }

        let mut flags = 0;
        if self.ack_required {
            flags |= ACK_REQUIRED_BIT;
        }
        if self.res_required {
            flags |= RES_REQUIRED_BIT;
        }

        w.put_u16(size as u16);
        w.put_u16(protocol);
        w.put_u32(self.source);
        match self.target {
            Target::Device(id) => {
                w.put_bytes(id.as_bytes());
                w.put_zeros(8 - ADDR_LENGTH);
            }
            Target::All => w.put_u64(0),
            Target::Tags(mask) => w.put_u64(mask.get()),
        }
        w.put_bytes(self.site.as_bytes());
        w.put_u8(flags);
        w.put_u8(self.sequence);
        w.put_u64(self.timestamp);
        w.put_u16(packet_type.id());
        w.put_zeros(2);
    }

    /// Reads everything after the size field, returning the raw packet type.
    fn decode_from(r: &mut Reader<'_>) -> Result<(Self, u16), DecodeError> {
        let protocol = r.u16()?;
        let source = r.u32()?;
        let raw_target = r.take::<8>()?;
        let site = SiteId::new(r.take::<ADDR_LENGTH>()?);
        let flags = r.u8()?;
        let sequence = r.u8()?;
        let timestamp = r.u64()?;
        let packet_type = r.u16()?;
        r.take::<2>()?;

        let target = if protocol & TAGGED_BIT != 0 {
            match NonZeroU64::new(u64::from_le_bytes(raw_target)) {
                Some(mask) => Target::Tags(mask),
                None => Target::All,
            }
        } else {
            let mut addr = [0u8; ADDR_LENGTH];
            addr.copy_from_slice(&raw_target[..ADDR_LENGTH]);
            Target::Device(DeviceId::new(addr))
        };

        let header = Header {
            protocol: protocol & PROTOCOL_VERSION_MASK,
            addressable: protocol & ADDRESSABLE_BIT != 0,
            source,
            target,
            site,
            ack_required: flags & ACK_REQUIRED_BIT != 0,
            res_required: flags & RES_REQUIRED_BIT != 0,
            sequence,
            timestamp,
        };
        Ok((header, packet_type))
    }
}

/// One frame of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub payload: Payload,
}

impl Packet {
    pub fn new(header: Header, payload: Payload) -> Self {
        Packet { header, payload }
    }

    pub fn packet_type(&self) -> PacketType {
        self.payload.packet_type()
    }

    pub fn encode(&self) -> Vec<u8> {
        let packet_type = self.packet_type();
        let size = HEADER_SIZE + packet_type.payload_size();

        let mut w = Writer::with_capacity(size);
        self.header.encode_into(&mut w, packet_type, size);
        self.payload.encode_into(&mut w);
        debug_assert_eq!(w.len(), size, "{packet_type} encoded to the wrong size");
        w.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let Some(size) = bytes.first_chunk::<2>().map(|b| u16::from_le_bytes(*b) as usize)
        else {
            return Err(DecodeError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        };
        if bytes.len() < size {
            return Err(DecodeError::Truncated {
                expected: size,
                actual: bytes.len(),
            });
        }
        if size < HEADER_SIZE {
            return Err(DecodeError::SizeMismatch {
                expected: HEADER_SIZE,
                actual: size,
            });
        }

        let mut r = Reader::new(&bytes[2..size]);
        let (header, raw_type) = Header::decode_from(&mut r)?;
        let packet_type = PacketType::create(raw_type).ok_or(DecodeError::UnknownType(raw_type))?;

        let expected = HEADER_SIZE + packet_type.payload_size();
        if size != expected {
            return Err(DecodeError::SizeMismatch {
                expected,
                actual: size,
            });
        }

        let payload = Payload::decode_from(packet_type, &mut r)?;
        Ok(Packet { header, payload })
    }
}

/// Encode a packet into a new buffer.
pub fn encode(packet: &Packet) -> Vec<u8> {
    packet.encode()
}

/// Decode the frame at the start of `bytes`; trailing bytes are ignored.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    Packet::decode(bytes)
}
