//! Typed packet payloads.

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use super::buf::{Reader, Writer};
use super::{DecodeError, LABEL_SIZE};
use crate::types::{Hsbk, PowerState, Waveform};

/// Message type tags understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[repr(u16)]
pub enum PacketType {
    GetPanGateway = 0x02,
    PanGateway = 0x03,
    GetPowerState = 0x14,
    SetPowerState = 0x15,
    PowerState = 0x16,
    GetBulbLabel = 0x17,
    SetBulbLabel = 0x18,
    BulbLabel = 0x19,
    GetTags = 0x1a,
    SetTags = 0x1b,
    Tags = 0x1c,
    GetTagLabels = 0x1d,
    SetTagLabels = 0x1e,
    TagLabels = 0x1f,
    Acknowledgement = 0x2d,
    GetLightState = 0x65,
    SetLightColor = 0x66,
    SetWaveform = 0x67,
    LightStatus = 0x6b,
}

impl PacketType {
    pub fn create(value: u16) -> Option<Self> {
        PacketType::iter().find(|t| *t as u16 == value)
    }

    pub fn id(&self) -> u16 {
        *self as u16
    }

    /// Fixed payload size in bytes for this type.
    pub fn payload_size(&self) -> usize {
        match self {
            PacketType::GetPanGateway
            | PacketType::GetPowerState
            | PacketType::GetBulbLabel
            | PacketType::GetTags
            | PacketType::GetLightState
            | PacketType::Acknowledgement => 0,
            PacketType::PanGateway => 5,
            PacketType::SetPowerState | PacketType::PowerState => 2,
            PacketType::SetBulbLabel | PacketType::BulbLabel => LABEL_SIZE,
            PacketType::SetTags | PacketType::Tags | PacketType::GetTagLabels => 8,
            PacketType::SetTagLabels | PacketType::TagLabels => 8 + LABEL_SIZE,
            PacketType::SetLightColor => 13,
            PacketType::SetWaveform => 21,
            PacketType::LightStatus => 20 + LABEL_SIZE,
        }
    }

    /// Whether devices send this type (as opposed to clients).
    pub fn is_device_report(&self) -> bool {
        matches!(
            self,
            PacketType::PanGateway
                | PacketType::PowerState
                | PacketType::BulbLabel
                | PacketType::Tags
                | PacketType::TagLabels
                | PacketType::Acknowledgement
                | PacketType::LightStatus
        )
    }
}

/// Full state report of one bulb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightStatus {
    pub color: Hsbk,
    pub dim: i16,
    pub power: PowerState,
    pub label: String,
    pub tags: u64,
}

/// Parameters of a waveform effect.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformParams {
    pub stream: u8,
    /// Return to the original color once the effect completes
    pub transient: bool,
    pub color: Hsbk,
    pub period_ms: u32,
    pub cycles: f32,
    pub skew_ratio: i16,
    pub waveform: Waveform,
}

/// The typed body of a [`Packet`](super::Packet).
///
/// The message type tag on the wire is derived from the variant, so a packet
/// can never carry a payload that disagrees with its type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    GetPanGateway,
    PanGateway { service: u8, port: u32 },
    GetPowerState,
    SetPowerState(PowerState),
    PowerState(PowerState),
    GetBulbLabel,
    SetBulbLabel(String),
    BulbLabel(String),
    GetTags,
    SetTags(u64),
    Tags(u64),
    GetTagLabels(u64),
    SetTagLabels { tags: u64, label: String },
    TagLabels { tags: u64, label: String },
    Acknowledgement,
    GetLightState,
    SetLightColor { stream: u8, color: Hsbk, transition_ms: u32 },
    SetWaveform(WaveformParams),
    LightStatus(LightStatus),
}

impl Payload {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Payload::GetPanGateway => PacketType::GetPanGateway,
            Payload::PanGateway { .. } => PacketType::PanGateway,
            Payload::GetPowerState => PacketType::GetPowerState,
            Payload::SetPowerState(_) => PacketType::SetPowerState,
            Payload::PowerState(_) => PacketType::PowerState,
            Payload::GetBulbLabel => PacketType::GetBulbLabel,
            Payload::SetBulbLabel(_) => PacketType::SetBulbLabel,
            Payload::BulbLabel(_) => PacketType::BulbLabel,
            Payload::GetTags => PacketType::GetTags,
            Payload::SetTags(_) => PacketType::SetTags,
            Payload::Tags(_) => PacketType::Tags,
            Payload::GetTagLabels(_) => PacketType::GetTagLabels,
            Payload::SetTagLabels { .. } => PacketType::SetTagLabels,
            Payload::TagLabels { .. } => PacketType::TagLabels,
            Payload::Acknowledgement => PacketType::Acknowledgement,
            Payload::GetLightState => PacketType::GetLightState,
            Payload::SetLightColor { .. } => PacketType::SetLightColor,
            Payload::SetWaveform(_) => PacketType::SetWaveform,
            Payload::LightStatus(_) => PacketType::LightStatus,
        }
    }

    pub(crate) fn encode_into(&self, w: &mut Writer) {
        match self {
            Payload::GetPanGateway
            | Payload::GetPowerState
            | Payload::GetBulbLabel
            | Payload::GetTags
            | Payload::GetLightState
            | Payload::Acknowledgement => {}
            Payload::PanGateway { service, port } => {
                w.put_u8(*service);
                w.put_u32(*port);
            }
            Payload::SetPowerState(power) | Payload::PowerState(power) => {
                w.put_u16(power.to_wire())
            }
            Payload::SetBulbLabel(label) | Payload::BulbLabel(label) => w.put_label(label),
            Payload::SetTags(tags) | Payload::Tags(tags) | Payload::GetTagLabels(tags) => {
                w.put_u64(*tags)
            }
            Payload::SetTagLabels { tags, label } | Payload::TagLabels { tags, label } => {
                w.put_u64(*tags);
                w.put_label(label);
            }
            Payload::SetLightColor {
                stream,
                color,
                transition_ms,
            } => {
                w.put_u8(*stream);
                put_hsbk(w, color);
                w.put_u32(*transition_ms);
            }
            Payload::SetWaveform(params) => {
                w.put_u8(params.stream);
                w.put_u8(params.transient as u8);
                put_hsbk(w, &params.color);
                w.put_u32(params.period_ms);
                w.put_f32(params.cycles);
                w.put_i16(params.skew_ratio);
                w.put_u8(params.waveform.id());
            }
            Payload::LightStatus(status) => {
                put_hsbk(w, &status.color);
                w.put_i16(status.dim);
                w.put_u16(status.power.to_wire());
                w.put_label(&status.label);
                w.put_u64(status.tags);
            }
        }
    }

    pub(crate) fn decode_from(
        packet_type: PacketType,
        r: &mut Reader<'_>,
    ) -> Result<Self, DecodeError> {
        let payload = match packet_type {
            PacketType::GetPanGateway => Payload::GetPanGateway,
            PacketType::PanGateway => Payload::PanGateway {
                service: r.u8()?,
                port: r.u32()?,
            },
            PacketType::GetPowerState => Payload::GetPowerState,
            PacketType::SetPowerState => Payload::SetPowerState(PowerState::from_wire(r.u16()?)),
            PacketType::PowerState => Payload::PowerState(PowerState::from_wire(r.u16()?)),
            PacketType::GetBulbLabel => Payload::GetBulbLabel,
            PacketType::SetBulbLabel => Payload::SetBulbLabel(r.label()?),
            PacketType::BulbLabel => Payload::BulbLabel(r.label()?),
            PacketType::GetTags => Payload::GetTags,
            PacketType::SetTags => Payload::SetTags(r.u64()?),
            PacketType::Tags => Payload::Tags(r.u64()?),
            PacketType::GetTagLabels => Payload::GetTagLabels(r.u64()?),
            PacketType::SetTagLabels => Payload::SetTagLabels {
                tags: r.u64()?,
                label: r.label()?,
            },
            PacketType::TagLabels => Payload::TagLabels {
                tags: r.u64()?,
                label: r.label()?,
            },
            PacketType::Acknowledgement => Payload::Acknowledgement,
            PacketType::GetLightState => Payload::GetLightState,
            PacketType::SetLightColor => Payload::SetLightColor {
                stream: r.u8()?,
                color: get_hsbk(r)?,
                transition_ms: r.u32()?,
            },
            PacketType::SetWaveform => {
                let stream = r.u8()?;
                let transient = r.u8()? != 0;
                let color = get_hsbk(r)?;
                let period_ms = r.u32()?;
                let cycles = r.f32()?;
                let skew_ratio = r.i16()?;
                let raw = r.u8()?;
                let waveform = Waveform::create(raw).ok_or(DecodeError::InvalidValue {
                    field: "waveform",
                    value: raw as u64,
                })?;
                Payload::SetWaveform(WaveformParams {
                    stream,
                    transient,
                    color,
                    period_ms,
                    cycles,
                    skew_ratio,
                    waveform,
                })
            }
            PacketType::LightStatus => Payload::LightStatus(LightStatus {
                color: get_hsbk(r)?,
                dim: r.i16()?,
                power: PowerState::from_wire(r.u16()?),
                label: r.label()?,
                tags: r.u64()?,
            }),
        };
        Ok(payload)
    }
}

fn put_hsbk(w: &mut Writer, color: &Hsbk) {
    w.put_u16(color.hue);
    w.put_u16(color.saturation);
    w.put_u16(color.brightness);
    w.put_u16(color.kelvin);
}

fn get_hsbk(r: &mut Reader<'_>) -> Result<Hsbk, DecodeError> {
    Ok(Hsbk {
        hue: r.u16()?,
        saturation: r.u16()?,
        brightness: r.u16()?,
        kelvin: r.u16()?,
    })
}
