//! Wire format of the three frame kinds.
//!
//! ```text
//! control: kind:1 | ack:1 |                     crc:4
//! data:    kind:1 | ack:1 | seq:1 | payload:N | crc:4
//! ```
//!
//! The CRC covers every preceding byte and is stored little-endian, so the
//! CRC computed over a whole intact frame is zero.

use crate::error::FrameError;
use bytes::{BufMut, Bytes, BytesMut};
use gbn_abstract::{PKT_LEN, Seq};

pub const CONTROL_HEADER_LEN: usize = 2;
pub const DATA_HEADER_LEN: usize = 3;
pub const CHECKSUM_LEN: usize = 4;
pub const MIN_FRAME_LEN: usize = CONTROL_HEADER_LEN + CHECKSUM_LEN;
pub const MAX_FRAME_LEN: usize = DATA_HEADER_LEN + PKT_LEN + CHECKSUM_LEN;

const CRC32_POLY: u32 = 0xEDB8_8320;

/// Reflected CRC-32 with zero initial value and no final XOR.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY
            } else {
                crc >> 1
            };
        }
    }
    crc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Data = 0,
    Ack = 1,
    Nak = 2,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameKind::Data),
            1 => Ok(FrameKind::Ack),
            2 => Ok(FrameKind::Nak),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

/// A decoded frame. `ack` is always the cumulative acknowledgment of the
/// sending station, whatever the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { seq: Seq, ack: Seq, payload: Bytes },
    Ack { ack: Seq },
    Nak { ack: Seq },
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data { .. } => FrameKind::Data,
            Frame::Ack { .. } => FrameKind::Ack,
            Frame::Nak { .. } => FrameKind::Nak,
        }
    }

    pub fn ack(&self) -> Seq {
        match self {
            Frame::Data { ack, .. } | Frame::Ack { ack } | Frame::Nak { ack } => *ack,
        }
    }

    pub fn seq(&self) -> Option<Seq> {
        match self {
            Frame::Data { seq, .. } => Some(*seq),
            _ => None,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Data { payload, .. } => DATA_HEADER_LEN + payload.len() + CHECKSUM_LEN,
            Frame::Ack { .. } | Frame::Nak { .. } => MIN_FRAME_LEN,
        }
    }
}

pub fn encode(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    buf.put_u8(frame.kind() as u8);
    buf.put_u8(frame.ack().get());
    if let Frame::Data { seq, payload, .. } = frame {
        buf.put_u8(seq.get());
        buf.put_slice(payload);
    }
    let crc = crc32(&buf);
    buf.put_u32_le(crc);
    buf.freeze()
}

pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
    if raw.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort {
            len: raw.len(),
            min: MIN_FRAME_LEN,
        });
    }
    let residue = crc32(raw);
    if residue != 0 {
        return Err(FrameError::ChecksumMismatch { residue });
    }

    let body = &raw[..raw.len() - CHECKSUM_LEN];
    let kind = FrameKind::try_from(body[0])?;
    let ack = Seq::new(body[1])?;
    match kind {
        FrameKind::Ack => Ok(Frame::Ack { ack }),
        FrameKind::Nak => Ok(Frame::Nak { ack }),
        FrameKind::Data => {
            let seq = *body.get(2).ok_or(FrameError::MissingSeq)?;
            let seq = Seq::new(seq)?;
            let payload = &body[DATA_HEADER_LEN..];
            if payload.len() > PKT_LEN {
                return Err(FrameError::PayloadTooLong {
                    len: payload.len(),
                    max: PKT_LEN,
                });
            }
            Ok(Frame::Data {
                seq,
                ack,
                payload: Bytes::copy_from_slice(payload),
            })
        }
    }
}
