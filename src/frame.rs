//! Frame codec (C1): build and parse Protocol V6 frames.
//!
//! Wire layout: `0xAA | cmd | seq | len_le(u16) | payload[len] | crc_le(u16)`.
//! The CRC covers `cmd || seq || len_le || payload` — the preamble itself is
//! not covered, matching the scanner's resync discipline (§4.2), which
//! re-enters the search for a preamble byte without knowing whether a
//! candidate frame's CRC will turn out to validate.
//!
//! The polynomial is a documented choice, not a given: see `SPEC_FULL.md` §9.
//! This implementation fixes CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF,
//! no reflection, no final xor).

use crc::{Crc, CRC_16_IBM_3740};

use crate::error::ProtocolError;

pub const PREAMBLE: u8 = 0xAA;
pub const HEADER_LEN: usize = 4; // cmd + seq + len_le(u16)
pub const CRC_LEN: usize = 2;
pub const MAX_PAYLOAD_LEN: usize = 4096;
pub const MAX_FRAME_SIZE: usize = 5120;

/// Minimum number of bytes needed before the header (cmd, seq, len) can be
/// read: preamble + header.
pub const MIN_HEADER_BYTES: usize = 1 + HEADER_LEN;

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

fn crc_of(cmd: u8, seq: u8, payload: &[u8]) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(&[cmd, seq]);
    digest.update(&(payload.len() as u16).to_le_bytes());
    digest.update(payload);
    digest.finalize()
}

/// A decoded frame: command id, sequence number, and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: u8,
    pub seq: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(cmd: u8, seq: u8, payload: impl Into<Vec<u8>>) -> Self {
        Frame { cmd, seq, payload: payload.into() }
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        1 + HEADER_LEN + self.payload.len() + CRC_LEN
    }
}

/// Build a frame into a freshly allocated buffer.
pub fn build(cmd: u8, seq: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge { len: payload.len(), max: MAX_PAYLOAD_LEN });
    }
    let mut out = Vec::with_capacity(1 + HEADER_LEN + payload.len() + CRC_LEN);
    build_into_vec(cmd, seq, payload, &mut out)?;
    Ok(out)
}

/// Build a frame into a caller-supplied buffer, avoiding an extra
/// allocation on the hot path.
pub fn build_into(cmd: u8, seq: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge { len: payload.len(), max: MAX_PAYLOAD_LEN });
    }
    let need = 1 + HEADER_LEN + payload.len() + CRC_LEN;
    if out.len() < need {
        return Err(ProtocolError::BufferTooSmall { have: out.len(), need });
    }

    out[0] = PREAMBLE;
    out[1] = cmd;
    out[2] = seq;
    out[3..5].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    out[5..5 + payload.len()].copy_from_slice(payload);
    let crc = crc_of(cmd, seq, payload);
    let crc_at = 5 + payload.len();
    out[crc_at..crc_at + CRC_LEN].copy_from_slice(&crc.to_le_bytes());
    Ok(need)
}

fn build_into_vec(cmd: u8, seq: u8, payload: &[u8], out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    out.push(PREAMBLE);
    out.push(cmd);
    out.push(seq);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    let crc = crc_of(cmd, seq, payload);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Decode one frame from `buf`. `buf` must contain *exactly* one frame
/// (preamble through CRC); this is a pure decoder, it does not scan for the
/// preamble or recover from garbage — that's the scanner's job (C2).
pub fn parse(buf: &[u8]) -> Result<Frame, ProtocolError> {
    if buf.is_empty() || buf[0] != PREAMBLE {
        return Err(ProtocolError::BadPreamble);
    }
    if buf.len() < MIN_HEADER_BYTES {
        return Err(ProtocolError::LengthMismatch { declared: 0, available: buf.len() });
    }
    let cmd = buf[1];
    let seq = buf[2];
    let len = u16::from_le_bytes([buf[3], buf[4]]) as usize;

    let need = 1 + HEADER_LEN + len + CRC_LEN;
    if buf.len() < need {
        return Err(ProtocolError::LengthMismatch { declared: len, available: buf.len() - MIN_HEADER_BYTES });
    }

    let payload = &buf[5..5 + len];
    let crc_bytes = &buf[5 + len..5 + len + CRC_LEN];
    let expected = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let actual = crc_of(cmd, seq, payload);
    if expected != actual {
        return Err(ProtocolError::CrcMismatch { expected, actual });
    }

    Ok(Frame { cmd, seq, payload: payload.to_vec() })
}
