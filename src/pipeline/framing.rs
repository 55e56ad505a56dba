//! Wire framing for media units.
//!
//! Control messages travel as JSON text frames; media units travel as binary
//! frames wrapped in a small header so the presentation timestamp and
//! key-frame flag survive the trip:
//!
//! ```text
//! [0]      magic 0xCA
//! [1]      flags (bit 0: key frame)
//! [2..10]  f64 presentation timestamp, big-endian bit pattern
//! [10..]   H.264 access unit
//! ```

use super::types::CompressedUnit;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

const UNIT_MAGIC: u8 = 0xCA;
const FLAG_KEY_FRAME: u8 = 0x01;
const HEADER_LEN: usize = 10;

#[derive(Debug, Clone, Error)]
pub enum FramingError {
    #[error("media frame too short ({0} bytes)")]
    Truncated(usize),

    #[error("bad media frame magic {0:#04x}")]
    BadMagic(u8),
}

/// Wrap a compressed unit for transmission as one binary frame.
pub fn encode_unit(unit: &CompressedUnit) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + unit.data.len());
    buf.put_u8(UNIT_MAGIC);
    buf.put_u8(if unit.key_frame { FLAG_KEY_FRAME } else { 0 });
    buf.put_f64(unit.timestamp);
    buf.extend_from_slice(&unit.data);
    buf.freeze()
}

/// Parse one binary frame back into a compressed unit.
pub fn decode_unit(raw: &[u8]) -> Result<CompressedUnit, FramingError> {
    if raw.len() < HEADER_LEN {
        return Err(FramingError::Truncated(raw.len()));
    }
    if raw[0] != UNIT_MAGIC {
        return Err(FramingError::BadMagic(raw[0]));
    }
    let key_frame = raw[1] & FLAG_KEY_FRAME != 0;
    let mut ts_bits = [0u8; 8];
    ts_bits.copy_from_slice(&raw[2..10]);
    let timestamp = f64::from_be_bytes(ts_bits);

    Ok(CompressedUnit {
        data: Bytes::copy_from_slice(&raw[HEADER_LEN..]),
        timestamp,
        key_frame,
    })
}
