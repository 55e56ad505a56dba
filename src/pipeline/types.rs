//! Value types flowing through the media pipeline.

use ac_ffmpeg::time::{TimeBase, Timestamp};
use bytes::Bytes;
use std::fmt;

/// Codec-internal clock rate. 90 kHz is the conventional video tick.
pub(crate) const VIDEO_CLOCK_HZ: i64 = 90_000;

pub(crate) fn video_time_base() -> TimeBase {
    TimeBase::new(1, VIDEO_CLOCK_HZ as i32)
}

/// Map wall-clock seconds onto the codec clock.
pub(crate) fn pts_from_secs(secs: f64) -> Timestamp {
    Timestamp::new(
        (secs * VIDEO_CLOCK_HZ as f64).round() as i64,
        video_time_base(),
    )
}

/// One captured frame handed to the encode path.
///
/// `data` is packed NV12: a full-resolution luminance plane followed by the
/// half-height interleaved chrominance plane, no stride padding. Ownership
/// passes to the pipeline for the duration of one submission; nothing is
/// retained afterwards.
#[derive(Clone)]
pub struct RawFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Wall-clock capture time, seconds since the Unix epoch.
    pub timestamp: f64,
}

impl RawFrame {
    /// Bytes a packed NV12 frame of the given size must carry.
    pub fn packed_len(width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        w * h + w * h / 2
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("size", &self.data.len())
            .finish()
    }
}

/// One encoder output chunk: an H.264 access unit plus its presentation
/// timestamp. Consumed by the transport (outbound) or fed back into the
/// decode path (inbound).
#[derive(Clone)]
pub struct CompressedUnit {
    pub data: Bytes,
    /// Presentation time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Whether the unit carries an IDR picture. Informational; consumers
    /// sequencing frames should use the timestamp.
    pub key_frame: bool,
}

impl fmt::Debug for CompressedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedUnit")
            .field("timestamp", &self.timestamp)
            .field("key_frame", &self.key_frame)
            .field("size", &self.data.len())
            .finish()
    }
}

/// One decoded picture leaving the decode path, packed YUV420p
/// (Y plane, then U, then V, stride padding stripped).
#[derive(Clone)]
pub struct DecodedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation time carried over from the compressed unit.
    pub timestamp: f64,
}

impl fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_len_is_one_and_a_half_planes() {
        assert_eq!(RawFrame::packed_len(640, 480), 640 * 480 * 3 / 2);
        assert_eq!(RawFrame::packed_len(2, 2), 6);
    }

    #[test]
    fn test_debug_omits_pixel_data() {
        let frame = RawFrame {
            data: Bytes::from(vec![0u8; 6]),
            width: 2,
            height: 2,
            timestamp: 1.5,
        };
        let rendered = format!("{frame:?}");
        assert!(rendered.contains("timestamp"));
        assert!(rendered.contains("size"));
    }
}
