use crate::pipeline::types::{CompressedUnit, DecodedFrame, pts_from_secs, video_time_base};
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::video::VideoDecoder;
use ac_ffmpeg::packet::PacketMut;
use anyhow::{Result, anyhow};
use std::collections::VecDeque;

/// H.264 decode session.
///
/// Created lazily by the pipeline on the first inbound unit: stream
/// parameters (SPS/PPS) ride in the bitstream itself, so nothing has to be
/// configured up front. The decoder uses hardware acceleration when the
/// FFmpeg build provides it and falls back to software otherwise.
pub struct DecodeSession {
    decoder: VideoDecoder,
    pending_pts: VecDeque<f64>,
}

unsafe impl Send for DecodeSession {}

impl DecodeSession {
    pub fn open() -> Result<Self> {
        let decoder = VideoDecoder::builder("h264")?
            .time_base(video_time_base())
            .build()?;

        Ok(Self {
            decoder,
            pending_pts: VecDeque::new(),
        })
    }

    /// Push one compressed unit and drain a decoded picture if one is ready.
    ///
    /// `Ok(None)` means the decoder is still buffering. An undecodable unit
    /// is an error for that unit only; the session stays usable for the
    /// units that follow it.
    pub fn decode(&mut self, unit: &CompressedUnit) -> Result<Option<DecodedFrame>> {
        let packet = PacketMut::from(unit.data.as_ref())
            .with_pts(pts_from_secs(unit.timestamp))
            .freeze();

        self.pending_pts.push_back(unit.timestamp);
        if let Err(e) = self.decoder.try_push(packet) {
            self.pending_pts.pop_back();
            return Err(anyhow!("cannot push access unit: {e}"));
        }

        match self.decoder.take() {
            Ok(Some(frame)) => {
                let timestamp = self.pending_pts.pop_front().unwrap_or(unit.timestamp);
                let w = frame.width();
                let h = frame.height();
                let data = packed_yuv420(&frame, w, h);

                Ok(Some(DecodedFrame {
                    data,
                    width: w as u32,
                    height: h as u32,
                    timestamp,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                // The oldest expectation died with this unit.
                self.pending_pts.pop_front();
                Err(anyhow!("decode failed: {e}"))
            }
        }
    }
}

/// Pack the decoder's possibly stride-padded planes into contiguous YUV420p:
/// Y (w*h), then U and V (w/2 * h/2 each).
fn packed_yuv420(frame: &ac_ffmpeg::codec::video::VideoFrame, w: usize, h: usize) -> Vec<u8> {
    let (cw, ch) = (w / 2, h / 2);
    let mut out = Vec::with_capacity(w * h + cw * ch * 2);
    let planes = frame.planes();
    for (i, (pw, ph)) in [(w, h), (cw, ch), (cw, ch)].into_iter().enumerate() {
        append_plane(&mut out, planes[i].data(), planes[i].line_size(), pw, ph);
    }
    out
}

fn append_plane(out: &mut Vec<u8>, src: &[u8], stride: usize, width: usize, height: usize) {
    if stride == width && src.len() >= width * height {
        out.extend_from_slice(&src[..width * height]);
        return;
    }
    for r in 0..height {
        let start = r * stride;
        if start + width > src.len() {
            break;
        }
        out.extend_from_slice(&src[start..start + width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_plane_without_padding() {
        let src = [1u8, 2, 3, 4];
        let mut out = Vec::new();
        append_plane(&mut out, &src, 2, 2, 2);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_append_plane_strips_stride_padding() {
        // 2x2 visible pixels in rows padded to 4 bytes
        let src = [1u8, 2, 9, 9, 3, 4, 9, 9];
        let mut out = Vec::new();
        append_plane(&mut out, &src, 4, 2, 2);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }
}
