use crate::pipeline::types::{CompressedUnit, RawFrame, pts_from_secs, video_time_base};
use ac_ffmpeg::codec::video::VideoEncoder;
use ac_ffmpeg::codec::{Encoder, video};
use ac_ffmpeg::time::TimeBase;
use anyhow::{Result, anyhow, bail};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Encoder fallback chain: hardware encoders first, libx264 as the software
/// floor. Tuned for a low-latency 640x480 camera feed around 1 Mbps with a
/// keyframe every 30 frames; B-frames stay disabled everywhere so output
/// order matches submission order.
const ENCODER_CHAIN: &[(&str, &[(&str, &str)])] = &[
    // NVIDIA NVENC
    (
        "h264_nvenc",
        &[
            ("preset", "p1"),
            ("tune", "ull"),
            ("zerolatency", "1"),
            ("rc", "cbr"),
            ("b", "1000000"),
            ("maxrate", "1500000"),
            ("bufsize", "2000000"),
            ("g", "30"),
            ("delay", "0"),
            ("forced-idr", "1"),
        ],
    ),
    // Intel Quick Sync Video
    (
        "h264_qsv",
        &[
            ("preset", "veryfast"),
            ("b", "1000000"),
            ("maxrate", "1500000"),
            ("bufsize", "2000000"),
            ("g", "30"),
            ("async_depth", "1"),
        ],
    ),
    // AMD AMF
    (
        "h264_amf",
        &[
            ("usage", "ultralowlatency"),
            ("quality", "speed"),
            ("b", "1000000"),
            ("maxrate", "1500000"),
            ("bufsize", "2000000"),
            ("rc", "cbr"),
            ("g", "30"),
        ],
    ),
    // CPU fallback, always available with a full FFmpeg build
    (
        "libx264",
        &[
            ("profile", "baseline"),
            ("preset", "ultrafast"),
            ("tune", "zerolatency"),
            ("b", "1000000"),
            ("maxrate", "1500000"),
            ("bufsize", "2000000"),
            ("keyint", "30"),
            ("bframes", "0"),
            ("threads", "0"),
        ],
    ),
];

/// H.264 encode session.
///
/// Wraps an FFmpeg encoder context picked from the fallback chain. The
/// session pairs every drained access unit with the submission timestamps it
/// was fed, so callers get wall-clock presentation times back without the
/// codec clock rounding them.
pub struct EncodeSession {
    encoder: VideoEncoder,
    time_base: TimeBase,
    w: usize,
    h: usize,
    pending_pts: VecDeque<f64>,
    pub force_idr: Arc<AtomicBool>,
    pub codec_name: String,
}

unsafe impl Send for EncodeSession {}

impl EncodeSession {
    /// Open an encode session for the given frame size.
    ///
    /// Odd dimensions are rounded up to the next even value, as required for
    /// 4:2:0 chroma subsampling. Returns an error when no encoder in the
    /// chain can be initialized; the caller decides what a dead encode path
    /// means for the rest of the pipeline.
    pub fn open(w: u32, h: u32) -> Result<Self> {
        let w = if w.is_multiple_of(2) { w } else { w + 1 } as usize;
        let h = if h.is_multiple_of(2) { h } else { h + 1 } as usize;
        let time_base = video_time_base();
        let pixel_format = video::frame::get_pixel_format("nv12");

        let (encoder, codec_name) = Self::try_create_encoder(w, h, time_base, pixel_format)?;
        log::info!("EncodeSession: using encoder {codec_name} at {w}x{h}");

        Ok(Self {
            encoder,
            time_base,
            w,
            h,
            pending_pts: VecDeque::new(),
            force_idr: Arc::new(AtomicBool::new(false)),
            codec_name,
        })
    }

    fn try_create_encoder(
        w: usize,
        h: usize,
        time_base: TimeBase,
        pixel_format: video::frame::PixelFormat,
    ) -> Result<(VideoEncoder, String)> {
        for (codec, options) in ENCODER_CHAIN {
            let mut builder = match VideoEncoder::builder(codec) {
                Ok(b) => b,
                Err(e) => {
                    log::debug!("EncodeSession: encoder {codec} not available, skipping: {e}");
                    continue;
                }
            };
            builder = builder
                .pixel_format(pixel_format)
                .width(w)
                .height(h)
                .time_base(time_base);
            for (k, v) in *options {
                builder = builder.set_option(k, v);
            }
            match builder.build() {
                Ok(enc) => return Ok((enc, codec.to_string())),
                Err(e) => {
                    log::debug!("EncodeSession: encoder {codec} failed to initialize: {e}");
                    continue;
                }
            }
        }
        Err(anyhow!(
            "no H.264 encoder available (is FFmpeg built with libx264?)"
        ))
    }

    /// Push one raw NV12 frame and drain whatever the encoder has ready.
    ///
    /// Returns `Ok(None)` while the encoder is still buffering. A returned
    /// unit carries the wall-clock timestamp of the frame it corresponds to
    /// and a key-frame flag detected from its NAL units.
    pub fn encode(&mut self, raw: &RawFrame) -> Result<Option<CompressedUnit>> {
        let expected = RawFrame::packed_len(self.w as u32, self.h as u32);
        if raw.data.len() < expected {
            bail!(
                "frame of {} bytes is short for {}x{} NV12 ({} expected)",
                raw.data.len(),
                self.w,
                self.h,
                expected
            );
        }

        let mut frame =
            video::VideoFrameMut::black(video::frame::get_pixel_format("nv12"), self.w, self.h)
                .with_time_base(self.time_base)
                .with_pts(pts_from_secs(raw.timestamp))
                .with_picture_type(self.next_picture_type());

        self.write_nv12_planes(&mut frame, &raw.data);

        self.pending_pts.push_back(raw.timestamp);
        self.encoder.push(frame.freeze())?;

        let mut out = Vec::with_capacity(16 * 1024);
        while let Some(packet) = self.encoder.take()? {
            out.extend_from_slice(packet.data());
        }
        if out.is_empty() {
            return Ok(None);
        }

        let timestamp = self.pending_pts.pop_front().unwrap_or(raw.timestamp);
        let key_frame = contains_idr(&out);
        Ok(Some(CompressedUnit {
            data: Bytes::from(out),
            timestamp,
            key_frame,
        }))
    }

    #[inline]
    fn next_picture_type(&self) -> video::frame::PictureType {
        if self.force_idr.swap(false, Ordering::Relaxed) {
            video::frame::PictureType::I
        } else {
            video::frame::PictureType::None
        }
    }

    /// Copy packed NV12 data into the encoder frame, honoring the frame's
    /// internal line size which may be padded past the visible width.
    fn write_nv12_planes(&self, frame: &mut video::VideoFrameMut, data: &[u8]) {
        let (w, h) = (self.w, self.h);
        let luma = &data[..w * h];
        let chroma = &data[w * h..w * h + w * h / 2];

        // Y plane (luminance): full size
        {
            let mut planes = frame.planes_mut();
            let y_plane = planes[0].data_mut();
            let y_line = y_plane.len() / h;
            copy_rows(luma, w, y_line, h, y_plane);
        }

        // UV plane (chrominance): half height for NV12
        {
            let mut planes = frame.planes_mut();
            let uv_plane = planes[1].data_mut();
            let uv_h = h / 2;
            let uv_line = uv_plane.len() / uv_h;
            copy_rows(chroma, w, uv_line, uv_h, uv_plane);
        }
    }
}

/// Row-by-row plane copy from a packed source into a possibly padded
/// destination. Collapses to one memcpy when the line sizes agree.
fn copy_rows(src: &[u8], src_line: usize, dst_line: usize, rows: usize, dst: &mut [u8]) {
    if src_line == dst_line {
        let total = src_line * rows;
        dst[..total].copy_from_slice(&src[..total]);
        return;
    }
    let width = src_line.min(dst_line);
    for r in 0..rows {
        let s = r * src_line;
        let d = r * dst_line;
        dst[d..d + width].copy_from_slice(&src[s..s + width]);
    }
}

/// Scan an H.264 Annex B stream for an IDR NAL unit (type 5). Handles both
/// 3- and 4-byte start codes.
pub(crate) fn contains_idr(data: &[u8]) -> bool {
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            let nal_start = if data[i + 2] == 1 {
                i + 3
            } else if data[i + 2] == 0 && i + 3 < data.len() && data[i + 3] == 1 {
                i + 4
            } else {
                i += 1;
                continue;
            };
            if nal_start < data.len() && data[nal_start] & 0x1F == 5 {
                return true;
            }
            i = nal_start;
        } else {
            i += 1;
        }
    }
    false
}
