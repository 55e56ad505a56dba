//! Media pipeline for telecam
//!
//! This module bridges raw captured frames to a compressed H.264 bitstream
//! and back, separating concerns between:
//! - Control/Coordination: the encode-path state machine and teardown rules
//! - Data Transport: channels feeding the codec worker threads
//! - Media Processing: the encode and decode sessions in `crate::encoder`
//!   and `crate::decoder`
//! - Wire format: the binary framing that keeps media units self-describing
//!
//! # Architecture
//!
//! Each codec session runs on its own worker thread and communicates via
//! channels; no pipeline call blocks the caller. Results are delivered
//! through a single event channel whose sender is gated, so teardown can
//! guarantee that no event fires after it returns.

pub mod framing;
pub mod media;
pub mod state;
pub mod types;

pub use media::{MediaError, MediaEvent, MediaPipeline};
pub use state::CodecState;
pub use types::{CompressedUnit, DecodedFrame, RawFrame};
