//! Encode-path state management

use std::fmt;

/// Lifecycle of the encode path.
///
/// A pipeline whose encode session failed to open stays `Uninitialized`
/// forever: frame submissions become logged no-ops and nothing retries the
/// session. `TornDown` is terminal for every path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    /// No usable encode session exists.
    Uninitialized,

    /// Encode session is open and waiting for the first frame.
    Ready,

    /// Steady state: frames are being accepted.
    Encoding,

    /// Sessions have been invalidated; the pipeline is unusable.
    TornDown,
}

impl CodecState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &CodecState) -> bool {
        use CodecState::*;

        match (self, target) {
            // Session creation succeeded
            (Uninitialized, Ready) => true,

            // First frame accepted
            (Ready, Encoding) => true,

            // Teardown is legal from anywhere
            (Uninitialized, TornDown) => true,
            (Ready, TornDown) => true,
            (Encoding, TornDown) => true,

            // Terminal
            (TornDown, _) => false,

            // Self-transitions
            (a, b) if a == b => true,

            _ => false,
        }
    }

    /// Whether frame submissions are accepted in this state.
    pub fn accepts_frames(&self) -> bool {
        matches!(self, CodecState::Ready | CodecState::Encoding)
    }

    pub fn is_torn_down(&self) -> bool {
        matches!(self, CodecState::TornDown)
    }

    pub fn description(&self) -> &'static str {
        match self {
            CodecState::Uninitialized => "Uninitialized",
            CodecState::Ready => "Ready",
            CodecState::Encoding => "Encoding",
            CodecState::TornDown => "TornDown",
        }
    }
}

impl fmt::Display for CodecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
