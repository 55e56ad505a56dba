//! Session coordination: one owner wiring the transport, the command
//! channel and the media pipeline together.

pub mod coordinator;

pub use coordinator::{SessionCoordinator, SessionEvent};
