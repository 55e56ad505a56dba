//! Directional pan/tilt command encoding.
//!
//! Pure protocol framing: turning a command into its JSON wire form is all
//! that happens here. Delivery is the transport session's job, and every
//! command is fire-and-forget — no acks, no retries, no ordering guarantee.
//! A dropped release message can leave the device moving, which is a known
//! hazard of the protocol rather than something this layer papers over.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Directional movement commands understood by the pan/tilt head.
///
/// Press/release button semantics map 1:1 onto these: a press produces one
/// directional command, a release produces one `Stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanTiltCommand {
    Up,
    Down,
    Left,
    Right,
    Stop,
}

impl PanTiltCommand {
    /// Exact, case-sensitive wire string.
    pub fn as_wire(&self) -> &'static str {
        match self {
            PanTiltCommand::Up => "UP",
            PanTiltCommand::Down => "DOWN",
            PanTiltCommand::Left => "LEFT",
            PanTiltCommand::Right => "RIGHT",
            PanTiltCommand::Stop => "STOP",
        }
    }
}

#[derive(Serialize)]
struct CommandMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    command: &'a str,
    timestamp: f64,
}

/// Encode a command into its JSON text frame.
///
/// `timestamp` is wall-clock seconds since the Unix epoch, captured by the
/// caller at encode time.
pub fn encode_command(command: PanTiltCommand, timestamp: f64) -> String {
    serde_json::to_string(&CommandMessage {
        kind: "panTilt",
        command: command.as_wire(),
        timestamp,
    })
    .unwrap_or_default()
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_fields_are_exact() {
        let text = encode_command(PanTiltCommand::Up, 100.0);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed["type"], "panTilt");
        assert_eq!(parsed["command"], "UP");
        assert_eq!(parsed["timestamp"].as_f64().unwrap(), 100.0);
    }

    #[test]
    fn test_fractional_timestamp_survives_round_trip() {
        let t = 1717000000.123;
        let text = encode_command(PanTiltCommand::Stop, t);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed["timestamp"].as_f64().unwrap(), t);
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(PanTiltCommand::Up.as_wire(), "UP");
        assert_eq!(PanTiltCommand::Down.as_wire(), "DOWN");
        assert_eq!(PanTiltCommand::Left.as_wire(), "LEFT");
        assert_eq!(PanTiltCommand::Right.as_wire(), "RIGHT");
        assert_eq!(PanTiltCommand::Stop.as_wire(), "STOP");
    }

    #[test]
    fn test_each_command_is_one_message() {
        // One encode call, one self-contained JSON object: no queueing state
        // leaks between calls.
        let a = encode_command(PanTiltCommand::Left, 1.0);
        let b = encode_command(PanTiltCommand::Left, 2.0);
        assert_ne!(a, b);
        assert!(serde_json::from_str::<serde_json::Value>(&a).is_ok());
        assert!(serde_json::from_str::<serde_json::Value>(&b).is_ok());
    }

    #[test]
    fn test_now_timestamp_is_recent() {
        let t = now_timestamp();
        // After 2020, before 2100: sanity band for a wall clock.
        assert!(t > 1_577_836_800.0 && t < 4_102_444_800.0);
    }
}
