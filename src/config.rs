use crate::net::{DEFAULT_DEVICE_PORT, Endpoint};

/// Video stream parameters for the encode session.
///
/// The defaults match the camera profile: 640x480 at roughly 1 Mbps with a
/// keyframe every 30 frames (the rate itself lives in the encoder options).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        VideoConfig {
            width: 640,
            height: 480,
        }
    }
}

/// Everything a session needs to come up: where to connect and how to
/// encode what the capture side hands us.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub video: VideoConfig,
}

impl Config {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Config {
            endpoint: Endpoint::new(host, port.unwrap_or(DEFAULT_DEVICE_PORT)),
            video: VideoConfig::default(),
        }
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
