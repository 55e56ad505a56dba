//! Session coordinator
//!
//! The single owner of one transport session and one media pipeline. It is
//! the only component that talks to both against the same wire: connection
//! state gates media submission, inbound frames are routed by wire type
//! (text = control, binary = media), and everything the embedding
//! application cares about is relayed as a [`SessionEvent`].

use crate::config::VideoConfig;
use crate::control::{self, PanTiltCommand};
use crate::net::{Endpoint, TransportError, TransportEvent, TransportSession, WireMessage};
use crate::pipeline::framing;
use crate::pipeline::{DecodedFrame, MediaError, MediaEvent, MediaPipeline, RawFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Application-level events relayed to the embedding collaborator.
#[derive(Debug)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    /// A control-channel text message from the device.
    ControlMessage(String),
    /// A decoded remote picture, ready for display.
    FrameDecoded(DecodedFrame),
    TransportError(TransportError),
    MediaError(MediaError),
}

/// Owner and router for one device session.
///
/// Created once per application session; the media pipeline lives exactly
/// as long as the coordinator, while the transport can connect and
/// disconnect repeatedly underneath it.
pub struct SessionCoordinator {
    transport: Arc<TransportSession>,
    pipeline: Arc<MediaPipeline>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    /// Build the coordinator and hand back its event channel.
    pub fn new(video: VideoConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (transport, transport_rx) = TransportSession::new();
        let (pipeline, media_rx) = MediaPipeline::new(video.width, video.height);

        let transport = Arc::new(transport);
        let pipeline = Arc::new(pipeline);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        spawn_router(
            transport_rx,
            media_rx,
            Arc::clone(&transport),
            Arc::clone(&pipeline),
            Arc::clone(&connected),
            event_tx,
            cancel.clone(),
        );

        let coordinator = Self {
            transport,
            pipeline,
            connected,
            cancel,
        };
        (coordinator, event_rx)
    }

    /// Begin connecting to a device. Progress arrives as events.
    pub fn connect(&self, endpoint: &Endpoint) {
        self.transport.connect(endpoint);
    }

    /// Drop the device connection. The media pipeline stays alive so a
    /// later `connect` can resume streaming.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// Send one directional command, stamped with the current wall clock.
    ///
    /// Fire-and-forget: a command sent while disconnected surfaces as a
    /// `NotConnected` transport error event.
    pub fn pan_tilt(&self, command: PanTiltCommand) {
        let text = control::encode_command(command, control::now_timestamp());
        self.transport.send_text(text);
    }

    /// Submit one captured frame for encoding and transmission.
    ///
    /// Legal only while connected; frames submitted at any other time are
    /// dropped, since there is nowhere for their encoded units to go.
    pub fn submit_frame(&self, frame: RawFrame) {
        if !self.connected.load(Ordering::Relaxed) {
            log::debug!("SessionCoordinator: dropping frame while not connected");
            return;
        }
        self.pipeline.submit_frame(frame);
    }

    /// Ask the encoder for a keyframe on the next submitted frame.
    pub fn force_keyframe(&self) {
        self.pipeline.force_keyframe();
    }

    /// End the session: stop routing, drop the connection, tear down the
    /// media pipeline. The coordinator is unusable afterwards.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.transport.disconnect();
        self.pipeline.teardown();
        log::info!("SessionCoordinator: shut down");
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_router(
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut media_rx: mpsc::UnboundedReceiver<MediaEvent>,
    transport: Arc<TransportSession>,
    pipeline: Arc<MediaPipeline>,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                ev = transport_rx.recv() => {
                    let Some(ev) = ev else { break };
                    match ev {
                        TransportEvent::Connected => {
                            connected.store(true, Ordering::Relaxed);
                            // Give the remote end a clean stream start.
                            pipeline.force_keyframe();
                            let _ = events.send(SessionEvent::Connected);
                        }
                        TransportEvent::Disconnected => {
                            connected.store(false, Ordering::Relaxed);
                            let _ = events.send(SessionEvent::Disconnected);
                        }
                        TransportEvent::Message(WireMessage::Text(text)) => {
                            let _ = events.send(SessionEvent::ControlMessage(text));
                        }
                        TransportEvent::Message(WireMessage::Binary(payload)) => {
                            match framing::decode_unit(&payload) {
                                Ok(unit) => pipeline.decode(unit),
                                Err(e) => {
                                    let _ = events.send(SessionEvent::MediaError(
                                        MediaError::DecodeFailed(e.to_string()),
                                    ));
                                }
                            }
                        }
                        TransportEvent::Error(e) => {
                            let _ = events.send(SessionEvent::TransportError(e));
                        }
                    }
                }

                ev = media_rx.recv() => {
                    let Some(ev) = ev else { break };
                    match ev {
                        // Results that land after a disconnect are discarded:
                        // stale media belongs to a connection that no longer
                        // exists.
                        MediaEvent::EncodedUnit(unit) => {
                            if connected.load(Ordering::Relaxed) {
                                transport.send_binary(framing::encode_unit(&unit));
                            }
                        }
                        MediaEvent::FrameDecoded(frame) => {
                            if connected.load(Ordering::Relaxed) {
                                let _ = events.send(SessionEvent::FrameDecoded(frame));
                            }
                        }
                        MediaEvent::Error(e) => {
                            let _ = events.send(SessionEvent::MediaError(e));
                        }
                    }
                }
            }
        }
        log::debug!("SessionCoordinator: router stopped");
    });
}
