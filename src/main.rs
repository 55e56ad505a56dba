use crate::config::{Config, app_name, version};
use crate::control::PanTiltCommand;
use crate::session::{SessionCoordinator, SessionEvent};
use clap::{Arg, ArgAction, Command};
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod control;
pub mod decoder;
pub mod encoder;
pub mod net;
pub mod pipeline;
pub mod session;

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("host")
                .value_name("HOST")
                .help("IP address or hostname of the camera device.")
                .required(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Device port (defaults to 8080).")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("probe")
                .long("probe")
                .help("Send an UP/STOP command pair after connecting.")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let host = matches
        .get_one::<String>("host")
        .cloned()
        .unwrap_or_default();
    let port = matches.get_one::<u16>("port").copied();
    let probe = matches.get_flag("probe");

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // invoke the default handler and exit the process
        orig_hook(panic_info);
        process::exit(105);
    }));

    let cancel = CancellationToken::new();

    // gracefully close the session when receiving SIGINT, SIGTERM, or SIGHUP
    let ctrlc_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        ctrlc_cancel.cancel();
    })
    .expect("Error setting Ctrl-C handler");

    run(Config::new(host, port), probe, cancel);
}

#[tokio::main]
async fn run(config: Config, probe: bool, cancel: CancellationToken) {
    let (coordinator, mut events) = SessionCoordinator::new(config.video);
    let coordinator = Arc::new(coordinator);

    log::info!("connecting to {}", config.endpoint);
    coordinator.connect(&config.endpoint);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("interrupted, closing session");
                break;
            }
            ev = events.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    SessionEvent::Connected => {
                        log::info!("connected to {}", config.endpoint);
                        if probe {
                            let coordinator = Arc::clone(&coordinator);
                            tokio::spawn(async move {
                                coordinator.pan_tilt(PanTiltCommand::Up);
                                tokio::time::sleep(Duration::from_millis(500)).await;
                                coordinator.pan_tilt(PanTiltCommand::Stop);
                            });
                        }
                    }
                    SessionEvent::Disconnected => {
                        log::info!("device closed the session");
                        break;
                    }
                    SessionEvent::ControlMessage(text) => {
                        log::info!("device says: {text}");
                    }
                    SessionEvent::FrameDecoded(frame) => {
                        log::info!(
                            "remote frame {}x{} @ {:.3}s",
                            frame.width,
                            frame.height,
                            frame.timestamp
                        );
                    }
                    SessionEvent::TransportError(e) => {
                        log::warn!("transport: {e}");
                    }
                    SessionEvent::MediaError(e) => {
                        log::warn!("media: {e}");
                    }
                }
            }
        }
    }

    coordinator.shutdown();
}
