//! askbox-daemon: push-button voice assistant for embedded Linux boards
//!
//! One button press runs one conversational turn:
//! chime -> record -> transcribe -> search -> speak, with an LED
//! tracking progress. The daemon provides:
//! - GPIO button trigger with debounce
//! - Explicit turn state machine with busy-drop admission control
//! - Cloud speech-to-text / text-to-speech clients
//! - Instant answer search with spelled-out-number normalization
//! - Control socket for status, event subscription, and software
//!   triggers

mod audio;
mod button;
mod config;
mod events;
mod gpio;
mod indicator;
mod ipc;
mod lifecycle;
mod search;
mod speech;
mod turn;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::{ArecordSource, GstPlayer};
use crate::button::ButtonListener;
use crate::config::Config;
use crate::events::TurnEvent;
use crate::gpio::{Direction, SysfsPin};
use crate::indicator::{GpioLed, Indicator, IndicatorMode, NullIndicator};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::search::DuckDuckGo;
use crate::speech::{WatsonStt, WatsonTts};
use crate::turn::{Collaborators, TurnController};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "askbox-daemon starting");

    // Load configuration
    let config = Config::load()?;
    info!(?config.socket_path, "configuration loaded");

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new()?;

    // Create channels for inter-component communication
    // Trigger sources -> turn controller
    let (trigger_tx, trigger_rx) = mpsc::channel(32);
    // Turn controller -> control server and subscribed clients
    let (event_tx, _event_rx) = broadcast::channel::<TurnEvent>(64);

    // Status led; a missing pin downgrades to a silent indicator
    let indicator: Arc<dyn Indicator> =
        match SysfsPin::open(&config.gpio_base, config.led_pin, Direction::Out) {
            Ok(pin) => Arc::new(GpioLed::new(pin)),
            Err(e) => {
                warn!(error = %e, pin = config.led_pin, "led unavailable, continuing without indicator");
                Arc::new(NullIndicator)
            }
        };
    indicator.set(IndicatorMode::Off);

    // Wire the collaborators into the turn controller
    let collaborators = Collaborators {
        indicator: Arc::clone(&indicator),
        sink: Arc::new(GstPlayer::new(config.playback_volume)),
        mic: Arc::new(ArecordSource::new(config.mic_device.clone())),
        transcriber: Arc::new(WatsonStt::new(&config.stt)),
        search: Arc::new(DuckDuckGo::new(config.search_url.clone())),
        synthesizer: Arc::new(WatsonTts::new(&config.tts)),
    };

    let mut controller = TurnController::new(
        config.chime_path.clone(),
        config.listen_window,
        config.blink_interval,
        collaborators,
        event_tx.clone(),
    );

    // Physical button; the daemon still works through the control
    // socket when the pin cannot be opened
    let mut button_available = false;
    let button_listener =
        match SysfsPin::open(&config.gpio_base, config.button_pin, Direction::In) {
            Ok(pin) => {
                let listener = ButtonListener::new(pin, trigger_tx.clone());
                match listener.start() {
                    Ok(()) => {
                        info!("button listener started");
                        button_available = true;
                        Some(listener)
                    }
                    Err(e) => {
                        error!(error = %e, "failed to start button listener");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, pin = config.button_pin, "button unavailable, use the control socket to trigger");
                None
            }
        };

    // Create the control server
    let server = Server::new(&config.socket_path, trigger_tx.clone(), event_tx.clone())?;
    server.set_button_available(button_available).await;

    // Subscribe to turn events for status synchronization
    let mut status_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the turn controller (processes triggers)
        _ = controller.run(trigger_rx) => {
            info!("turn controller exited");
        }

        // Run the control server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "control server error");
            }
        }

        // Keep the server's status view in step with the controller
        _ = async {
            loop {
                match status_event_rx.recv().await {
                    Ok(event) => server_for_events.apply_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "status event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("status event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    if let Some(listener) = &button_listener {
        listener.stop();
    }
    server.shutdown().await;
    indicator.set(IndicatorMode::Off);

    info!("askbox-daemon stopped");

    Ok(())
}
