//! Button polling loop
//!
//! sysfs has no event interface for plain GPIO inputs, so the listener
//! samples the pin level from a dedicated thread, detects rising
//! edges, and applies a debounce window before forwarding a trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::gpio::SysfsPin;

/// Events sent from a trigger source to the turn controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// The physical button was pressed
    Button,
    /// A trigger was injected through the control socket
    Remote,
}

/// How often the pin level is sampled
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Presses within this window of the previous press are ignored
const DEBOUNCE: Duration = Duration::from_millis(150);

/// Watches the button pin and reports debounced presses
pub struct ButtonListener {
    event_tx: mpsc::Sender<TriggerEvent>,
    pin: SysfsPin,
    running: Arc<AtomicBool>,
}

/// Errors that can occur in the button listener
#[derive(Debug, thiserror::Error)]
pub enum ButtonError {
    #[error("button listener is already running")]
    AlreadyRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

impl ButtonListener {
    /// Create a new button listener
    pub fn new(pin: SysfsPin, event_tx: mpsc::Sender<TriggerEvent>) -> Self {
        Self {
            event_tx,
            pin,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the polling thread. The listener runs until `stop()` is
    /// called or the trigger channel closes.
    pub fn start(&self) -> Result<(), ButtonError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ButtonError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let pin = self.pin.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("button-listener".to_string())
            .spawn(move || {
                info!("button listener thread started");
                poll_loop(&pin, &event_tx, &running);
                running.store(false, Ordering::SeqCst);
                info!("button listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                ButtonError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    /// Stop the listener; the thread exits on its next poll.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Sample the pin until stopped, reporting debounced rising edges
fn poll_loop(pin: &SysfsPin, event_tx: &mpsc::Sender<TriggerEvent>, running: &AtomicBool) {
    // A button held at startup must not fire a trigger
    let mut last_level = pin.read().unwrap_or(false);
    let mut last_press: Option<Instant> = None;

    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let level = match pin.read() {
            Ok(level) => level,
            Err(e) => {
                warn!(error = %e, "button pin read failed");
                continue;
            }
        };

        let rising = level && !last_level;
        last_level = level;
        if !rising {
            continue;
        }

        if let Some(pressed_at) = last_press {
            if pressed_at.elapsed() < DEBOUNCE {
                debug!("button bounce ignored");
                continue;
            }
        }
        last_press = Some(Instant::now());

        debug!("button press detected");
        if event_tx.blocking_send(TriggerEvent::Button).is_err() {
            warn!("trigger channel closed, stopping button listener");
            break;
        }
    }
}
