//! LED status indicator
//!
//! The indicator takes a single `set` command; blinking runs on a
//! background task owned by the indicator, and any later `set` aborts
//! it first. Pin write failures are logged and swallowed so a broken
//! LED can never abort a turn.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::gpio::SysfsPin;

/// What the LED should be doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    Off,
    On,
    Blink(Duration),
}

/// Status light commanded by the turn controller
pub trait Indicator: Send + Sync {
    fn set(&self, mode: IndicatorMode);
}

/// LED wired to a sysfs GPIO pin
pub struct GpioLed {
    pin: SysfsPin,
    blinker: Mutex<Option<JoinHandle<()>>>,
}

impl GpioLed {
    pub fn new(pin: SysfsPin) -> Self {
        Self {
            pin,
            blinker: Mutex::new(None),
        }
    }

    fn drive(pin: &SysfsPin, high: bool) {
        if let Err(e) = pin.write(high) {
            warn!(error = %e, "failed to drive led pin");
        }
    }
}

impl Indicator for GpioLed {
    fn set(&self, mode: IndicatorMode) {
        // At most one blinker exists at a time
        if let Some(task) = self.blinker.lock().unwrap().take() {
            task.abort();
        }

        match mode {
            IndicatorMode::Off => Self::drive(&self.pin, false),
            IndicatorMode::On => Self::drive(&self.pin, true),
            IndicatorMode::Blink(interval) => {
                let pin = self.pin.clone();
                let task = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    let mut lit = true;
                    loop {
                        ticker.tick().await;
                        Self::drive(&pin, lit);
                        lit = !lit;
                    }
                });
                *self.blinker.lock().unwrap() = Some(task);
            }
        }
    }
}

/// Stand-in used when the LED pin is unavailable
pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn set(&self, _mode: IndicatorMode) {}
}
