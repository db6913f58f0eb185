//! GPIO push-button trigger source
//!
//! Polls the button pin from a dedicated thread and forwards debounced
//! press events to the turn controller.

mod listener;

pub use listener::{ButtonError, ButtonListener, TriggerEvent};
