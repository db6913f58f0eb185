//! Turn controller module
//!
//! A turn is one complete trigger-to-response cycle. The controller
//! is the single owner of turn state and the only writer of the
//! indicator.

mod controller;

pub use controller::{Collaborators, TurnController, TurnError, TurnState};
