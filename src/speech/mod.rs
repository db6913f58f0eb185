//! Watson speech service clients
//!
//! Thin HTTP clients for the recognize and synthesize endpoints.
//! Credentials are injected from configuration at startup and never
//! change afterwards.

mod stt;
mod tts;

pub use stt::{Transcriber, WatsonStt};
pub use tts::{Synthesizer, WatsonTts};

/// Errors from the speech services
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}
