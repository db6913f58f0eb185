//! Subprocess audio playback and capture
//!
//! Playback goes through a gst-launch-1.0 pipeline to the default
//! pulse sink; capture spawns arecord. Both are short-lived child
//! processes awaited to completion, so no audio library is linked
//! into the daemon.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const GST: &str = "gst-launch-1.0";
const ARECORD: &str = "arecord";

/// Errors from the audio child processes
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    Failed {
        command: &'static str,
        status: std::process::ExitStatus,
    },

    #[error("audio pipe error: {0}")]
    Pipe(#[from] std::io::Error),
}

/// Plays audio on the board's output device
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play a local WAV file to completion.
    async fn play_file(&self, path: &Path) -> Result<(), AudioError>;

    /// Play an in-memory WAV payload to completion.
    async fn play_wav(&self, wav: Vec<u8>) -> Result<(), AudioError>;
}

/// Records from the board's microphone
#[async_trait]
pub trait MicSource: Send + Sync {
    /// Record for the given window and return the WAV bytes.
    async fn record(&self, window: Duration) -> Result<Vec<u8>, AudioError>;
}

/// Playback through a gst-launch pipeline
pub struct GstPlayer {
    volume: f32,
}

impl GstPlayer {
    pub fn new(volume: f32) -> Self {
        Self { volume }
    }
}

#[async_trait]
impl AudioSink for GstPlayer {
    async fn play_file(&self, path: &Path) -> Result<(), AudioError> {
        debug!(path = %path.display(), "playing wav file");

        let status = Command::new(GST)
            .arg("filesrc")
            .arg(format!("location={}", path.display()))
            .args(["!", "wavparse", "!", "volume"])
            .arg(format!("volume={}", self.volume))
            .args(["!", "pulsesink"])
            .status()
            .await
            .map_err(|source| AudioError::Spawn {
                command: GST,
                source,
            })?;

        if !status.success() {
            return Err(AudioError::Failed {
                command: GST,
                status,
            });
        }
        Ok(())
    }

    async fn play_wav(&self, wav: Vec<u8>) -> Result<(), AudioError> {
        debug!(bytes = wav.len(), "playing wav stream");

        // fdsrc fd=0 makes the pipeline read the payload from stdin
        let mut child = Command::new(GST)
            .args(["fdsrc", "fd=0", "!", "wavparse", "!", "pulsesink"])
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| AudioError::Spawn {
                command: GST,
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&wav).await?;
            stdin.shutdown().await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(AudioError::Failed {
                command: GST,
                status,
            });
        }
        Ok(())
    }
}

/// Capture through arecord
pub struct ArecordSource {
    device: String,
}

impl ArecordSource {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

#[async_trait]
impl MicSource for ArecordSource {
    async fn record(&self, window: Duration) -> Result<Vec<u8>, AudioError> {
        // arecord takes whole seconds; a sub-second window still
        // records for one
        let secs = window.as_secs().max(1);
        debug!(device = %self.device, secs, "recording");

        let output = Command::new(ARECORD)
            .args(["-D", &self.device, "-t", "wav", "-f", "dat", "-d"])
            .arg(secs.to_string())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|source| AudioError::Spawn {
                command: ARECORD,
                source,
            })?;

        if !output.status.success() {
            return Err(AudioError::Failed {
                command: ARECORD,
                status: output.status,
            });
        }
        Ok(output.stdout)
    }
}
