//! Configuration loading and management
//!
//! Everything comes from the environment with board-appropriate
//! defaults; the two speech service credentials are required. The
//! configuration is loaded and validated once at startup and never
//! mutated afterwards.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Credentials for one speech service instance
#[derive(Clone)]
pub struct ServiceCredentials {
    /// Service instance base URL
    pub url: String,
    /// IAM API key, sent as basic auth
    pub api_key: String,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // keep the key out of logs
        f.debug_struct("ServiceCredentials")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for the control server
    pub socket_path: PathBuf,

    /// Acknowledgement chime played when a turn starts
    pub chime_path: PathBuf,

    /// How long the microphone listens per turn
    pub listen_window: Duration,

    /// Blink period of the status led
    pub blink_interval: Duration,

    /// sysfs GPIO root
    pub gpio_base: PathBuf,

    /// Button input pin number
    pub button_pin: u32,

    /// Status led pin number
    pub led_pin: u32,

    /// ALSA capture device passed to arecord
    pub mic_device: String,

    /// Chime playback volume (0.0 - 1.0)
    pub playback_volume: f32,

    /// Instant answer endpoint
    pub search_url: String,

    /// Speech-to-text service
    pub stt: ServiceCredentials,

    /// Text-to-speech service
    pub tts: ServiceCredentials,
}

const DEFAULT_LISTEN_WINDOW_MS: u64 = 5000;
const DEFAULT_BLINK_INTERVAL_MS: u64 = 100;
const DEFAULT_BUTTON_PIN: u32 = 4;
const DEFAULT_LED_PIN: u32 = 6;
const DEFAULT_MIC_DEVICE: &str = "hw:2,0";
const DEFAULT_PLAYBACK_VOLUME: f32 = 0.25;
const DEFAULT_SEARCH_URL: &str = "https://api.duckduckgo.com/";

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("askbox");

        let socket_path = env_path("ASKBOX_SOCKET", data_dir.join("daemon.sock"));
        let chime_path = env_path("ASKBOX_CHIME", data_dir.join("chime.wav"));
        let gpio_base = env_path("ASKBOX_GPIO_BASE", PathBuf::from("/sys/class/gpio"));

        Ok(Self {
            socket_path,
            chime_path,
            listen_window: Duration::from_millis(env_u64(
                "ASKBOX_LISTEN_MS",
                DEFAULT_LISTEN_WINDOW_MS,
            )?),
            blink_interval: Duration::from_millis(env_u64(
                "ASKBOX_BLINK_MS",
                DEFAULT_BLINK_INTERVAL_MS,
            )?),
            gpio_base,
            button_pin: env_u32("ASKBOX_BUTTON_PIN", DEFAULT_BUTTON_PIN)?,
            led_pin: env_u32("ASKBOX_LED_PIN", DEFAULT_LED_PIN)?,
            mic_device: std::env::var("ASKBOX_MIC_DEVICE")
                .unwrap_or_else(|_| DEFAULT_MIC_DEVICE.to_string()),
            playback_volume: env_f32("ASKBOX_VOLUME", DEFAULT_PLAYBACK_VOLUME)?,
            search_url: std::env::var("ASKBOX_SEARCH_URL")
                .unwrap_or_else(|_| DEFAULT_SEARCH_URL.to_string()),
            stt: ServiceCredentials {
                url: require("ASKBOX_STT_URL")?,
                api_key: require("ASKBOX_STT_APIKEY")?,
            },
            tts: ServiceCredentials {
                url: require("ASKBOX_TTS_URL")?,
                api_key: require("ASKBOX_TTS_APIKEY")?,
            },
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} is not set"))
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    std::env::var(name).map(PathBuf::from).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be an integer")),
        Err(_) => Ok(default),
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be an integer")),
        Err(_) => Ok(default),
    }
}

fn env_f32(name: &str, default: f32) -> Result<f32> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a number")),
        Err(_) => Ok(default),
    }
}
