//! Text-to-speech over the synthesize endpoint

use async_trait::async_trait;
use tracing::debug;

use crate::config::ServiceCredentials;

use super::SpeechError;

/// Turns answer text into playable audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize text into WAV bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

/// Watson text-to-speech client
pub struct WatsonTts {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl WatsonTts {
    pub fn new(credentials: &ServiceCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/v1/synthesize", credentials.url.trim_end_matches('/')),
            api_key: credentials.api_key.clone(),
        }
    }
}

#[async_trait]
impl Synthesizer for WatsonTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        debug!(chars = text.len(), "synthesizing");

        let response = self
            .client
            .post(&self.url)
            .basic_auth("apikey", Some(&self.api_key))
            .header("Accept", "audio/wav")
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api { status, body });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_building() {
        let credentials = ServiceCredentials {
            url: "https://api.example.com/instances/abc/".to_string(),
            api_key: "key".to_string(),
        };
        let tts = WatsonTts::new(&credentials);
        assert_eq!(tts.url, "https://api.example.com/instances/abc/v1/synthesize");
    }
}
