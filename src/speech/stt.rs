//! Speech-to-text over the recognize endpoint

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ServiceCredentials;

use super::SpeechError;

/// Response shape of the recognize endpoint
#[derive(serde::Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognizeResult>,
}

#[derive(serde::Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternatives: Vec<RecognizeAlternative>,
}

#[derive(serde::Deserialize)]
struct RecognizeAlternative {
    #[serde(default)]
    transcript: String,
}

/// Converts a recorded WAV into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Best-effort transcription; an empty string means nothing was
    /// heard during the window.
    async fn transcribe(&self, wav: &[u8]) -> Result<String, SpeechError>;
}

/// Watson speech-to-text client
pub struct WatsonStt {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl WatsonStt {
    pub fn new(credentials: &ServiceCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/v1/recognize", credentials.url.trim_end_matches('/')),
            api_key: credentials.api_key.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for WatsonStt {
    async fn transcribe(&self, wav: &[u8]) -> Result<String, SpeechError> {
        debug!(bytes = wav.len(), "submitting recording");

        let response = self
            .client
            .post(&self.url)
            .basic_auth("apikey", Some(&self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api { status, body });
        }

        let result: RecognizeResponse = response.json().await?;
        let transcript = result
            .results
            .first()
            .and_then(|r| r.alternatives.first())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default();

        info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_extraction() {
        let json = r#"{
            "results": [
                { "alternatives": [ { "transcript": "two plus two ", "confidence": 0.93 } ] }
            ],
            "result_index": 0
        }"#;

        let response: RecognizeResponse = serde_json::from_str(json).unwrap();
        let transcript = response
            .results
            .first()
            .and_then(|r| r.alternatives.first())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default();
        assert_eq!(transcript, "two plus two");
    }

    #[test]
    fn test_empty_results_give_empty_transcript() {
        let response: RecognizeResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert!(response.results.first().is_none());

        // A missing results field decodes the same way
        let response: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert!(response.results.first().is_none());
    }
}
