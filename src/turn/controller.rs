//! Core turn state machine
//!
//! Sequences the four stages of a turn (chime, listen, search, speak)
//! and guarantees exactly-once cleanup back to Idle on success and
//! failure alike. A trigger that arrives while a turn is active is
//! dropped, never queued.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::audio::{AudioSink, MicSource};
use crate::button::TriggerEvent;
use crate::events::{FailedStage, TurnEvent};
use crate::indicator::{Indicator, IndicatorMode};
use crate::search::{numword, SearchProvider};
use crate::speech::{Synthesizer, Transcriber};

/// Reply used when the listening window produced no transcript
const NOT_HEARD_REPLY: &str = "I'm sorry I didn't hear you.";

/// Reply spoken when any stage fails
const APOLOGY_REPLY: &str =
    "Oops, something went wrong and I was unable to complete your request.";

/// The five possible states of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for a trigger
    Idle,
    /// Acknowledgement chime is playing
    Playing,
    /// Microphone window is open
    Listening,
    /// Query is out to the search service
    Searching,
    /// Answer is being synthesized and spoken
    Speaking,
}

impl Default for TurnState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::Playing => write!(f, "Playing"),
            TurnState::Listening => write!(f, "Listening"),
            TurnState::Searching => write!(f, "Searching"),
            TurnState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Stage failures that abort a turn
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("chime playback failed: {0}")]
    Playback(String),

    #[error("listening failed: {0}")]
    Listen(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),
}

impl TurnError {
    fn stage(&self) -> FailedStage {
        match self {
            TurnError::Playback(_) => FailedStage::Playback,
            TurnError::Listen(_) => FailedStage::Listen,
            TurnError::Search(_) => FailedStage::Search,
            TurnError::Synthesis(_) => FailedStage::Synthesis,
        }
    }
}

/// Everything the controller delegates to
pub struct Collaborators {
    pub indicator: Arc<dyn Indicator>,
    pub sink: Arc<dyn AudioSink>,
    pub mic: Arc<dyn MicSource>,
    pub transcriber: Arc<dyn Transcriber>,
    pub search: Arc<dyn SearchProvider>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// One in-flight trigger-to-response cycle
#[derive(Debug, Default)]
struct Turn {
    transcript: Option<String>,
    answer: Option<String>,
}

/// The state machine sequencing each turn
pub struct TurnController {
    state: TurnState,
    chime: PathBuf,
    listen_window: Duration,
    blink_interval: Duration,
    collab: Collaborators,
    event_tx: broadcast::Sender<TurnEvent>,
}

impl TurnController {
    /// Create a new controller in the Idle state
    pub fn new(
        chime: PathBuf,
        listen_window: Duration,
        blink_interval: Duration,
        collab: Collaborators,
        event_tx: broadcast::Sender<TurnEvent>,
    ) -> Self {
        Self {
            state: TurnState::Idle,
            chime,
            listen_window,
            blink_interval,
            collab,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Run the controller, processing triggers until the channel closes
    pub async fn run(&mut self, mut trigger_rx: mpsc::Receiver<TriggerEvent>) {
        info!("turn controller started in Idle state");

        while let Some(trigger) = trigger_rx.recv().await {
            debug!(?trigger, "trigger received");
            self.on_trigger().await;

            // Triggers that piled up during the turn are dropped, not
            // queued
            let mut dropped = 0usize;
            while trigger_rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "stale triggers dropped");
            }
        }

        info!("turn controller stopped");
    }

    /// Process one trigger. A no-op while a turn is already active.
    pub async fn on_trigger(&mut self) {
        if self.state != TurnState::Idle {
            debug!(state = %self.state, "trigger ignored, turn in progress");
            return;
        }

        let started = Instant::now();
        let mut turn = Turn::default();
        let result = self.advance(&mut turn).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let event = match result {
            Ok(()) => {
                info!(
                    transcript = turn.transcript.as_deref().unwrap_or(""),
                    answer = turn.answer.as_deref().unwrap_or(""),
                    duration_ms,
                    "turn completed"
                );
                TurnEvent::TurnCompleted { duration_ms }
            }
            Err(err) => {
                warn!(error = %err, duration_ms, "turn aborted");
                self.apologize().await;
                TurnEvent::TurnFailed {
                    stage: err.stage(),
                    duration_ms,
                }
            }
        };

        self.transition_to(TurnState::Idle);
        let _ = self.event_tx.send(event);
    }

    /// Drive the four stages in order, stopping at the first failure
    async fn advance(&mut self, turn: &mut Turn) -> Result<(), TurnError> {
        self.transition_to(TurnState::Playing);
        self.collab
            .sink
            .play_file(&self.chime)
            .await
            .map_err(|e| TurnError::Playback(e.to_string()))?;

        self.transition_to(TurnState::Listening);
        let recording = self
            .collab
            .mic
            .record(self.listen_window)
            .await
            .map_err(|e| TurnError::Listen(e.to_string()))?;
        let transcript = self
            .collab
            .transcriber
            .transcribe(&recording)
            .await
            .map_err(|e| TurnError::Listen(e.to_string()))?;
        turn.transcript = Some(transcript.clone());

        self.transition_to(TurnState::Searching);
        let answer = if transcript.is_empty() {
            // Nothing heard: no point asking the search service
            NOT_HEARD_REPLY.to_string()
        } else {
            let query = numword::normalize(&transcript);
            info!(query = %query, "searching");
            let result = self
                .collab
                .search
                .instant_answer(&query)
                .await
                .map_err(|e| TurnError::Search(e.to_string()))?;
            result.reply(&query)
        };
        turn.answer = Some(answer.clone());

        self.transition_to(TurnState::Speaking);
        if !answer.is_empty() {
            let wav = self
                .collab
                .synthesizer
                .synthesize(&answer)
                .await
                .map_err(|e| TurnError::Synthesis(e.to_string()))?;
            self.collab
                .sink
                .play_wav(wav)
                .await
                .map_err(|e| TurnError::Synthesis(e.to_string()))?;
        }

        Ok(())
    }

    /// Speak the fixed apology. Cleanup must finish, so failures here
    /// are logged and swallowed.
    async fn apologize(&self) {
        match self.collab.synthesizer.synthesize(APOLOGY_REPLY).await {
            Ok(wav) => {
                if let Err(e) = self.collab.sink.play_wav(wav).await {
                    warn!(error = %e, "apology playback failed");
                }
            }
            Err(e) => warn!(error = %e, "apology synthesis failed"),
        }
    }

    /// Move to a new state, re-aim the indicator, and announce the
    /// stage on the event channel
    fn transition_to(&mut self, new_state: TurnState) {
        let old_state = self.state;
        self.state = new_state;
        self.collab.indicator.set(indicator_mode(new_state, self.blink_interval));

        if old_state != new_state {
            info!(from = %old_state, to = %new_state, "state transition");
        }

        let event = match new_state {
            // Completion events carry the outcome and are sent by the
            // caller
            TurnState::Idle => return,
            TurnState::Playing => TurnEvent::TurnStarted,
            TurnState::Listening => TurnEvent::ListeningStarted,
            TurnState::Searching => TurnEvent::SearchingStarted,
            TurnState::Speaking => TurnEvent::SpeakingStarted,
        };
        let _ = self.event_tx.send(event);
    }
}

/// The indicator is a pure function of turn state: blinking while the
/// device is working on the request, dark otherwise (audio output is
/// the feedback while playing or speaking)
fn indicator_mode(state: TurnState, blink_interval: Duration) -> IndicatorMode {
    match state {
        TurnState::Idle | TurnState::Playing | TurnState::Speaking => IndicatorMode::Off,
        TurnState::Listening | TurnState::Searching => IndicatorMode::Blink(blink_interval),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::audio::AudioError;
    use crate::search::{InstantAnswer, SearchError};
    use crate::speech::SpeechError;

    /// Shared call log inspected by the assertions
    #[derive(Default)]
    struct CallLog {
        chimes: AtomicUsize,
        wavs_played: AtomicUsize,
        recordings: AtomicUsize,
        searches: Mutex<Vec<String>>,
        synthesized: Mutex<Vec<String>>,
        indicator: Mutex<Vec<IndicatorMode>>,
    }

    impl CallLog {
        fn last_indicator(&self) -> Option<IndicatorMode> {
            self.indicator.lock().unwrap().last().copied()
        }
    }

    struct MockIndicator(Arc<CallLog>);

    impl Indicator for MockIndicator {
        fn set(&self, mode: IndicatorMode) {
            self.0.indicator.lock().unwrap().push(mode);
        }
    }

    struct MockSink {
        log: Arc<CallLog>,
        fail_chime: bool,
        fail_wav: bool,
    }

    #[async_trait]
    impl AudioSink for MockSink {
        async fn play_file(&self, _path: &Path) -> Result<(), AudioError> {
            self.log.chimes.fetch_add(1, Ordering::SeqCst);
            if self.fail_chime {
                return Err(AudioError::Pipe(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no sink",
                )));
            }
            Ok(())
        }

        async fn play_wav(&self, _wav: Vec<u8>) -> Result<(), AudioError> {
            self.log.wavs_played.fetch_add(1, Ordering::SeqCst);
            if self.fail_wav {
                return Err(AudioError::Pipe(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no sink",
                )));
            }
            Ok(())
        }
    }

    struct MockMic {
        log: Arc<CallLog>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl MicSource for MockMic {
        async fn record(&self, _window: Duration) -> Result<Vec<u8>, AudioError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.log.recordings.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AudioError::Pipe(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no mic",
                )));
            }
            Ok(vec![0u8; 16])
        }
    }

    struct MockTranscriber {
        transcript: String,
        fail: bool,
    }

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(&self, _wav: &[u8]) -> Result<String, SpeechError> {
            if self.fail {
                return Err(SpeechError::Api {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.transcript.clone())
        }
    }

    struct MockSearch {
        log: Arc<CallLog>,
        result: InstantAnswer,
        fail: bool,
    }

    #[async_trait]
    impl SearchProvider for MockSearch {
        async fn instant_answer(&self, query: &str) -> Result<InstantAnswer, SearchError> {
            self.log.searches.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(SearchError::Api {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                });
            }
            Ok(self.result.clone())
        }
    }

    struct MockSynthesizer {
        log: Arc<CallLog>,
        fail: bool,
    }

    #[async_trait]
    impl Synthesizer for MockSynthesizer {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
            self.log.synthesized.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(SpeechError::Api {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "unavailable".to_string(),
                });
            }
            Ok(vec![0u8; 16])
        }
    }

    /// Per-test failure and canned-data switches
    #[derive(Default)]
    struct Fixture {
        transcript: String,
        result: InstantAnswer,
        fail_chime: bool,
        fail_mic: bool,
        fail_stt: bool,
        fail_search: bool,
        fail_tts: bool,
        mic_delay: Duration,
    }

    fn controller_with(
        fixture: Fixture,
    ) -> (
        TurnController,
        Arc<CallLog>,
        broadcast::Receiver<TurnEvent>,
    ) {
        let log = Arc::new(CallLog::default());
        let collab = Collaborators {
            indicator: Arc::new(MockIndicator(Arc::clone(&log))),
            sink: Arc::new(MockSink {
                log: Arc::clone(&log),
                fail_chime: fixture.fail_chime,
                fail_wav: false,
            }),
            mic: Arc::new(MockMic {
                log: Arc::clone(&log),
                delay: fixture.mic_delay,
                fail: fixture.fail_mic,
            }),
            transcriber: Arc::new(MockTranscriber {
                transcript: fixture.transcript,
                fail: fixture.fail_stt,
            }),
            search: Arc::new(MockSearch {
                log: Arc::clone(&log),
                result: fixture.result,
                fail: fixture.fail_search,
            }),
            synthesizer: Arc::new(MockSynthesizer {
                log: Arc::clone(&log),
                fail: fixture.fail_tts,
            }),
        };

        let (event_tx, event_rx) = broadcast::channel(64);
        let controller = TurnController::new(
            PathBuf::from("/tmp/chime.wav"),
            Duration::from_millis(10),
            Duration::from_millis(100),
            collab,
            event_tx,
        );
        (controller, log, event_rx)
    }

    fn drain_events(rx: &mut broadcast::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_initial_state_is_idle() {
        let (controller, _, _) = controller_with(Fixture::default());
        assert_eq!(controller.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_successful_turn_end_to_end() {
        let (mut controller, log, mut event_rx) = controller_with(Fixture {
            transcript: "two plus two".to_string(),
            result: InstantAnswer {
                answer: "4".to_string(),
                ..InstantAnswer::default()
            },
            ..Fixture::default()
        });

        controller.on_trigger().await;

        assert_eq!(controller.state(), TurnState::Idle);
        assert_eq!(log.chimes.load(Ordering::SeqCst), 1);
        assert_eq!(log.recordings.load(Ordering::SeqCst), 1);
        // The transcript was normalized before the search went out
        assert_eq!(*log.searches.lock().unwrap(), vec!["2 plus 2".to_string()]);
        assert_eq!(*log.synthesized.lock().unwrap(), vec!["4".to_string()]);
        assert_eq!(log.wavs_played.load(Ordering::SeqCst), 1);
        assert_eq!(log.last_indicator(), Some(IndicatorMode::Off));

        let events = drain_events(&mut event_rx);
        assert!(matches!(events[0], TurnEvent::TurnStarted));
        assert!(matches!(events[1], TurnEvent::ListeningStarted));
        assert!(matches!(events[2], TurnEvent::SearchingStarted));
        assert!(matches!(events[3], TurnEvent::SpeakingStarted));
        assert!(matches!(events[4], TurnEvent::TurnCompleted { .. }));
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_transcript_skips_search() {
        let (mut controller, log, _event_rx) = controller_with(Fixture {
            transcript: String::new(),
            ..Fixture::default()
        });

        controller.on_trigger().await;

        assert!(log.searches.lock().unwrap().is_empty());
        assert_eq!(
            *log.synthesized.lock().unwrap(),
            vec![NOT_HEARD_REPLY.to_string()]
        );
        assert_eq!(controller.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_stt_failure_speaks_apology_once() {
        let (mut controller, log, mut event_rx) = controller_with(Fixture {
            fail_stt: true,
            ..Fixture::default()
        });

        controller.on_trigger().await;

        assert_eq!(controller.state(), TurnState::Idle);
        assert_eq!(log.last_indicator(), Some(IndicatorMode::Off));
        assert!(log.searches.lock().unwrap().is_empty());
        assert_eq!(
            *log.synthesized.lock().unwrap(),
            vec![APOLOGY_REPLY.to_string()]
        );

        let events = drain_events(&mut event_rx);
        assert!(matches!(
            events.last(),
            Some(TurnEvent::TurnFailed {
                stage: FailedStage::Listen,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_search_failure_speaks_apology() {
        let (mut controller, log, mut event_rx) = controller_with(Fixture {
            transcript: "what is rust".to_string(),
            fail_search: true,
            ..Fixture::default()
        });

        controller.on_trigger().await;

        assert_eq!(controller.state(), TurnState::Idle);
        assert_eq!(
            *log.synthesized.lock().unwrap(),
            vec![APOLOGY_REPLY.to_string()]
        );

        let events = drain_events(&mut event_rx);
        assert!(matches!(
            events.last(),
            Some(TurnEvent::TurnFailed {
                stage: FailedStage::Search,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_chime_failure_aborts_before_listening() {
        let (mut controller, log, mut event_rx) = controller_with(Fixture {
            fail_chime: true,
            ..Fixture::default()
        });

        controller.on_trigger().await;

        assert_eq!(controller.state(), TurnState::Idle);
        assert_eq!(log.recordings.load(Ordering::SeqCst), 0);

        let events = drain_events(&mut event_rx);
        assert!(matches!(
            events.last(),
            Some(TurnEvent::TurnFailed {
                stage: FailedStage::Playback,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_synthesis_failure_cleanup_swallows_apology_error() {
        let (mut controller, log, _event_rx) = controller_with(Fixture {
            transcript: "what is rust".to_string(),
            result: InstantAnswer {
                answer: "a language".to_string(),
                ..InstantAnswer::default()
            },
            fail_tts: true,
            ..Fixture::default()
        });

        // The answer synthesis fails, then the apology synthesis fails
        // too; the controller must still come to rest in Idle
        controller.on_trigger().await;

        assert_eq!(controller.state(), TurnState::Idle);
        assert_eq!(log.last_indicator(), Some(IndicatorMode::Off));
        assert_eq!(
            *log.synthesized.lock().unwrap(),
            vec!["a language".to_string(), APOLOGY_REPLY.to_string()]
        );
    }

    #[tokio::test]
    async fn test_trigger_ignored_while_turn_active() {
        let (mut controller, log, _event_rx) = controller_with(Fixture::default());

        controller.state = TurnState::Searching;
        controller.on_trigger().await;

        // No stage ran and the state did not change
        assert_eq!(controller.state(), TurnState::Searching);
        assert_eq!(log.chimes.load(Ordering::SeqCst), 0);
        assert!(log.synthesized.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_triggers_during_turn_are_dropped() {
        let (mut controller, log, _event_rx) = controller_with(Fixture {
            transcript: "hello".to_string(),
            mic_delay: Duration::from_millis(100),
            ..Fixture::default()
        });

        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            controller.run(trigger_rx).await;
        });

        // Three rapid presses: only the first starts a turn
        trigger_tx.send(TriggerEvent::Button).await.unwrap();
        trigger_tx.send(TriggerEvent::Button).await.unwrap();
        trigger_tx.send(TriggerEvent::Remote).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(log.chimes.load(Ordering::SeqCst), 1);

        // Once idle again, a fresh press starts a fresh turn
        trigger_tx.send(TriggerEvent::Button).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(log.chimes.load(Ordering::SeqCst), 2);

        drop(trigger_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_resting_state_is_identical_after_each_turn() {
        let (mut controller, log, _event_rx) = controller_with(Fixture {
            transcript: "hello".to_string(),
            ..Fixture::default()
        });

        for _ in 0..3 {
            controller.on_trigger().await;
            assert_eq!(controller.state(), TurnState::Idle);
            assert_eq!(log.last_indicator(), Some(IndicatorMode::Off));
        }
        assert_eq!(log.chimes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_search_result_priority_reaches_speech() {
        let (mut controller, log, _event_rx) = controller_with(Fixture {
            transcript: "define ambivalence".to_string(),
            result: InstantAnswer {
                answer: String::new(),
                definition: "mixed feelings".to_string(),
                abstract_text: "something longer".to_string(),
            },
            ..Fixture::default()
        });

        controller.on_trigger().await;

        assert_eq!(
            *log.synthesized.lock().unwrap(),
            vec!["mixed feelings".to_string()]
        );
    }
}
