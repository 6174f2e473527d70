// Motion session - Classifier, sequencer and synthesizer wired into one pipeline
// Runs per-frame classification and sequencing on the caller's thread and
// hands events to the synthesizer worker

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use super::trace::{FrameTrace, TraceWriter};
use crate::config::{default_midi_output_path, ConfigError, EngineConfig};
use crate::gesture::{ClassifierConfig, GestureClassifier, GestureIntent, HandPoseRecord};
use crate::sequencer::{MidiLogError, NoteEventSequencer, TimedEvent};
use crate::synth::{
    AudioSynthesizer, BackendError, PlaybackBackend, RodioBackend, SynthError, SynthSettings,
};
use crate::sync::{lock_or_recover, wall_clock_seconds};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session is not running")]
    NotRunning,

    #[error("Audio backend unavailable: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error(transparent)]
    MidiLog(#[from] MidiLogError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Receiver for user-facing status messages
pub trait StatusSink: Send + Sync {
    fn status(&self, message: &str);

    fn error(&self, message: &str) {
        self.status(message);
    }
}

/// Forwards status messages to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status(&self, message: &str) {
        log::info!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// Opens the playback device when a session starts
pub type BackendFactory =
    Box<dyn Fn(&EngineConfig) -> Result<Arc<dyn PlaybackBackend>, BackendError> + Send + Sync>;

/// Factory for the rodio output named in the config (or the default device)
pub fn rodio_backend_factory() -> BackendFactory {
    Box::new(
        |config: &EngineConfig| -> Result<Arc<dyn PlaybackBackend>, BackendError> {
            let backend = RodioBackend::open(config.output_device.as_deref())?;
            Ok(Arc::new(backend))
        },
    )
}

/// Factory that always hands out the same backend
pub fn shared_backend_factory(backend: Arc<dyn PlaybackBackend>) -> BackendFactory {
    Box::new(
        move |_: &EngineConfig| -> Result<Arc<dyn PlaybackBackend>, BackendError> {
            Ok(Arc::clone(&backend))
        },
    )
}

/// One tracking session
///
/// All methods take `&self`, so a session can be shared between the frame
/// producer and a presentation layer.
pub struct MotionSession {
    id: Uuid,
    config: EngineConfig,
    backend_factory: BackendFactory,
    status: Arc<dyn StatusSink>,
    classifier: Mutex<GestureClassifier>,
    sequencer: NoteEventSequencer,
    synth: Mutex<Option<AudioSynthesizer>>,
    volume: Mutex<f32>,
    frames: AtomicU64,
    last_capture_time: Mutex<Option<f64>>,
    trace: Option<TraceWriter>,
}

impl MotionSession {
    pub fn new(config: EngineConfig, backend_factory: BackendFactory) -> Self {
        let classifier = GestureClassifier::with_config(ClassifierConfig::from(&config));
        let sequencer = NoteEventSequencer::new(&config);
        let volume = config.default_volume.clamp(0.0, 1.0);

        MotionSession {
            id: Uuid::new_v4(),
            config,
            backend_factory,
            status: Arc::new(LogStatusSink),
            classifier: Mutex::new(classifier),
            sequencer,
            synth: Mutex::new(None),
            volume: Mutex::new(volume),
            frames: AtomicU64::new(0),
            last_capture_time: Mutex::new(None),
            trace: None,
        }
    }

    /// Route status messages to `sink` instead of the log
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    /// Append a JSONL summary of every processed frame to `path`
    pub fn with_trace(mut self, path: PathBuf) -> Self {
        self.trace = Some(TraceWriter::new(path));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the playback backend and start the synthesizer worker
    ///
    /// Backend failure is fatal to the start and reported to the status sink.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut synth_slot = lock_or_recover(&self.synth);
        if synth_slot.is_some() {
            return Ok(());
        }

        let backend = match (self.backend_factory)(&self.config) {
            Ok(backend) => backend,
            Err(e) => {
                self.status.error(&format!("Failed to start audio: {}", e));
                return Err(e.into());
            }
        };

        let mut settings = SynthSettings::from(&self.config);
        settings.initial_volume = *lock_or_recover(&self.volume);

        let synth = AudioSynthesizer::new(settings, backend);
        synth.start()?;
        *synth_slot = Some(synth);

        self.status.status("Tracking active");
        log::info!("Session {} started", self.id);
        Ok(())
    }

    /// Stop the synthesizer worker and silence every voice
    ///
    /// Notes still held by the sequencer are released into the MIDI log, so a
    /// restarted session triggers them afresh.
    pub fn stop(&self) {
        let synth = lock_or_recover(&self.synth).take();

        if let Some(synth) = synth {
            *lock_or_recover(&self.volume) = synth.master_volume();
            synth.stop();

            let released = self.sequencer.stop_all(self.stop_time()).len();
            if released > 0 {
                log::debug!("Released {} held notes on stop", released);
            }

            self.status.status("Tracking stopped");
            log::info!(
                "Session {} stopped after {} frames",
                self.id,
                self.frames.load(Ordering::SeqCst)
            );
        }
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.synth).is_some()
    }

    /// Classify and sequence one pose record, queueing its events for synthesis
    pub fn process_frame(&self, record: &HandPoseRecord) -> Result<Vec<TimedEvent>, SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }

        let intent = lock_or_recover(&self.classifier).analyze(record);
        let events = self.sequencer.process_intent(&intent);
        *lock_or_recover(&self.last_capture_time) = Some(record.timestamp);

        if let Some(synth) = lock_or_recover(&self.synth).as_ref() {
            for timed in &events {
                synth.enqueue(timed.event);
            }
        }

        let frame = self.frames.fetch_add(1, Ordering::SeqCst);
        self.write_trace(frame, &intent, &events);

        Ok(events)
    }

    fn write_trace(&self, frame: u64, intent: &GestureIntent, events: &[TimedEvent]) {
        if let Some(writer) = &self.trace {
            let entry = FrameTrace::new(self.id, frame, intent, events);
            if let Err(e) = writer.write(&entry) {
                log::warn!("Failed to write frame trace to {}: {}", writer.path().display(), e);
            }
        }
    }

    /// Set master volume, clamped to [0, 1]
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        *lock_or_recover(&self.volume) = volume;

        if let Some(synth) = lock_or_recover(&self.synth).as_ref() {
            synth.set_master_volume(volume);
        }
    }

    /// Current master volume, including changes made by volume control events
    pub fn volume(&self) -> f32 {
        match lock_or_recover(&self.synth).as_ref() {
            Some(synth) => synth.master_volume(),
            None => *lock_or_recover(&self.volume),
        }
    }

    /// Turn off every sounding note
    ///
    /// The note-offs are logged at the latest capture time seen, or now if no
    /// frame has been processed, and queued behind any pending events so the
    /// synthesizer silences notes that are still on their way. Returns how
    /// many notes were turned off.
    pub fn stop_all_notes(&self) -> usize {
        let events = self.sequencer.stop_all(self.stop_time());

        if let Some(synth) = lock_or_recover(&self.synth).as_ref() {
            for timed in &events {
                synth.enqueue(timed.event);
            }
        }

        self.status.status(&format!("All notes stopped ({})", events.len()));
        events.len()
    }

    fn stop_time(&self) -> f64 {
        let last_capture_time = *lock_or_recover(&self.last_capture_time);
        last_capture_time.unwrap_or_else(wall_clock_seconds)
    }

    /// Pitches the sequencer considers sounding
    pub fn active_note_count(&self) -> usize {
        self.sequencer.active_note_count()
    }

    /// Voices the synthesizer is currently playing
    pub fn active_voice_count(&self) -> usize {
        lock_or_recover(&self.synth)
            .as_ref()
            .map(|synth| synth.active_voice_count())
            .unwrap_or(0)
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn sequencer(&self) -> &NoteEventSequencer {
        &self.sequencer
    }

    /// Save the MIDI log to `path`; failures leave the log intact for retry
    pub fn save_midi(&self, path: &Path) -> Result<(), SessionError> {
        match self.sequencer.save_midi_file(path) {
            Ok(()) => {
                self.status.status(&format!("MIDI saved to: {}", path.display()));
                Ok(())
            }
            Err(e) => {
                self.status.error(&format!("Failed to save MIDI: {}", e));
                Err(e.into())
            }
        }
    }

    /// Save the MIDI log to the default output location
    pub fn save_midi_default(&self) -> Result<PathBuf, SessionError> {
        let path = default_midi_output_path()?;
        self.save_midi(&path)?;
        Ok(path)
    }
}

impl Drop for MotionSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{Finger, Handedness, Point};
    use crate::sequencer::MidiEvent;
    use crate::synth::backend::testing::RecordingBackend;
    use crate::synth::NullBackend;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CollectingSink {
        messages: Mutex<Vec<String>>,
    }

    impl StatusSink for CollectingSink {
        fn status(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            sample_rate: 8000,
            poll_timeout_ms: 10,
            ..EngineConfig::default()
        }
    }

    fn session_with(backend: Arc<dyn PlaybackBackend>) -> MotionSession {
        MotionSession::new(test_config(), shared_backend_factory(backend))
    }

    fn pose(extended: &[Finger], tip: (f64, f64), timestamp: f64) -> HandPoseRecord {
        let mut record = HandPoseRecord {
            handedness: Handedness::Right,
            center: Some(Point::new(320.0, 240.0)),
            hand_size: Some(100.0),
            timestamp,
            ..Default::default()
        };
        for finger in Finger::ALL {
            record.finger_extended.insert(finger, extended.contains(&finger));
            record.finger_tips.insert(finger, Point::new(tip.0, tip.1));
        }
        record
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn note_ons(events: &[TimedEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e.event {
                MidiEvent::NoteOn { pitch, .. } => Some(pitch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_frames_require_running_session() {
        let session = session_with(Arc::new(NullBackend::new()));
        let result = session.process_frame(&pose(&[], (0.0, 0.0), 0.0));
        assert!(matches!(result, Err(SessionError::NotRunning)));
    }

    #[test]
    fn test_backend_failure_is_fatal_to_start() {
        let sink = Arc::new(CollectingSink::default());
        let factory: BackendFactory = Box::new(
            |_: &EngineConfig| -> Result<Arc<dyn PlaybackBackend>, BackendError> {
                Err(BackendError::NoOutputDevice)
            },
        );
        let session = MotionSession::new(test_config(), factory).with_status_sink(sink.clone());

        assert!(matches!(session.start(), Err(SessionError::Backend(_))));
        assert!(!session.is_running());
        assert!(sink.messages.lock().unwrap()[0].contains("No output device"));
    }

    #[test]
    fn test_pointing_then_fist() {
        let backend = Arc::new(RecordingBackend::default());
        let session = session_with(backend.clone());
        session.start().unwrap();

        // Index tip at normalized (0.05, 0.02) on a 640x480 frame
        let pointing = pose(&[Finger::Index], (32.0, 9.6), 1.0);
        let events = session.process_frame(&pointing).unwrap();
        assert_eq!(note_ons(&events), vec![60]);
        assert_eq!(session.active_note_count(), 1);
        assert!(wait_for(|| session.active_voice_count() == 1));

        // Same position again: deduplicated
        let again = session.process_frame(&pose(&[Finger::Index], (32.0, 9.6), 1.1)).unwrap();
        assert!(note_ons(&again).is_empty());

        let fist = session.process_frame(&pose(&[], (32.0, 9.6), 1.2)).unwrap();
        assert!(fist.iter().any(|e| e.event == MidiEvent::NoteOff { pitch: 60, channel: 0 }));
        assert_eq!(session.active_note_count(), 0);
        assert!(wait_for(|| session.active_voice_count() == 0));

        assert_eq!(session.frame_count(), 3);
        session.stop();
        assert!(!session.is_running());
    }

    #[test]
    fn test_volume_controls() {
        let session = session_with(Arc::new(NullBackend::new()));
        session.set_volume(0.8);
        assert_eq!(session.volume(), 0.8);

        session.start().unwrap();
        assert_eq!(session.volume(), 0.8);
        session.set_volume(3.0);
        assert_eq!(session.volume(), 1.0);
        session.stop();
        assert_eq!(session.volume(), 1.0);
    }

    #[test]
    fn test_stop_all_notes() {
        let session = session_with(Arc::new(NullBackend::new()));
        session.start().unwrap();

        let mut record = pose(&[Finger::Index, Finger::Middle, Finger::Ring], (32.0, 9.6), 0.0);
        record.finger_tips.insert(Finger::Middle, Point::new(160.0, 9.6));
        session.process_frame(&record).unwrap();
        assert_eq!(session.active_note_count(), 2);
        assert!(wait_for(|| session.active_voice_count() == 2));

        assert_eq!(session.stop_all_notes(), 2);
        assert_eq!(session.active_note_count(), 0);
        assert!(wait_for(|| session.active_voice_count() == 0));
        session.stop();
    }

    #[test]
    fn test_stop_all_notes_catches_queued_note_ons() {
        let backend = Arc::new(RecordingBackend::default());
        backend.play_delay_ms.store(150, Ordering::SeqCst);
        let session = session_with(backend.clone());
        session.start().unwrap();

        let mut record = pose(&[Finger::Index, Finger::Middle, Finger::Ring], (32.0, 9.6), 0.0);
        record.finger_tips.insert(Finger::Middle, Point::new(160.0, 9.6));
        let events = session.process_frame(&record).unwrap();
        assert_eq!(note_ons(&events).len(), 2);

        // Both note-ons are still queued or rendering
        assert_eq!(session.stop_all_notes(), 2);
        assert_eq!(session.active_note_count(), 0);

        assert!(wait_for(|| backend.plays().len() == 2));
        assert!(wait_for(|| backend.stops().len() == 2));
        assert_eq!(session.active_voice_count(), 0);
        session.stop();
    }

    #[test]
    fn test_restart_retriggers_held_notes() {
        let session = session_with(Arc::new(NullBackend::new()));
        session.start().unwrap();

        let pointing = pose(&[Finger::Index], (32.0, 9.6), 1.0);
        assert_eq!(note_ons(&session.process_frame(&pointing).unwrap()), vec![60]);

        session.stop();
        assert_eq!(session.active_note_count(), 0);
        let logged = session.sequencer().logged_message_count();

        session.start().unwrap();
        let again = pose(&[Finger::Index], (32.0, 9.6), 2.0);
        assert_eq!(note_ons(&session.process_frame(&again).unwrap()), vec![60]);
        assert!(session.sequencer().logged_message_count() > logged);
        session.stop();
    }

    #[test]
    fn test_save_midi_and_trace() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("frames.jsonl");
        let midi_path = temp_dir.path().join("take.mid");

        let session = session_with(Arc::new(NullBackend::new())).with_trace(trace_path.clone());
        session.start().unwrap();
        session.process_frame(&pose(&[Finger::Index], (32.0, 9.6), 0.0)).unwrap();
        session.process_frame(&pose(&[], (32.0, 9.6), 0.5)).unwrap();
        session.stop();

        session.save_midi(&midi_path).unwrap();
        let bytes = std::fs::read(&midi_path).unwrap();
        assert!(midly::Smf::parse(&bytes).is_ok());

        let bad_path = temp_dir.path().join("missing").join("take.mid");
        assert!(matches!(session.save_midi(&bad_path), Err(SessionError::MidiLog(_))));

        let traces = crate::pipeline::read_trace_file(&trace_path).unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].session_id, session.id());
        assert_eq!(traces[0].note_ons, vec![60]);
        assert_eq!(traces[1].gesture.as_deref(), Some("fist"));
        assert_eq!(traces[1].note_offs, vec![60]);
    }
}
