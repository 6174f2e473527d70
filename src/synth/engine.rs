// Audio Synthesizer - Worker that drains the event queue and drives playback voices
// One voice per pitch; a note-on for a sounding pitch replaces the old voice

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::backend::{BackendError, PlaybackBackend, VoiceHandle};
use super::envelope::Adsr;
use super::voice::Voice;
use crate::config::EngineConfig;
use crate::sequencer::{
    decode_pitch_bend, MidiEvent, MidiEventError, CC_MODULATION, CC_SUSTAIN, CC_VOLUME,
};
use crate::sync::lock_or_recover;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Synthesizer already running")]
    AlreadyRunning,
    #[error("Failed to spawn synth worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] MidiEventError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Rendering and worker settings
#[derive(Debug, Clone)]
pub struct SynthSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub note_duration: f64,
    pub envelope: Adsr,
    /// Semitones at full pitch-wheel deflection
    pub pitch_bend_range: f64,
    pub initial_volume: f32,
    pub poll_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl From<&EngineConfig> for SynthSettings {
    fn from(config: &EngineConfig) -> Self {
        SynthSettings {
            sample_rate: config.sample_rate,
            channels: config.channels,
            note_duration: config.note_duration,
            envelope: Adsr::from(&config.adsr),
            pitch_bend_range: config.pitch_bend_range,
            initial_volume: config.default_volume,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
        }
    }
}

impl Default for SynthSettings {
    fn default() -> Self {
        SynthSettings::from(&EngineConfig::default())
    }
}

struct ActiveVoice {
    handle: Box<dyn VoiceHandle>,
    frequency: f64,
    started_at: Instant,
}

/// State shared between the control surface and the worker
struct SynthCore {
    settings: SynthSettings,
    backend: Arc<dyn PlaybackBackend>,
    voices: Mutex<HashMap<u8, ActiveVoice>>,
    /// Bumped under the `voices` lock by every stop-all
    generation: AtomicU64,
    master_volume: Mutex<f32>,
}

impl SynthCore {
    fn process_event(&self, event: &MidiEvent) -> Result<(), SynthError> {
        event.validate()?;

        match *event {
            MidiEvent::NoteOn { pitch, velocity, .. } => self.note_on(pitch, velocity),
            MidiEvent::NoteOff { pitch, .. } => {
                self.note_off(pitch);
                Ok(())
            }
            MidiEvent::ControlChange { controller, value, .. } => {
                self.control_change(controller, value);
                Ok(())
            }
            MidiEvent::PitchWheel { value, .. } => {
                let semitones = decode_pitch_bend(value) * self.settings.pitch_bend_range;
                log::debug!("Pitch bend: {:.2} semitones", semitones);
                Ok(())
            }
        }
    }

    fn note_on(&self, pitch: u8, velocity: u8) -> Result<(), SynthError> {
        let master_volume = *lock_or_recover(&self.master_volume);
        let voice = Voice::new(
            pitch,
            velocity,
            master_volume,
            self.settings.note_duration,
            self.settings.envelope,
        );
        let buffer = voice.render(self.settings.sample_rate, self.settings.channels);

        let (previous, generation) = {
            let mut voices = lock_or_recover(&self.voices);
            (voices.remove(&pitch), self.generation.load(Ordering::SeqCst))
        };
        if let Some(mut previous) = previous {
            previous.handle.stop();
        }

        let active = ActiveVoice {
            handle: self.backend.play(&buffer)?,
            frequency: voice.frequency,
            started_at: Instant::now(),
        };

        let (displaced, silenced) = {
            let mut voices = lock_or_recover(&self.voices);
            if self.generation.load(Ordering::SeqCst) == generation {
                (voices.insert(pitch, active), false)
            } else {
                // A stop-all ran while the backend was starting this voice
                (Some(active), true)
            }
        };
        if let Some(mut displaced) = displaced {
            displaced.handle.stop();
        }
        if silenced {
            log::debug!("Note {} silenced by stop-all before it was registered", pitch);
            return Ok(());
        }

        log::debug!(
            "Playing note {} ({:.2} Hz) at velocity {}",
            pitch,
            voice.frequency,
            velocity
        );
        Ok(())
    }

    fn note_off(&self, pitch: u8) {
        let removed = lock_or_recover(&self.voices).remove(&pitch);

        if let Some(mut voice) = removed {
            voice.handle.stop();
            log::debug!(
                "Stopped note {} ({:.2} Hz) after {} ms",
                pitch,
                voice.frequency,
                voice.started_at.elapsed().as_millis()
            );
        }
    }

    fn control_change(&self, controller: u8, value: u8) {
        match controller {
            CC_VOLUME => {
                let volume = value as f32 / 127.0;
                *lock_or_recover(&self.master_volume) = volume;
                log::debug!("Volume changed to {:.2}", volume);
            }
            CC_SUSTAIN => {
                log::debug!("Sustain pedal {}", if value >= 64 { "ON" } else { "OFF" });
            }
            CC_MODULATION => {
                log::debug!("Modulation {}", value);
            }
            other => {
                log::debug!("Ignoring controller {} = {}", other, value);
            }
        }
    }

    fn stop_all_voices(&self) -> usize {
        let drained: Vec<ActiveVoice> = {
            let mut voices = lock_or_recover(&self.voices);
            self.generation.fetch_add(1, Ordering::SeqCst);
            voices.drain().map(|(_, voice)| voice).collect()
        };

        let count = drained.len();
        for mut voice in drained {
            voice.handle.stop();
        }
        count
    }
}

/// Worker handle and the flags used to wind it down
struct Worker {
    sender: Sender<MidiEvent>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Renders queued MIDI events into backend voices on a dedicated thread
///
/// Events are processed strictly in enqueue order. The queue is unbounded,
/// so `enqueue` never blocks the caller.
pub struct AudioSynthesizer {
    core: Arc<SynthCore>,
    worker: Mutex<Option<Worker>>,
}

impl AudioSynthesizer {
    pub fn new(settings: SynthSettings, backend: Arc<dyn PlaybackBackend>) -> Self {
        let master_volume = settings.initial_volume.clamp(0.0, 1.0);

        AudioSynthesizer {
            core: Arc::new(SynthCore {
                settings,
                backend,
                voices: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                master_volume: Mutex::new(master_volume),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker thread
    pub fn start(&self) -> Result<(), SynthError> {
        let mut worker = lock_or_recover(&self.worker);
        if worker.is_some() {
            return Err(SynthError::AlreadyRunning);
        }

        let (sender, receiver) = mpsc::channel::<MidiEvent>();
        let running = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));

        let core = Arc::clone(&self.core);
        let running_flag = Arc::clone(&running);
        let finished_flag = Arc::clone(&finished);
        let poll_timeout = self.core.settings.poll_timeout;

        let thread = thread::Builder::new()
            .name("synth-worker".to_string())
            .spawn(move || {
                while running_flag.load(Ordering::SeqCst) {
                    match receiver.recv_timeout(poll_timeout) {
                        Ok(event) => {
                            if let Err(e) = core.process_event(&event) {
                                log::error!("Failed to process {} event: {}", event.kind_name(), e);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                finished_flag.store(true, Ordering::SeqCst);
            })?;

        *worker = Some(Worker {
            sender,
            running,
            finished,
            thread,
        });

        log::info!("Audio synthesizer started on {}", self.core.backend.name());
        Ok(())
    }

    /// Signal the worker, wait for it (bounded) and silence every voice
    ///
    /// Stopping a synthesizer that is not running only clears voices.
    pub fn stop(&self) {
        let worker = lock_or_recover(&self.worker).take();

        if let Some(worker) = worker {
            worker.running.store(false, Ordering::SeqCst);
            drop(worker.sender);

            let deadline = Instant::now() + self.core.settings.shutdown_timeout;
            while !worker.finished.load(Ordering::SeqCst) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }

            if worker.finished.load(Ordering::SeqCst) {
                if worker.thread.join().is_err() {
                    log::error!("Synth worker panicked");
                }
            } else {
                log::warn!(
                    "Synth worker did not exit within {} ms",
                    self.core.settings.shutdown_timeout.as_millis()
                );
            }

            log::info!("Audio synthesizer stopped");
        }

        self.core.stop_all_voices();
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.worker).is_some()
    }

    /// Queue an event for the worker; returns false when not running
    pub fn enqueue(&self, event: MidiEvent) -> bool {
        match lock_or_recover(&self.worker).as_ref() {
            Some(worker) => worker.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Process one event on the calling thread
    pub fn process_event(&self, event: &MidiEvent) -> Result<(), SynthError> {
        self.core.process_event(event)
    }

    /// Set the master volume used by subsequent note-ons, clamped to [0, 1]
    pub fn set_master_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        *lock_or_recover(&self.core.master_volume) = volume;
        log::info!("Master volume set to {:.2}", volume);
    }

    pub fn master_volume(&self) -> f32 {
        *lock_or_recover(&self.core.master_volume)
    }

    /// Stop and forget every sounding voice, returning how many there were
    pub fn stop_all_voices(&self) -> usize {
        let count = self.core.stop_all_voices();
        log::info!("All voices stopped ({})", count);
        count
    }

    pub fn active_voice_count(&self) -> usize {
        lock_or_recover(&self.core.voices).len()
    }

    /// Pitches with a sounding voice, ascending
    pub fn active_pitches(&self) -> Vec<u8> {
        let mut pitches: Vec<u8> = lock_or_recover(&self.core.voices).keys().copied().collect();
        pitches.sort_unstable();
        pitches
    }

    pub fn settings(&self) -> &SynthSettings {
        &self.core.settings
    }
}

impl Drop for AudioSynthesizer {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
