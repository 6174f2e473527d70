// Note Event Sequencer - Gesture intents to a deduplicated MIDI event stream
// Owns the active note set, the sustain flag and the persisted message log

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::events::{
    encode_control_value, encode_pitch_bend, MidiEvent, MidiEventError, TimedEvent, CC_MODULATION,
    CC_SUSTAIN, CC_VOLUME,
};
use super::midi_log::{MidiLog, MidiLogError, MidiLogOptions};
use crate::config::{validate_velocity, EngineConfig};
use crate::gesture::{ControlName, GestureAction, GestureIntent, NoteTrigger};
use crate::sync::{lock_or_recover, wall_clock_seconds};

/// Bookkeeping for one sounding pitch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveNote {
    pub velocity: u8,
    pub started_at: f64,
}

/// Converts gesture intents into note, control and pitch-wheel events
///
/// At most one sounding instance exists per pitch: a trigger for a pitch
/// that is already active emits nothing until that pitch is turned off.
/// The active set and the log are guarded by separate locks that are never
/// held at the same time.
pub struct NoteEventSequencer {
    channel: u8,
    active_notes: Mutex<BTreeMap<u8, ActiveNote>>,
    sustain: AtomicBool,
    log: Mutex<MidiLog>,
}

impl NoteEventSequencer {
    /// Create a sequencer whose log clock starts now
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_start_time(config, wall_clock_seconds())
    }

    /// Create a sequencer whose log clock starts at `start_time` seconds
    pub fn with_start_time(config: &EngineConfig, start_time: f64) -> Self {
        NoteEventSequencer {
            channel: config.default_channel,
            active_notes: Mutex::new(BTreeMap::new()),
            sustain: AtomicBool::new(false),
            log: Mutex::new(MidiLog::new(MidiLogOptions::from(config), start_time)),
        }
    }

    /// Turn one frame's intent into events, append them to the log and return them
    ///
    /// Order within a frame: action events, then note triggers, then
    /// controls (pitch wheel, modulation, volume). The intent timestamp is
    /// the capture time for every event of the frame.
    pub fn process_intent(&self, intent: &GestureIntent) -> Vec<TimedEvent> {
        let mut events = Vec::new();

        match intent.action {
            Some(GestureAction::StopAll) => events.extend(self.drain_note_offs()),
            Some(GestureAction::Sustain) => {
                self.sustain.store(true, Ordering::SeqCst);
                events.extend(self.sustain_event(true));
            }
            Some(_) => {
                self.sustain.store(false, Ordering::SeqCst);
                events.extend(self.sustain_event(false));
            }
            // Malformed record: no action handling
            None => {}
        }

        for trigger in &intent.notes {
            if let Some(event) = self.trigger_note(trigger, intent.timestamp) {
                events.push(event);
            }
        }

        events.extend(self.control_events(intent));

        self.append_to_log(events, intent.timestamp)
    }

    /// Turn off one pitch; no-op if it is not sounding
    pub fn release_note(&self, pitch: u8, now: f64) -> Option<TimedEvent> {
        let was_active = lock_or_recover(&self.active_notes).remove(&pitch).is_some();
        if !was_active {
            return None;
        }

        let event = checked(MidiEvent::note_off(pitch, self.channel))?;
        self.append_to_log(vec![event], now).into_iter().next()
    }

    /// Turn off every sounding pitch, ascending
    pub fn stop_all(&self, now: f64) -> Vec<TimedEvent> {
        let events = self.drain_note_offs();
        self.append_to_log(events, now)
    }

    /// Snapshot of sounding pitches, ascending
    pub fn active_notes(&self) -> Vec<u8> {
        lock_or_recover(&self.active_notes).keys().copied().collect()
    }

    pub fn active_note(&self, pitch: u8) -> Option<ActiveNote> {
        lock_or_recover(&self.active_notes).get(&pitch).copied()
    }

    pub fn active_note_count(&self) -> usize {
        lock_or_recover(&self.active_notes).len()
    }

    /// Forget every sounding pitch without emitting note-offs
    pub fn clear_all_notes(&self) {
        lock_or_recover(&self.active_notes).clear();
    }

    pub fn is_sustained(&self) -> bool {
        self.sustain.load(Ordering::SeqCst)
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Number of messages in the persisted log
    pub fn logged_message_count(&self) -> usize {
        lock_or_recover(&self.log).len()
    }

    /// Encode the persisted log as a Standard MIDI File
    pub fn midi_bytes(&self) -> Result<Vec<u8>, MidiLogError> {
        lock_or_recover(&self.log).to_smf_bytes()
    }

    /// Save the persisted log; the in-memory log is kept either way
    pub fn save_midi_file(&self, path: &Path) -> Result<(), MidiLogError> {
        let snapshot = lock_or_recover(&self.log).clone();
        snapshot.save(path)
    }

    fn trigger_note(&self, trigger: &NoteTrigger, now: f64) -> Option<MidiEvent> {
        let pitch = trigger.pitch.min(127);
        let velocity = validate_velocity(trigger.velocity as i32);

        let mut active = lock_or_recover(&self.active_notes);
        if active.contains_key(&pitch) {
            log::debug!("Pitch {} already sounding, trigger ignored", pitch);
            return None;
        }

        let event = checked(MidiEvent::note_on(pitch, velocity, self.channel))?;
        active.insert(pitch, ActiveNote { velocity, started_at: now });
        Some(event)
    }

    fn drain_note_offs(&self) -> Vec<MidiEvent> {
        let drained = std::mem::take(&mut *lock_or_recover(&self.active_notes));

        drained
            .keys()
            .filter_map(|&pitch| checked(MidiEvent::note_off(pitch, self.channel)))
            .collect()
    }

    fn sustain_event(&self, on: bool) -> Option<MidiEvent> {
        log::debug!("Sustain {}", if on { "on" } else { "off" });
        let value = if on { 127 } else { 0 };
        checked(MidiEvent::control_change(CC_SUSTAIN, value, self.channel))
    }

    fn control_events(&self, intent: &GestureIntent) -> Vec<MidiEvent> {
        let mut events = Vec::new();

        if let Some(bend) = intent.control(ControlName::PitchBend) {
            events.extend(checked(MidiEvent::pitch_wheel(encode_pitch_bend(bend), self.channel)));
        }

        if let Some(modulation) = intent.control(ControlName::Modulation) {
            let value = encode_control_value(modulation.abs());
            events.extend(checked(MidiEvent::control_change(CC_MODULATION, value, self.channel)));
        }

        if let Some(volume) = intent.control(ControlName::Volume) {
            let value = encode_control_value(volume);
            events.extend(checked(MidiEvent::control_change(CC_VOLUME, value, self.channel)));
        }

        events
    }

    fn append_to_log(&self, events: Vec<MidiEvent>, now: f64) -> Vec<TimedEvent> {
        let mut midi_log = lock_or_recover(&self.log);

        events
            .into_iter()
            .filter_map(|event| match midi_log.append(event, now) {
                Ok(delta_ticks) => Some(TimedEvent {
                    event,
                    timestamp: now,
                    delta_ticks,
                }),
                Err(e) => {
                    log::warn!("Dropping malformed {} event: {}", event.kind_name(), e);
                    None
                }
            })
            .collect()
    }
}

/// Log and drop an event that failed construction
fn checked(result: Result<MidiEvent, MidiEventError>) -> Option<MidiEvent> {
    match result {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("Skipping malformed MIDI event: {}", e);
            None
        }
    }
}
