// MIDI Log - Persisted message log written as a Standard MIDI File using midly
// Each appended event gets a tick delta derived from wall-clock time

use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, Track, TrackEvent,
    TrackEventKind,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::events::{MidiEvent, MidiEventError};
use crate::config::EngineConfig;

/// Largest delta representable in a MIDI variable-length quantity
const MAX_DELTA_TICKS: u32 = 0x0FFF_FFFF;

/// Largest tempo a set-tempo meta message can carry
const MAX_TEMPO: u32 = 0x00FF_FFFF;

#[derive(Debug, Error)]
pub enum MidiLogError {
    #[error("Failed to encode MIDI: {0}")]
    Encode(String),

    #[error("Failed to write MIDI file: {0}")]
    Io(#[from] std::io::Error),
}

/// Header settings for the persisted MIDI file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiLogOptions {
    /// Pulses per quarter note written in the file header
    pub ppq: u16,

    /// Ticks per elapsed wall-clock second
    pub ticks_per_second: f64,

    /// Initial tempo in microseconds per beat
    pub tempo_us_per_beat: u32,

    /// Initial program (instrument)
    pub program: u8,

    /// Channel for the initial program change
    pub channel: u8,
}

impl Default for MidiLogOptions {
    fn default() -> Self {
        MidiLogOptions::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MidiLogOptions {
    fn from(config: &EngineConfig) -> Self {
        MidiLogOptions {
            ppq: 480,
            ticks_per_second: config.ticks_per_second,
            tempo_us_per_beat: config.tempo_us_per_beat,
            program: config.program,
            channel: config.default_channel,
        }
    }
}

/// A message as stored in the log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub delta_ticks: u32,
    pub event: MidiEvent,
}

/// In-memory MIDI message log
///
/// The log survives failed saves, so a save can be retried.
#[derive(Debug, Clone)]
pub struct MidiLog {
    options: MidiLogOptions,
    last_event_time: f64,
    messages: Vec<LoggedMessage>,
}

impl MidiLog {
    /// Create an empty log whose first delta is measured from `start_time`
    pub fn new(options: MidiLogOptions, start_time: f64) -> Self {
        MidiLog {
            options,
            last_event_time: start_time,
            messages: Vec::new(),
        }
    }

    /// Append an event captured at `now`, returning its tick delta
    ///
    /// Delta is `round((now - last) * ticks_per_second)`, floored at zero.
    /// Malformed events are rejected and leave the clock untouched.
    pub fn append(&mut self, event: MidiEvent, now: f64) -> Result<u32, MidiEventError> {
        event.validate()?;

        let ticks = ((now - self.last_event_time) * self.options.ticks_per_second).round();
        let delta_ticks = (ticks.max(0.0) as u32).min(MAX_DELTA_TICKS);

        self.messages.push(LoggedMessage { delta_ticks, event });
        self.last_event_time = now;

        Ok(delta_ticks)
    }

    pub fn messages(&self) -> &[LoggedMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_event_time(&self) -> f64 {
        self.last_event_time
    }

    /// Encode the log as a single-track Standard MIDI File
    ///
    /// Track layout: tempo, program change, every logged message, end of track.
    pub fn to_smf_bytes(&self) -> Result<Vec<u8>, MidiLogError> {
        let header = Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(self.options.ppq.min(0x7FFF))),
        );

        let mut track: Track = Vec::with_capacity(self.messages.len() + 3);

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
                self.options.tempo_us_per_beat.min(MAX_TEMPO),
            ))),
        });

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel: u4::new(self.options.channel & 0x0F),
                message: MidiMessage::ProgramChange {
                    program: u7::new(self.options.program & 0x7F),
                },
            },
        });

        // Ticks from skipped messages carry into the next written one
        let mut carry = 0u32;
        for message in &self.messages {
            let delta = message.delta_ticks.saturating_add(carry).min(MAX_DELTA_TICKS);

            match event_kind(&message.event) {
                Ok(kind) => {
                    track.push(TrackEvent {
                        delta: u28::new(delta),
                        kind,
                    });
                    carry = 0;
                }
                Err(e) => {
                    log::warn!("Skipping malformed MIDI event {:?}: {}", message.event, e);
                    carry = delta;
                }
            }
        }

        track.push(TrackEvent {
            delta: u28::new(carry),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header,
            tracks: vec![track],
        };

        let mut bytes = Vec::new();
        smf.write(&mut bytes)
            .map_err(|e| MidiLogError::Encode(e.to_string()))?;

        Ok(bytes)
    }

    /// Write the log to `path` as a MIDI file
    pub fn save(&self, path: &Path) -> Result<(), MidiLogError> {
        let bytes = self.to_smf_bytes()?;
        fs::write(path, bytes)?;
        log::info!("MIDI file saved: {} ({} messages)", path.display(), self.messages.len());
        Ok(())
    }
}

/// Convert an event to a midly track event
fn event_kind(event: &MidiEvent) -> Result<TrackEventKind<'static>, MidiEventError> {
    event.validate()?;

    let channel = u4::new(event.channel());
    let message = match *event {
        MidiEvent::NoteOn { pitch, velocity, .. } => MidiMessage::NoteOn {
            key: u7::new(pitch),
            vel: u7::new(velocity),
        },
        MidiEvent::NoteOff { pitch, .. } => MidiMessage::NoteOff {
            key: u7::new(pitch),
            vel: u7::new(0),
        },
        MidiEvent::ControlChange { controller, value, .. } => MidiMessage::Controller {
            controller: u7::new(controller),
            value: u7::new(value),
        },
        MidiEvent::PitchWheel { value, .. } => MidiMessage::PitchBend {
            bend: PitchBend(u14::new(value)),
        },
    };

    Ok(TrackEventKind::Midi { channel, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::events::{CC_SUSTAIN, PITCH_WHEEL_CENTER};
    use tempfile::TempDir;

    fn parse_track(bytes: &[u8]) -> Vec<(u32, TrackEventKind<'_>)> {
        let smf = Smf::parse(bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        smf.tracks[0]
            .iter()
            .map(|e| (e.delta.as_int(), e.kind))
            .collect()
    }

    #[test]
    fn test_delta_ticks_from_wall_clock() {
        let mut log = MidiLog::new(MidiLogOptions::default(), 10.0);

        let d1 = log.append(MidiEvent::note_on(60, 100, 0).unwrap(), 10.5).unwrap();
        let d2 = log.append(MidiEvent::note_off(60, 0).unwrap(), 10.5).unwrap();
        let d3 = log.append(MidiEvent::note_on(62, 100, 0).unwrap(), 11.25).unwrap();

        assert_eq!(d1, 240);
        assert_eq!(d2, 0);
        assert_eq!(d3, 360);
        assert_eq!(log.last_event_time(), 11.25);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_clock_going_backwards_floors_at_zero() {
        let mut log = MidiLog::new(MidiLogOptions::default(), 5.0);
        let delta = log.append(MidiEvent::note_on(60, 100, 0).unwrap(), 4.0).unwrap();
        assert_eq!(delta, 0);
    }

    #[test]
    fn test_malformed_event_is_rejected() {
        let mut log = MidiLog::new(MidiLogOptions::default(), 0.0);
        let bad = MidiEvent::NoteOn { pitch: 200, velocity: 10, channel: 0 };

        assert!(log.append(bad, 1.0).is_err());
        assert!(log.is_empty());
        assert_eq!(log.last_event_time(), 0.0);
    }

    #[test]
    fn test_file_layout() {
        let mut log = MidiLog::new(MidiLogOptions::default(), 0.0);
        log.append(MidiEvent::control_change(CC_SUSTAIN, 127, 0).unwrap(), 0.0).unwrap();
        log.append(MidiEvent::note_on(60, 90, 0).unwrap(), 1.0).unwrap();
        log.append(MidiEvent::pitch_wheel(PITCH_WHEEL_CENTER, 0).unwrap(), 1.0).unwrap();
        log.append(MidiEvent::note_off(60, 0).unwrap(), 2.0).unwrap();

        let bytes = log.to_smf_bytes().unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));

        let events = parse_track(&bytes);
        assert_eq!(events.len(), 7);

        assert_eq!(events[0].1, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))));
        assert_eq!(
            events[1].1,
            TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::ProgramChange { program: u7::new(0) },
            }
        );
        assert_eq!(
            events[2].1,
            TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::Controller { controller: u7::new(64), value: u7::new(127) },
            }
        );
        assert_eq!(events[3].0, 480);
        assert_eq!(
            events[3].1,
            TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(90) },
            }
        );
        assert_eq!(events[4].0, 0);
        assert_eq!(
            events[4].1,
            TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::PitchBend { bend: PitchBend(u14::new(8192)) },
            }
        );
        assert_eq!(events[5].0, 480);
        assert_eq!(events[6].1, TrackEventKind::Meta(MetaMessage::EndOfTrack));
    }

    #[test]
    fn test_empty_log_still_has_header_messages() {
        let log = MidiLog::new(MidiLogOptions::default(), 0.0);
        let bytes = log.to_smf_bytes().unwrap();
        let events = parse_track(&bytes);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_save_and_retry_after_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = MidiLog::new(MidiLogOptions::default(), 0.0);
        log.append(MidiEvent::note_on(64, 80, 0).unwrap(), 0.1).unwrap();

        // Parent directory does not exist
        let bad_path = temp_dir.path().join("missing").join("out.mid");
        assert!(matches!(log.save(&bad_path), Err(MidiLogError::Io(_))));
        assert_eq!(log.len(), 1);

        let good_path = temp_dir.path().join("out.mid");
        log.save(&good_path).unwrap();

        let bytes = fs::read(&good_path).unwrap();
        assert_eq!(parse_track(&bytes).len(), 4);
    }
}
