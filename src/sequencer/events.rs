// MIDI event types
// Closed set of channel messages emitted by the sequencer and consumed by the synthesizer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Modulation wheel controller number
pub const CC_MODULATION: u8 = 1;

/// Channel volume controller number
pub const CC_VOLUME: u8 = 7;

/// Sustain pedal controller number
pub const CC_SUSTAIN: u8 = 64;

/// Pitch-wheel rest position
pub const PITCH_WHEEL_CENTER: u16 = 8192;

/// Largest 14-bit pitch-wheel value
pub const PITCH_WHEEL_MAX: u16 = 16383;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MidiEventError {
    #[error("Pitch out of range: {0}")]
    PitchOutOfRange(u8),

    #[error("Velocity out of range: {0} (expected 1-127)")]
    VelocityOutOfRange(u8),

    #[error("Channel out of range: {0} (expected 0-15)")]
    ChannelOutOfRange(u8),

    #[error("Controller out of range: {0}")]
    ControllerOutOfRange(u8),

    #[error("Controller value out of range: {0}")]
    ValueOutOfRange(u8),

    #[error("Pitch wheel value out of range: {0}")]
    PitchWheelOutOfRange(u16),
}

/// A MIDI channel message
///
/// Build through the checked constructors. Variants built by hand are
/// re-checked with [`MidiEvent::validate`] before they are written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiEvent {
    NoteOn { pitch: u8, velocity: u8, channel: u8 },
    NoteOff { pitch: u8, channel: u8 },
    ControlChange { controller: u8, value: u8, channel: u8 },
    PitchWheel { value: u16, channel: u8 },
}

impl MidiEvent {
    pub fn note_on(pitch: u8, velocity: u8, channel: u8) -> Result<Self, MidiEventError> {
        let event = MidiEvent::NoteOn { pitch, velocity, channel };
        event.validate()?;
        Ok(event)
    }

    pub fn note_off(pitch: u8, channel: u8) -> Result<Self, MidiEventError> {
        let event = MidiEvent::NoteOff { pitch, channel };
        event.validate()?;
        Ok(event)
    }

    pub fn control_change(controller: u8, value: u8, channel: u8) -> Result<Self, MidiEventError> {
        let event = MidiEvent::ControlChange { controller, value, channel };
        event.validate()?;
        Ok(event)
    }

    pub fn pitch_wheel(value: u16, channel: u8) -> Result<Self, MidiEventError> {
        let event = MidiEvent::PitchWheel { value, channel };
        event.validate()?;
        Ok(event)
    }

    /// Check every field against its MIDI range
    pub fn validate(&self) -> Result<(), MidiEventError> {
        check_channel(self.channel())?;

        match *self {
            MidiEvent::NoteOn { pitch, velocity, .. } => {
                check_data_byte(pitch, MidiEventError::PitchOutOfRange)?;
                if velocity == 0 || velocity > 127 {
                    return Err(MidiEventError::VelocityOutOfRange(velocity));
                }
            }
            MidiEvent::NoteOff { pitch, .. } => {
                check_data_byte(pitch, MidiEventError::PitchOutOfRange)?;
            }
            MidiEvent::ControlChange { controller, value, .. } => {
                check_data_byte(controller, MidiEventError::ControllerOutOfRange)?;
                check_data_byte(value, MidiEventError::ValueOutOfRange)?;
            }
            MidiEvent::PitchWheel { value, .. } => {
                if value > PITCH_WHEEL_MAX {
                    return Err(MidiEventError::PitchWheelOutOfRange(value));
                }
            }
        }

        Ok(())
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchWheel { channel, .. } => channel,
        }
    }

    /// Pitch for note messages
    pub fn pitch(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOn { pitch, .. } | MidiEvent::NoteOff { pitch, .. } => Some(pitch),
            _ => None,
        }
    }

    /// Short name used in logs and traces
    pub fn kind_name(&self) -> &'static str {
        match self {
            MidiEvent::NoteOn { .. } => "note_on",
            MidiEvent::NoteOff { .. } => "note_off",
            MidiEvent::ControlChange { .. } => "control_change",
            MidiEvent::PitchWheel { .. } => "pitchwheel",
        }
    }
}

fn check_channel(channel: u8) -> Result<(), MidiEventError> {
    if channel > 15 {
        return Err(MidiEventError::ChannelOutOfRange(channel));
    }
    Ok(())
}

fn check_data_byte(value: u8, err: fn(u8) -> MidiEventError) -> Result<(), MidiEventError> {
    if value > 127 {
        return Err(err(value));
    }
    Ok(())
}

/// An emitted event with its capture time and tick delta in the persisted log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub event: MidiEvent,

    /// Wall-clock capture time in seconds
    pub timestamp: f64,

    /// Ticks since the previous logged message
    pub delta_ticks: u32,
}

/// Encode a bend amount in [-1, 1] as a 14-bit pitch-wheel value
pub fn encode_pitch_bend(amount: f64) -> u16 {
    let value = (amount * 8192.0 + 8192.0).round();
    value.clamp(0.0, PITCH_WHEEL_MAX as f64) as u16
}

/// Decode a 14-bit pitch-wheel value back to [-1, 1)
pub fn decode_pitch_bend(value: u16) -> f64 {
    (value as f64 - PITCH_WHEEL_CENTER as f64) / 8192.0
}

/// Scale a unit value to a 0-127 controller value
pub fn encode_control_value(amount: f64) -> u8 {
    (amount * 127.0).round().clamp(0.0, 127.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_constructors() {
        assert!(MidiEvent::note_on(60, 100, 0).is_ok());
        assert_eq!(
            MidiEvent::note_on(128, 100, 0),
            Err(MidiEventError::PitchOutOfRange(128))
        );
        assert_eq!(
            MidiEvent::note_on(60, 0, 0),
            Err(MidiEventError::VelocityOutOfRange(0))
        );
        assert_eq!(
            MidiEvent::note_off(60, 16),
            Err(MidiEventError::ChannelOutOfRange(16))
        );
        assert_eq!(
            MidiEvent::control_change(CC_VOLUME, 200, 0),
            Err(MidiEventError::ValueOutOfRange(200))
        );
        assert_eq!(
            MidiEvent::pitch_wheel(16384, 0),
            Err(MidiEventError::PitchWheelOutOfRange(16384))
        );
    }

    #[test]
    fn test_hand_built_event_fails_validation() {
        let event = MidiEvent::ControlChange { controller: 130, value: 0, channel: 0 };
        assert_eq!(event.validate(), Err(MidiEventError::ControllerOutOfRange(130)));
    }

    #[test]
    fn test_pitch_bend_encoding() {
        assert_eq!(encode_pitch_bend(0.0), PITCH_WHEEL_CENTER);
        assert_eq!(encode_pitch_bend(-1.0), 0);
        // +1.0 would be 16384; clamped to the 14-bit maximum
        assert_eq!(encode_pitch_bend(1.0), PITCH_WHEEL_MAX);
        assert_eq!(encode_pitch_bend(5.0), PITCH_WHEEL_MAX);
    }

    #[test]
    fn test_pitch_bend_recovers_within_one_step() {
        for i in 0..=200 {
            let v = i as f64 / 100.0 - 1.0;
            let decoded = decode_pitch_bend(encode_pitch_bend(v));
            assert!((decoded - v).abs() <= 1.0 / 8192.0, "v = {}", v);
        }
    }

    #[test]
    fn test_control_value_encoding() {
        assert_eq!(encode_control_value(0.0), 0);
        assert_eq!(encode_control_value(0.5), 64);
        assert_eq!(encode_control_value(1.0), 127);
        assert_eq!(encode_control_value(-0.3), 0);
    }

    #[test]
    fn test_event_accessors() {
        let event = MidiEvent::note_on(64, 90, 3).unwrap();
        assert_eq!(event.channel(), 3);
        assert_eq!(event.pitch(), Some(64));
        assert_eq!(event.kind_name(), "note_on");

        let cc = MidiEvent::control_change(CC_SUSTAIN, 127, 0).unwrap();
        assert_eq!(cc.pitch(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let event = MidiEvent::note_off(60, 0).unwrap();
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "note_off");
        assert_eq!(json["pitch"], 60);
    }
}
