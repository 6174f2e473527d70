// Engine configuration
// Construction-time settings shared by the classifier, sequencer and synthesizer

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name used when no output path is given for the MIDI log
pub const DEFAULT_MIDI_FILENAME: &str = "motion_music_output.mid";

/// Directory (under the user's home) holding default output files
pub const TEMP_DIR_NAME: &str = ".motion_music_temp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to get home directory")]
    NoHomeDir,
}

/// Attack/decay/sustain/release settings for synthesized voices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrSettings {
    /// Attack time in seconds
    pub attack: f64,
    /// Decay time in seconds
    pub decay: f64,
    /// Sustain level [0.0, 1.0]
    pub sustain_level: f64,
    /// Release time in seconds
    pub release: f64,
}

impl Default for AdsrSettings {
    fn default() -> Self {
        AdsrSettings {
            attack: 0.1,
            decay: 0.2,
            sustain_level: 0.7,
            release: 0.3,
        }
    }
}

/// All fixed settings of the gesture-to-sound pipeline
///
/// Every field has a default, so a partial JSON file only needs to name
/// the settings it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // --- Audio ---
    pub sample_rate: u32,
    pub channels: u16,
    /// Master volume at startup [0.0, 1.0]
    pub default_volume: f32,
    /// Length of every rendered voice in seconds
    pub note_duration: f64,
    /// Output device name; `None` picks the host default
    pub output_device: Option<String>,

    // --- MIDI ---
    pub default_velocity: u8,
    pub default_channel: u8,
    /// Inclusive note range used to clamp note requests
    pub note_range: (u8, u8),
    /// Ticks per wall-clock second in the persisted log
    pub ticks_per_second: f64,
    /// Tempo written at the head of the MIDI file (microseconds per beat)
    pub tempo_us_per_beat: u32,
    /// Program (instrument) selected at the head of the MIDI file
    pub program: u8,
    /// Pitch-wheel span in semitones, used only for diagnostics
    pub pitch_bend_range: f64,

    // --- Gestures ---
    /// Pixels
    pub movement_threshold: f64,
    /// Pixels per second
    pub velocity_threshold: f64,
    /// Seconds between gestures. Not enforced by the classifier.
    pub gesture_cooldown: f64,
    /// Frame size used to normalize pixel coordinates
    pub frame_width: f64,
    pub frame_height: f64,

    pub adsr: AdsrSettings,

    // --- Worker ---
    /// How long the synth worker waits for an event before re-checking its running flag
    pub poll_timeout_ms: u64,
    /// Upper bound on waiting for the synth worker to exit
    pub shutdown_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            channels: 2,
            default_volume: 0.5,
            note_duration: 0.5,
            output_device: None,
            default_velocity: 64,
            default_channel: 0,
            note_range: (21, 108),
            ticks_per_second: 480.0,
            tempo_us_per_beat: 500_000,
            program: 0,
            pitch_bend_range: 2.0,
            movement_threshold: 10.0,
            velocity_threshold: 50.0,
            gesture_cooldown: 0.1,
            frame_width: 640.0,
            frame_height: 480.0,
            adsr: AdsrSettings::default(),
            poll_timeout_ms: 100,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file, filling unspecified fields with defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Clamp a requested note number into the configured note range
    ///
    /// Gesture zones already map into this range, so nothing in the gesture
    /// path calls this. It is provided for callers that accept note numbers
    /// from elsewhere, such as a presentation layer.
    pub fn clamp_note_request(&self, note: i32) -> u8 {
        let (low, high) = self.note_range;
        note.clamp(low as i32, high as i32) as u8
    }
}

/// Clamp a velocity into the valid MIDI note-on range (1..=127)
pub fn validate_velocity(velocity: i32) -> u8 {
    velocity.clamp(1, 127) as u8
}

/// Clamp a controller value into the valid MIDI range (0..=127)
pub fn validate_control_value(value: i32) -> u8 {
    value.clamp(0, 127) as u8
}

/// Default location for the saved MIDI log, creating its directory if needed
pub fn default_midi_output_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    let dir = home.join(TEMP_DIR_NAME);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(DEFAULT_MIDI_FILENAME))
}
