// Frame tracing
// Append-only JSONL record of what each processed frame produced

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::gesture::{ControlName, GestureIntent, Handedness};
use crate::sequencer::{MidiEvent, TimedEvent};

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One processed frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameTrace {
    /// RFC 3339 time the entry was written
    pub timestamp: String,

    pub session_id: Uuid,

    /// Zero-based frame counter within the session
    pub frame: u64,

    pub handedness: Handedness,

    /// Capture time from the pose record
    pub capture_time: f64,

    /// Hand shape name ("fist", "pointing", ...); absent for malformed records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gesture: Option<String>,

    pub extended_fingers: usize,

    pub controls: BTreeMap<ControlName, f64>,

    /// Number of MIDI events emitted for the frame
    pub event_count: usize,

    /// Pitches that started sounding
    pub note_ons: Vec<u8>,

    /// Pitches that stopped sounding
    pub note_offs: Vec<u8>,
}

impl FrameTrace {
    /// Summarize a frame's intent and the events it produced
    pub fn new(
        session_id: Uuid,
        frame: u64,
        intent: &GestureIntent,
        events: &[TimedEvent],
    ) -> Self {
        let note_ons = events
            .iter()
            .filter_map(|e| match e.event {
                MidiEvent::NoteOn { pitch, .. } => Some(pitch),
                _ => None,
            })
            .collect();

        let note_offs = events
            .iter()
            .filter_map(|e| match e.event {
                MidiEvent::NoteOff { pitch, .. } => Some(pitch),
                _ => None,
            })
            .collect();

        FrameTrace {
            timestamp: Utc::now().to_rfc3339(),
            session_id,
            frame,
            handedness: intent.handedness,
            capture_time: intent.timestamp,
            gesture: intent.action.map(|a| a.gesture_type().to_string()),
            extended_fingers: intent.extended_fingers,
            controls: intent.controls.clone(),
            event_count: events.len(),
            note_ons,
            note_offs,
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Frame trace writer
/// Manages append-only JSONL trace file
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Append an entry, creating the file if it doesn't exist
    pub fn write(&self, entry: &FrameTrace) -> Result<(), TraceError> {
        self.write_batch(std::slice::from_ref(entry))
    }

    pub fn write_batch(&self, entries: &[FrameTrace]) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        for entry in entries {
            let json_line = entry.to_json_line()?;
            file.write_all(json_line.as_bytes())?;
        }

        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<FrameTrace>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: FrameTrace = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}
