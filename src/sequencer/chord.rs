// Chord helper
// Expands a root trigger into the triggers of a chord built on it

use serde::{Deserialize, Serialize};

use crate::gesture::zones::{note_name, BASE_NOTE};
use crate::gesture::NoteTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChordKind {
    #[default]
    Major,
    Minor,
    Seventh,
    Diminished,
}

impl ChordKind {
    /// Semitone offsets from the root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ChordKind::Major => &[0, 4, 7],
            ChordKind::Minor => &[0, 3, 7],
            ChordKind::Seventh => &[0, 4, 7, 10],
            ChordKind::Diminished => &[0, 3, 6],
        }
    }

    /// Parse a chord name; unknown names fall back to major
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "minor" => ChordKind::Minor,
            "seventh" => ChordKind::Seventh,
            "diminished" => ChordKind::Diminished,
            _ => ChordKind::Major,
        }
    }
}

/// Display name for an absolute pitch, using the zone naming scheme
fn pitch_name(pitch: u8) -> String {
    if pitch >= BASE_NOTE {
        note_name((pitch - BASE_NOTE) as usize)
    } else {
        format!("Note_{}", pitch)
    }
}

/// Build the chord rooted at `root`, root first
///
/// Every member shares the root's velocity, finger and position. Members
/// above pitch 127 are dropped. Pure: nothing is marked as sounding.
pub fn chord_triggers(root: &NoteTrigger, kind: ChordKind) -> Vec<NoteTrigger> {
    kind.intervals()
        .iter()
        .filter_map(|&interval| {
            let pitch = root.pitch as u16 + interval as u16;
            if pitch > 127 {
                return None;
            }
            let pitch = pitch as u8;

            Some(NoteTrigger {
                pitch,
                velocity: root.velocity,
                finger: root.finger,
                note_name: pitch_name(pitch),
                position: root.position,
            })
        })
        .collect()
}
