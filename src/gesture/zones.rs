// Note zones
// Fixed grid of screen regions, each bound to one MIDI pitch

use serde::{Deserialize, Serialize};

/// Number of octave bands (rows)
pub const OCTAVE_BANDS: usize = 7;

/// Number of horizontal bands per octave (columns)
pub const ZONES_PER_OCTAVE: usize = 5;

/// Width of one zone in normalized space
pub const ZONE_WIDTH: f64 = 0.2;

/// Height of one zone in normalized space
pub const ZONE_HEIGHT: f64 = 0.14;

/// Pitch of the first zone (middle C)
pub const BASE_NOTE: u8 = 60;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A rectangle of normalized screen space mapped to one pitch
/// Ranges are half-open: `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteZone {
    pub name: String,
    pub pitch: u8,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
}

impl NoteZone {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_range.0 && x < self.x_range.1 && y >= self.y_range.0 && y < self.y_range.1
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x_range.0 + self.x_range.1) / 2.0,
            (self.y_range.0 + self.y_range.1) / 2.0,
        )
    }

    /// True if the two rectangles share any area
    pub fn overlaps(&self, other: &NoteZone) -> bool {
        self.x_range.0 < other.x_range.1
            && other.x_range.0 < self.x_range.1
            && self.y_range.0 < other.y_range.1
            && other.y_range.0 < self.y_range.1
    }
}

/// Name for a zone's note index, e.g. 0 -> "C0", 14 -> "D1"
pub fn note_name(note_index: usize) -> String {
    format!("{}{}", NOTE_NAMES[note_index % 12], note_index / 12)
}

/// Build the 7x5 zone grid
///
/// Octave `o` and zone `z` give note index `o*12 + z*2`, so each row walks
/// C, D, E, F#, G# of its octave. Rows cover y in `[0, 0.98)`, columns
/// cover x in `[0, 1.0)`.
pub fn build_note_zones() -> Vec<NoteZone> {
    let mut zones = Vec::with_capacity(OCTAVE_BANDS * ZONES_PER_OCTAVE);

    for octave in 0..OCTAVE_BANDS {
        for zone in 0..ZONES_PER_OCTAVE {
            let note_index = octave * 12 + zone * 2;

            zones.push(NoteZone {
                name: note_name(note_index),
                pitch: BASE_NOTE + note_index as u8,
                x_range: (zone as f64 * ZONE_WIDTH, (zone + 1) as f64 * ZONE_WIDTH),
                y_range: (octave as f64 * ZONE_HEIGHT, (octave + 1) as f64 * ZONE_HEIGHT),
            });
        }
    }

    zones
}

/// Resolve a normalized position to the zone containing it
/// Positions outside the grid map to no zone.
pub fn position_to_note(zones: &[NoteZone], x: f64, y: f64) -> Option<&NoteZone> {
    zones.iter().find(|zone| zone.contains(x, y))
}
