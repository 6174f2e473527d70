// Gesture types
// Hand-pose input records and the musical intent derived from them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which hand a pose record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Handedness {
    Left,
    Right,
    #[default]
    Unknown,
}

impl Handedness {
    /// Parse the tag reported by the hand-pose source
    /// Accepts both PascalCase and lowercase; anything else is `Unknown`
    pub fn from_string(s: &str) -> Self {
        match s {
            "Left" | "left" => Handedness::Left,
            "Right" | "right" => Handedness::Right,
            _ => Handedness::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
            Handedness::Unknown => "Unknown",
        }
    }
}

impl From<String> for Handedness {
    fn from(s: String) -> Self {
        Handedness::from_string(&s)
    }
}

impl From<Handedness> for String {
    fn from(h: Handedness) -> Self {
        h.as_str().to_string()
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finger tags, ordered thumb to pinky
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }
}

/// A 2D point. Pixel space for pose records, normalized space for zones.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One frame of hand-pose data from the tracking collaborator
///
/// Only `timestamp` is required. A record without `center` is treated as
/// malformed and yields an empty intent; missing finger maps simply
/// produce no triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandPoseRecord {
    #[serde(default)]
    pub handedness: Handedness,

    /// Hand center in pixel space
    #[serde(default)]
    pub center: Option<Point>,

    /// Finger tip positions in pixel space
    #[serde(default)]
    pub finger_tips: BTreeMap<Finger, Point>,

    /// Per-finger extension state; absent fingers count as folded
    #[serde(default)]
    pub finger_extended: BTreeMap<Finger, bool>,

    /// Wrist to middle-tip distance in pixels
    #[serde(default)]
    pub hand_size: Option<f64>,

    /// Wrist to middle-knuckle angle in radians
    #[serde(default)]
    pub hand_angle: Option<f64>,

    /// Capture time in seconds
    pub timestamp: f64,
}

impl HandPoseRecord {
    pub fn is_extended(&self, finger: Finger) -> bool {
        self.finger_extended.get(&finger).copied().unwrap_or(false)
    }

    /// Fingers flagged as extended, thumb first
    pub fn extended_fingers(&self) -> Vec<Finger> {
        Finger::ALL
            .iter()
            .copied()
            .filter(|f| self.is_extended(*f))
            .collect()
    }
}

/// A candidate note produced by an extended finger landing in a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteTrigger {
    /// MIDI pitch (0-127)
    pub pitch: u8,

    /// MIDI velocity (1-127)
    pub velocity: u8,

    /// Finger that produced the trigger
    pub finger: Finger,

    /// Zone name, e.g. "C0"
    pub note_name: String,

    /// Normalized tip position the zone was resolved from
    pub position: Point,
}

/// Discrete hand pattern recognized in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureAction {
    /// Fist: no fingers extended
    StopAll,
    /// Open hand: four or more fingers extended
    Sustain,
    /// Pointing: index only
    SingleNote,
    /// Peace sign: index and middle only
    ChordMode,
    /// Anything else
    MultiNote,
}

impl GestureAction {
    /// Name of the hand shape behind the action
    pub fn gesture_type(&self) -> &'static str {
        match self {
            GestureAction::StopAll => "fist",
            GestureAction::Sustain => "open_hand",
            GestureAction::SingleNote => "pointing",
            GestureAction::ChordMode => "peace",
            GestureAction::MultiNote => "custom",
        }
    }
}

/// Continuous controls derived from hand movement and position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlName {
    /// [-1, 1], horizontal motion
    PitchBend,
    /// [-1, 1], vertical motion, upward positive
    Modulation,
    /// [0.1, 1], higher on screen is louder
    Volume,
    /// [0, 1], normalized center
    PositionX,
    /// [0, 1], normalized center
    PositionY,
}

/// Musical intent of a single hand in a single frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureIntent {
    pub handedness: Handedness,

    /// Capture time in seconds, copied from the pose record
    pub timestamp: f64,

    /// Candidate notes in finger order
    pub notes: Vec<NoteTrigger>,

    pub controls: BTreeMap<ControlName, f64>,

    /// Classified pattern; `None` for a malformed record
    pub action: Option<GestureAction>,

    /// Number of extended fingers, for diagnostics
    pub extended_fingers: usize,
}

impl GestureIntent {
    /// Intent carrying no triggers, no controls and no action
    pub fn empty(handedness: Handedness, timestamp: f64) -> Self {
        GestureIntent {
            handedness,
            timestamp,
            notes: Vec::new(),
            controls: BTreeMap::new(),
            action: None,
            extended_fingers: 0,
        }
    }

    pub fn control(&self, name: ControlName) -> Option<f64> {
        self.controls.get(&name).copied()
    }
}
