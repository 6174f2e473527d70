// Gesture module
// Zone grid, pose record types and the rule-based gesture classifier

pub mod classifier;
pub mod types;
pub mod zones;

pub use classifier::{classify_pattern, ClassifierConfig, GestureClassifier, HandSnapshot};
pub use types::{
    ControlName, Finger, GestureAction, GestureIntent, HandPoseRecord, Handedness, NoteTrigger,
    Point,
};
pub use zones::{build_note_zones, note_name, position_to_note, NoteZone};
