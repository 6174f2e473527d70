// Gesture classifier
// Turns hand-pose records into note triggers, continuous controls and a gesture action

use std::collections::{BTreeMap, HashMap};

use crate::config::{validate_velocity, EngineConfig};
use crate::gesture::types::{
    ControlName, Finger, GestureAction, GestureIntent, HandPoseRecord, Handedness, NoteTrigger,
    Point,
};
use crate::gesture::zones::{build_note_zones, position_to_note, NoteZone};

/// Hand size treated as "normal" (velocity factor 1.0)
const REFERENCE_HAND_SIZE: f64 = 100.0;

/// Speed (px/s) that maps to a full-scale factor of 1.0
const SPEED_SCALE: f64 = 100.0;

/// Thresholds and frame geometry used by the classifier
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base velocity before size/speed scaling
    pub base_velocity: u8,

    /// Minimum hand speed (px/s) before movement maps to pitch bend or modulation
    pub velocity_threshold: f64,

    /// Frame size used to normalize pixel coordinates
    pub frame_width: f64,
    pub frame_height: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ClassifierConfig {
    fn from(config: &EngineConfig) -> Self {
        ClassifierConfig {
            base_velocity: config.default_velocity,
            velocity_threshold: config.velocity_threshold,
            frame_width: config.frame_width,
            frame_height: config.frame_height,
        }
    }
}

/// Most recent observation of one hand
#[derive(Debug, Clone)]
pub struct HandSnapshot {
    pub center: Point,
    pub timestamp: f64,
    pub finger_tips: BTreeMap<Finger, Point>,
}

/// First difference of the hand center against the previous frame
#[derive(Debug, Clone, Copy)]
struct Motion {
    dx: f64,
    dy: f64,
    /// Pixels per second
    speed: f64,
}

/// Rule-based gesture classifier
///
/// Keeps one slot per handedness holding only the latest center and
/// timestamp; speed is a single first difference, not a windowed estimate.
pub struct GestureClassifier {
    config: ClassifierConfig,
    zones: Vec<NoteZone>,
    previous: HashMap<Handedness, HandSnapshot>,
}

impl GestureClassifier {
    /// Create a classifier with default configuration
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default())
    }

    /// Create a classifier with custom configuration
    pub fn with_config(config: ClassifierConfig) -> Self {
        GestureClassifier {
            config,
            zones: build_note_zones(),
            previous: HashMap::new(),
        }
    }

    pub fn zones(&self) -> &[NoteZone] {
        &self.zones
    }

    /// Latest observation recorded for a hand
    pub fn last_seen(&self, handedness: Handedness) -> Option<&HandSnapshot> {
        self.previous.get(&handedness)
    }

    /// Forget all per-hand history
    pub fn reset(&mut self) {
        self.previous.clear();
    }

    /// Analyze one frame for one hand
    ///
    /// A record without a center yields an empty intent and leaves the
    /// hand's history untouched.
    pub fn analyze(&mut self, record: &HandPoseRecord) -> GestureIntent {
        let handedness = record.handedness;

        let center = match record.center {
            Some(center) => center,
            None => {
                log::debug!("Pose record for {} hand has no center, skipping", handedness);
                return GestureIntent::empty(handedness, record.timestamp);
            }
        };

        let motion = self.motion_since_last(handedness, center, record.timestamp);

        let notes = self.note_triggers(record, motion);
        let controls = self.movement_controls(center, motion);
        let (action, extended_fingers) = classify_pattern(record);

        self.previous.insert(
            handedness,
            HandSnapshot {
                center,
                timestamp: record.timestamp,
                finger_tips: record.finger_tips.clone(),
            },
        );

        GestureIntent {
            handedness,
            timestamp: record.timestamp,
            notes,
            controls,
            action: Some(action),
            extended_fingers,
        }
    }

    /// Displacement and speed against the previous frame of the same hand
    /// `None` if there is no previous frame or no time has elapsed.
    fn motion_since_last(
        &self,
        handedness: Handedness,
        center: Point,
        timestamp: f64,
    ) -> Option<Motion> {
        let prev = self.previous.get(&handedness)?;
        let elapsed = timestamp - prev.timestamp;
        if elapsed <= 0.0 {
            return None;
        }

        Some(Motion {
            dx: center.x - prev.center.x,
            dy: center.y - prev.center.y,
            speed: center.distance_to(&prev.center) / elapsed,
        })
    }

    /// Emit a trigger for every extended finger whose tip lands in a zone
    fn note_triggers(&self, record: &HandPoseRecord, motion: Option<Motion>) -> Vec<NoteTrigger> {
        let velocity = self.note_velocity(record, motion);
        let mut notes = Vec::new();

        for finger in record.extended_fingers() {
            let tip = match record.finger_tips.get(&finger) {
                Some(tip) => tip,
                None => continue,
            };

            let position = Point::new(
                tip.x / self.config.frame_width,
                tip.y / self.config.frame_height,
            );

            if let Some(zone) = position_to_note(&self.zones, position.x, position.y) {
                notes.push(NoteTrigger {
                    pitch: zone.pitch.min(127),
                    velocity,
                    finger,
                    note_name: zone.name.clone(),
                    position,
                });
            }
        }

        notes
    }

    /// Velocity from hand size and hand speed
    ///
    /// `base * min(size/100, 2) * speed_factor`, where the speed factor is
    /// `min(speed/100, 2)` against the previous frame or 1.0 without one.
    fn note_velocity(&self, record: &HandPoseRecord, motion: Option<Motion>) -> u8 {
        let hand_size = record.hand_size.unwrap_or(REFERENCE_HAND_SIZE);
        let size_factor = (hand_size / REFERENCE_HAND_SIZE).min(2.0);

        let speed_factor = match motion {
            Some(m) => (m.speed / SPEED_SCALE).min(2.0),
            None => 1.0,
        };

        let velocity = (self.config.base_velocity as f64 * size_factor * speed_factor).round();
        validate_velocity(velocity as i32)
    }

    /// Map hand movement and position to continuous controls
    fn movement_controls(
        &self,
        center: Point,
        motion: Option<Motion>,
    ) -> BTreeMap<ControlName, f64> {
        let mut controls = BTreeMap::new();

        if let Some(m) = motion {
            if m.speed > self.config.velocity_threshold {
                let amount = (m.speed / SPEED_SCALE).min(1.0);

                if m.dx.abs() >= m.dy.abs() {
                    let direction = if m.dx > 0.0 { 1.0 } else { -1.0 };
                    controls.insert(ControlName::PitchBend, direction * amount);
                } else {
                    // Screen y grows downward; moving up is positive
                    let direction = if m.dy < 0.0 { 1.0 } else { -1.0 };
                    controls.insert(ControlName::Modulation, direction * amount);
                }
            }
        }

        let norm_x = center.x / self.config.frame_width;
        let norm_y = center.y / self.config.frame_height;

        controls.insert(ControlName::PositionX, norm_x);
        controls.insert(ControlName::PositionY, norm_y);
        controls.insert(ControlName::Volume, (1.0 - norm_y).max(0.1));

        controls
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify the hand shape, first match wins:
/// fist, open hand, pointing, peace sign, anything else.
/// Also returns the extended-finger count.
pub fn classify_pattern(record: &HandPoseRecord) -> (GestureAction, usize) {
    let extended = record.extended_fingers();
    let count = extended.len();

    let action = if count == 0 {
        GestureAction::StopAll
    } else if count >= 4 {
        GestureAction::Sustain
    } else if extended == [Finger::Index] {
        GestureAction::SingleNote
    } else if extended == [Finger::Index, Finger::Middle] {
        GestureAction::ChordMode
    } else {
        GestureAction::MultiNote
    };

    (action, count)
}
