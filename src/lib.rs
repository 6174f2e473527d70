// Motion Music - Hand gesture to MIDI and synthesized audio
// Module declarations

pub mod config;
pub mod gesture;
pub mod pipeline;
pub mod sequencer;
pub mod synth;
pub mod sync;

pub use config::{ConfigError, EngineConfig};
pub use gesture::{GestureClassifier, GestureIntent, HandPoseRecord};
pub use pipeline::{MotionSession, SessionError, StatusSink};
pub use sequencer::{MidiEvent, NoteEventSequencer, TimedEvent};
pub use synth::{AudioSynthesizer, NullBackend, PlaybackBackend, RodioBackend};
