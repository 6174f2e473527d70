// Sequencer module
// MIDI event model, persisted message log and the note event sequencer

pub mod chord;
pub mod events;
pub mod midi_log;
pub mod note_sequencer;

pub use chord::{chord_triggers, ChordKind};
pub use events::{
    decode_pitch_bend, encode_control_value, encode_pitch_bend, MidiEvent, MidiEventError,
    TimedEvent, CC_MODULATION, CC_SUSTAIN, CC_VOLUME, PITCH_WHEEL_CENTER, PITCH_WHEEL_MAX,
};
pub use midi_log::{LoggedMessage, MidiLog, MidiLogError, MidiLogOptions};
pub use note_sequencer::{ActiveNote, NoteEventSequencer};
