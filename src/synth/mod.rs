// Synth module
// ADSR envelope, voice rendering, playback backends and the synthesizer worker

pub mod backend;
pub mod engine;
pub mod envelope;
pub mod voice;

pub use backend::{
    list_output_devices, BackendError, NullBackend, PlaybackBackend, RodioBackend, VoiceHandle,
};
pub use engine::{AudioSynthesizer, SynthError, SynthSettings};
pub use envelope::Adsr;
pub use voice::{midi_to_freq, AudioBuffer, Voice, HARMONIC_WEIGHTS};
