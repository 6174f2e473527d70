// Pipeline module
// Session orchestration from pose records to MIDI and audio, plus frame tracing

pub mod session;
pub mod trace;

pub use session::{
    rodio_backend_factory, shared_backend_factory, BackendFactory, LogStatusSink, MotionSession,
    SessionError, StatusSink,
};
pub use trace::{read_trace_file, FrameTrace, TraceError, TraceWriter};
