// Playback backends
// Abstract "play this buffer" / "stop this voice" device plus a rodio implementation

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use super::voice::AudioBuffer;
use crate::sync::lock_or_recover;

/// How long `RodioBackend::open` waits for the output thread to report back
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No output device available")]
    NoOutputDevice,
    #[error("Output device not found: {0}")]
    DeviceNotFound(String),
    #[error("Failed to enumerate output devices: {0}")]
    Devices(String),
    #[error("Failed to open output stream: {0}")]
    Stream(String),
    #[error("Failed to play voice: {0}")]
    Play(String),
}

/// A voice handed to the device; stopping it silences the buffer
pub trait VoiceHandle: Send {
    fn stop(&mut self);
}

/// Device that plays rendered buffers
pub trait PlaybackBackend: Send + Sync {
    /// Start playing `buffer` immediately
    fn play(&self, buffer: &AudioBuffer) -> Result<Box<dyn VoiceHandle>, BackendError>;

    fn name(&self) -> &str;
}

/// Names of every output device on the default host
pub fn list_output_devices() -> Result<Vec<String>, BackendError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| BackendError::Devices(e.to_string()))?;

    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

/// Plays voices through rodio
///
/// The output stream is not `Send`, so it lives on a dedicated thread for
/// the lifetime of the backend; voices are opened through its handle.
pub struct RodioBackend {
    handle: Mutex<OutputStreamHandle>,
    device_name: String,
    shutdown: Arc<AtomicBool>,
    device_thread: Option<JoinHandle<()>>,
}

impl RodioBackend {
    /// Open the named output device, or the host default for `None`
    pub fn open(device_name: Option<&str>) -> Result<Self, BackendError> {
        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let requested = device_name.map(str::to_owned);

        let device_thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match open_stream(requested.as_deref()) {
                    Ok((stream, handle, name)) => {
                        if tx.send(Ok((handle, name))).is_err() {
                            return;
                        }
                        stream
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive until the backend is dropped
                while !shutdown_flag.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
            })
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        match rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok((handle, name))) => {
                log::info!("Audio output opened on {}", name);
                Ok(RodioBackend {
                    handle: Mutex::new(handle),
                    device_name: name,
                    shutdown,
                    device_thread: Some(device_thread),
                })
            }
            Ok(Err(e)) => {
                let _ = device_thread.join();
                Err(e)
            }
            Err(_) => {
                shutdown.store(true, Ordering::SeqCst);
                Err(BackendError::Stream(
                    "Output thread did not report back".to_string(),
                ))
            }
        }
    }
}

fn open_stream(
    device_name: Option<&str>,
) -> Result<(OutputStream, OutputStreamHandle, String), BackendError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| BackendError::Devices(e.to_string()))?
            .find(|device| device.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| BackendError::DeviceNotFound(wanted.to_string()))?,
        None => host
            .default_output_device()
            .ok_or(BackendError::NoOutputDevice)?,
    };

    let name = device.name().unwrap_or_else(|_| "unknown device".to_string());
    let (stream, handle) =
        OutputStream::try_from_device(&device).map_err(|e| BackendError::Stream(e.to_string()))?;

    Ok((stream, handle, name))
}

impl PlaybackBackend for RodioBackend {
    fn play(&self, buffer: &AudioBuffer) -> Result<Box<dyn VoiceHandle>, BackendError> {
        let sink = {
            let handle = lock_or_recover(&self.handle);
            Sink::try_new(&handle).map_err(|e| BackendError::Play(e.to_string()))?
        };

        sink.append(SamplesBuffer::new(
            buffer.channels,
            buffer.sample_rate,
            buffer.samples.clone(),
        ));

        Ok(Box::new(RodioVoice { sink }))
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.device_thread.take() {
            let _ = thread.join();
        }
    }
}

struct RodioVoice {
    sink: Sink,
}

impl VoiceHandle for RodioVoice {
    fn stop(&mut self) {
        self.sink.stop();
    }
}

/// Discards audio; used for offline replays
#[derive(Debug, Default)]
pub struct NullBackend {
    plays: AtomicUsize,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffers handed to this backend
    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl PlaybackBackend for NullBackend {
    fn play(&self, _buffer: &AudioBuffer) -> Result<Box<dyn VoiceHandle>, BackendError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NullVoice))
    }

    fn name(&self) -> &str {
        "null"
    }
}

struct NullVoice;

impl VoiceHandle for NullVoice {
    fn stop(&mut self) {}
}


#[cfg(test)]
mod tests {
    use super::testing::{BackendCall, RecordingBackend};
    use super::*;
    use crate::synth::envelope::Adsr;
    use crate::synth::voice::Voice;

    fn buffer() -> AudioBuffer {
        Voice::new(60, 100, 0.5, 0.1, Adsr::default()).render(8000, 2)
    }

    #[test]
    fn test_null_backend_counts_plays() {
        let backend = NullBackend::new();
        let mut voice = backend.play(&buffer()).unwrap();
        voice.stop();
        backend.play(&buffer()).unwrap();

        assert_eq!(backend.play_count(), 2);
        assert_eq!(backend.name(), "null");
    }

    #[test]
    fn test_recording_backend_tracks_calls() {
        let backend = RecordingBackend::default();
        let mut first = backend.play(&buffer()).unwrap();
        let _second = backend.play(&buffer()).unwrap();
        first.stop();

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], BackendCall::Play { voice: 0, frames: 800, .. }));
        assert_eq!(calls[2], BackendCall::Stop { voice: 0 });
    }

    #[test]
    fn test_backends_are_usable_as_trait_objects() {
        let backends: Vec<Arc<dyn PlaybackBackend>> =
            vec![Arc::new(NullBackend::new()), Arc::new(RecordingBackend::default())];

        for backend in backends {
            assert!(backend.play(&buffer()).is_ok());
        }
    }
}
