// Voice rendering
// Additive harmonic tone shaped by the ADSR envelope, quantized to 16-bit PCM

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::envelope::Adsr;

/// Relative amplitudes of the fundamental and its first three overtones
pub const HARMONIC_WEIGHTS: [f64; 4] = [1.0, 0.3, 0.2, 0.1];

/// Equal-temperament frequency of a MIDI note (A4 = 69 = 440 Hz)
pub fn midi_to_freq(midi_note: u8) -> f64 {
    440.0 * 2.0_f64.powf((midi_note as f64 - 69.0) / 12.0)
}

/// One note to be rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub pitch: u8,
    pub frequency: f64,
    pub velocity: u8,

    /// `(velocity / 127) * master_volume`
    pub gain: f64,

    /// Seconds
    pub duration: f64,

    pub envelope: Adsr,
}

impl Voice {
    pub fn new(pitch: u8, velocity: u8, master_volume: f32, duration: f64, envelope: Adsr) -> Self {
        Voice {
            pitch,
            frequency: midi_to_freq(pitch),
            velocity,
            gain: (velocity as f64 / 127.0) * master_volume as f64,
            duration,
            envelope,
        }
    }

    /// Unscaled waveform value at `t` seconds
    fn waveform(&self, t: f64) -> f64 {
        HARMONIC_WEIGHTS
            .iter()
            .enumerate()
            .map(|(i, weight)| weight * (2.0 * PI * self.frequency * (i + 1) as f64 * t).sin())
            .sum()
    }

    /// Render the whole note as interleaved 16-bit PCM
    ///
    /// The mono signal is duplicated into every channel. Values are clamped
    /// to full scale before quantization, so loud chords clip instead of wrapping.
    pub fn render(&self, sample_rate: u32, channels: u16) -> AudioBuffer {
        let frame_count = (self.duration * sample_rate as f64) as usize;
        let channels = channels.max(1);
        let mut samples = Vec::with_capacity(frame_count * channels as usize);

        for frame in 0..frame_count {
            let t = frame as f64 / sample_rate as f64;
            let value = self.waveform(t) * self.envelope.value(t, self.duration) * self.gain;
            let quantized = quantize(value);

            for _ in 0..channels {
                samples.push(quantized);
            }
        }

        AudioBuffer {
            samples,
            sample_rate,
            channels,
        }
    }
}

/// Scale a float sample to i16, clipping at full scale
fn quantize(value: f64) -> i16 {
    (value * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Interleaved 16-bit PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_ms(&self) -> u64 {
        (self.frames() as u64 * 1000) / self.sample_rate.max(1) as u64
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> i16 {
        self.samples
            .iter()
            .map(|s| s.saturating_abs())
            .max()
            .unwrap_or(0)
    }

    /// Samples of one channel
    pub fn channel(&self, index: u16) -> Vec<i16> {
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.channels.max(1) as usize)
            .copied()
            .collect()
    }

    /// Encode as a 16-bit PCM WAV file
    pub fn to_wav(&self) -> Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }
}
