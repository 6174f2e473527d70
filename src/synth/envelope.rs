// ADSR envelope
// Piecewise-linear amplitude shape over a fixed note duration

use serde::{Deserialize, Serialize};

use crate::config::AdsrSettings;

/// Attack, decay, sustain level and release, times in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain_level: f64,
    pub release: f64,
}

impl Default for Adsr {
    fn default() -> Self {
        Adsr::from(&AdsrSettings::default())
    }
}

impl From<&AdsrSettings> for Adsr {
    fn from(settings: &AdsrSettings) -> Self {
        Adsr {
            attack: settings.attack,
            decay: settings.decay,
            sustain_level: settings.sustain_level,
            release: settings.release,
        }
    }
}

impl Adsr {
    /// Envelope value at `t` seconds into a note lasting `duration` seconds
    ///
    /// Phases are checked in order (attack, decay, sustain, release), so a
    /// note shorter than attack + decay + release skips straight from decay
    /// into the tail of its release. The result stays within [0, 1].
    pub fn value(&self, t: f64, duration: f64) -> f64 {
        let release_start = duration - self.release;

        let level = if t < self.attack {
            t / self.attack
        } else if t < self.attack + self.decay {
            1.0 - (1.0 - self.sustain_level) * (t - self.attack) / self.decay
        } else if t < release_start {
            self.sustain_level
        } else if self.release > 0.0 {
            self.sustain_level * (1.0 - (t - release_start) / self.release)
        } else {
            0.0
        };

        level.clamp(0.0, 1.0)
    }

    /// Shortest duration that reaches the sustain phase
    pub fn min_full_duration(&self) -> f64 {
        self.attack + self.decay + self.release
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_boundary_values() {
        let adsr = Adsr::default();
        let duration = 1.0;

        assert!(adsr.value(0.0, duration).abs() < EPS);
        assert!((adsr.value(adsr.attack, duration) - 1.0).abs() < EPS);
        assert!((adsr.value(adsr.attack + adsr.decay, duration) - 0.7).abs() < EPS);
        assert!(adsr.value(duration, duration).abs() < EPS);
    }

    #[test]
    fn test_monotonic_within_phases() {
        let adsr = Adsr::default();
        let duration = 1.0;
        let step = 0.001;

        let samples: Vec<(f64, f64)> = (0..=1000)
            .map(|i| {
                let t = i as f64 * step;
                (t, adsr.value(t, duration))
            })
            .collect();

        for pair in samples.windows(2) {
            let (t0, v0) = pair[0];
            let (_, v1) = pair[1];

            if t0 < adsr.attack - step {
                assert!(v1 >= v0, "attack not rising at t={}", t0);
            } else if t0 >= adsr.attack && t0 < adsr.attack + adsr.decay - step {
                assert!(v1 <= v0, "decay not falling at t={}", t0);
            } else if t0 >= adsr.attack + adsr.decay && t0 < duration - adsr.release - step {
                assert!((v1 - v0).abs() < EPS, "sustain not flat at t={}", t0);
            } else if t0 >= duration - adsr.release {
                assert!(v1 <= v0, "release not falling at t={}", t0);
            }
        }
    }

    #[test]
    fn test_short_note_skips_sustain() {
        let adsr = Adsr::default();
        // 0.5s note: release starts at 0.2, inside the decay window
        let duration = 0.5;
        assert!(duration < adsr.min_full_duration());

        // Still in decay at 0.25
        let decay_value = 1.0 - 0.3 * (0.15 / 0.2);
        assert!((adsr.value(0.25, duration) - decay_value).abs() < EPS);

        // Past decay, release picks up mid-way
        let release_value = 0.7 * (1.0 - (0.35 - 0.2) / 0.3);
        assert!((adsr.value(0.35, duration) - release_value).abs() < EPS);
        assert!(adsr.value(duration, duration).abs() < EPS);
    }

    #[test]
    fn test_value_is_bounded() {
        let adsr = Adsr::default();
        assert_eq!(adsr.value(5.0, 1.0), 0.0);
        assert_eq!(adsr.value(-1.0, 1.0), 0.0);
    }
}
