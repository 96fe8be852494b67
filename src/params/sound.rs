//! Sonification parameters and audio constants.

use self::audio_constants::{MIN_SOUND_DELTA_S, SYNTH_ATTACK_MINIMUM_DURATION_S};

/// Synthesizer timbre backing the polyphonic voice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VoiceTimbre {
    /// Two detuned oscillators with slow vibrato
    #[default]
    Duo,

    /// Two-operator FM
    Fm,
}

impl VoiceTimbre {
    pub fn toggled(self) -> Self {
        match self {
            VoiceTimbre::Duo => VoiceTimbre::Fm,
            VoiceTimbre::Fm => VoiceTimbre::Duo,
        }
    }
}

/// Sound configuration
#[derive(Debug, Clone)]
pub struct SoundConfig {
    /// Polyphony ceiling for one audio tick (notes)
    /// The synth itself gets twice this so outgoing and incoming notes overlap
    pub max_tones: usize,

    /// Audio tick interval (seconds)
    pub sound_delta_s: f32,

    /// Selected timbre
    pub voice: VoiceTimbre,

    /// Master switch for audible output (notes are still computed when off)
    pub sound_enabled: bool,

    /// Sample rate (Hz) for the silent bus when no output device exists.
    /// A live stream always runs at the device's own rate.
    pub sample_rate_hz: u32,

    /// Synth output level (dB)
    pub volume_db: f32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            max_tones: 8,
            sound_delta_s: 0.9,
            voice: VoiceTimbre::Duo,
            sound_enabled: true,
            sample_rate_hz: 44100,
            volume_db: -24.0,
        }
    }
}

impl SoundConfig {
    /// Audio tick interval, never shorter than the minimum audible attack
    pub fn audio_interval_s(&self) -> f32 {
        self.sound_delta_s.max(SYNTH_ATTACK_MINIMUM_DURATION_S)
    }

    /// Linear output gain
    pub fn gain(&self) -> f32 {
        10f32.powf(self.volume_db / 20.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_tones > audio_constants::MAX_TONES {
            return Err(format!(
                "max tones must be <= {}, got {}",
                audio_constants::MAX_TONES,
                self.max_tones
            ));
        }
        if !(self.sound_delta_s >= MIN_SOUND_DELTA_S) {
            return Err(format!(
                "Sound delta must be >= {} s, got {}",
                MIN_SOUND_DELTA_S, self.sound_delta_s
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err("Sample rate must be > 0".to_string());
        }
        Ok(())
    }
}

/// Audio constants
pub mod audio_constants {
    /// Audio block size (samples rendered per voice-bank pass)
    pub const BLOCK_SIZE: usize = 128;

    /// Shortest attack the synth will play (seconds)
    pub const SYNTH_ATTACK_MINIMUM_DURATION_S: f32 = 0.1;

    /// Shortest audio tick the UI allows (seconds)
    pub const MIN_SOUND_DELTA_S: f32 = 0.4;

    /// Upper bound on the polyphony ceiling
    pub const MAX_TONES: usize = 32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_interval_floor() {
        let config = SoundConfig {
            sound_delta_s: 0.01,
            ..SoundConfig::default()
        };
        assert!((config.audio_interval_s() - SYNTH_ATTACK_MINIMUM_DURATION_S).abs() < 1e-6);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gain_from_db() {
        let config = SoundConfig::default();
        // -24 dB ≈ 0.063
        assert!((config.gain() - 0.0631).abs() < 0.001);
    }

    #[test]
    fn test_max_tones_bound() {
        let config = SoundConfig {
            max_tones: 33,
            ..SoundConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SoundConfig::default().validate().is_ok());
    }
}
