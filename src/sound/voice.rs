//! Polyphonic synth voices.
//!
//! A [`VoiceBank`] is a fixed pool of `max_polyphony` voices for one timbre.
//! When every voice is busy, a new note steals the voice that has been
//! releasing longest, otherwise the oldest held one, so the number of
//! sounding voices can never exceed the pool size.

use std::f32::consts::TAU;

use super::notes::Note;
use crate::params::VoiceTimbre;

/// Linear ADSR envelope parameters (seconds, sustain level 0..1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack_s: f32,
    pub decay_s: f32,
    pub sustain: f32,
    pub release_s: f32,
}

impl Adsr {
    pub fn for_timbre(timbre: VoiceTimbre) -> Self {
        match timbre {
            VoiceTimbre::Duo => Self {
                attack_s: 0.01,
                decay_s: 0.2,
                sustain: 0.6,
                release_s: 0.8,
            },
            VoiceTimbre::Fm => Self {
                attack_s: 0.005,
                decay_s: 0.3,
                sustain: 0.4,
                release_s: 0.6,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
struct Envelope {
    adsr: Adsr,
    stage: Stage,
    level: f32,
    release_from: f32,
}

impl Envelope {
    fn new(adsr: Adsr) -> Self {
        Self {
            adsr,
            stage: Stage::Idle,
            level: 0.0,
            release_from: 0.0,
        }
    }

    fn trigger(&mut self) {
        self.stage = Stage::Attack;
    }

    fn release(&mut self) {
        if matches!(self.stage, Stage::Attack | Stage::Decay | Stage::Sustain) {
            self.release_from = self.level;
            self.stage = Stage::Release;
        }
    }

    fn step(&mut self, dt: f32) -> f32 {
        match self.stage {
            Stage::Idle => self.level = 0.0,
            Stage::Attack => {
                self.level += dt / self.adsr.attack_s.max(1e-4);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= dt * (1.0 - self.adsr.sustain) / self.adsr.decay_s.max(1e-4);
                if self.level <= self.adsr.sustain {
                    self.level = self.adsr.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                self.level -= dt * self.release_from.max(1e-3) / self.adsr.release_s.max(1e-4);
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

#[derive(Debug, Clone)]
struct Voice {
    note: Option<Note>,
    frequency_hz: f32,
    phase: f32,
    phase_b: f32,
    vibrato_phase: f32,
    envelope: Envelope,
    /// Samples left before the note releases itself
    hold_samples: u64,
    /// Event sequence numbers for stealing order
    started_at: u64,
    released_at: u64,
}

impl Voice {
    fn new(adsr: Adsr) -> Self {
        Self {
            note: None,
            frequency_hz: 0.0,
            phase: 0.0,
            phase_b: 0.0,
            vibrato_phase: 0.0,
            envelope: Envelope::new(adsr),
            hold_samples: 0,
            started_at: 0,
            released_at: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.envelope.stage == Stage::Idle
    }

    fn is_held(&self) -> bool {
        matches!(
            self.envelope.stage,
            Stage::Attack | Stage::Decay | Stage::Sustain
        )
    }

    fn is_releasing(&self) -> bool {
        self.envelope.stage == Stage::Release
    }

    fn next_sample(&mut self, timbre: VoiceTimbre, sample_rate: f32) -> f32 {
        if self.is_idle() {
            return 0.0;
        }

        let dt = 1.0 / sample_rate;
        let level = self.envelope.step(dt);

        let sample = match timbre {
            VoiceTimbre::Duo => {
                // Two slightly detuned oscillators with a slow shared vibrato
                self.vibrato_phase = (self.vibrato_phase + 5.0 * dt).fract();
                let vibrato = 1.0 + 0.004 * (TAU * self.vibrato_phase).sin();
                let f = self.frequency_hz * vibrato;

                self.phase = (self.phase + f * dt).fract();
                self.phase_b = (self.phase_b + f * 1.005 * dt).fract();

                let sine = (TAU * self.phase).sin();
                let triangle = 4.0 * (self.phase_b - 0.5).abs() - 1.0;
                0.5 * (sine + triangle)
            }
            VoiceTimbre::Fm => {
                // Carrier at f, modulator at 3f, brightness follows the envelope
                self.phase = (self.phase + self.frequency_hz * dt).fract();
                self.phase_b = (self.phase_b + 3.0 * self.frequency_hz * dt).fract();

                let index = 2.0 * level;
                (TAU * self.phase + index * (TAU * self.phase_b).sin()).sin()
            }
        };

        if self.is_held() {
            if self.hold_samples == 0 {
                self.envelope.release();
            } else {
                self.hold_samples -= 1;
            }
        }

        if self.is_idle() {
            self.note = None;
        }

        sample * level
    }
}

/// Fixed pool of voices for one timbre.
#[derive(Debug, Clone)]
pub struct VoiceBank {
    timbre: VoiceTimbre,
    sample_rate: f32,
    gain: f32,
    voices: Vec<Voice>,
    events: u64,
}

impl VoiceBank {
    pub fn new(timbre: VoiceTimbre, sample_rate: f32, max_polyphony: usize, gain: f32) -> Self {
        let adsr = Adsr::for_timbre(timbre);
        Self {
            timbre,
            sample_rate,
            gain,
            voices: (0..max_polyphony).map(|_| Voice::new(adsr)).collect(),
            events: 0,
        }
    }

    pub fn timbre(&self) -> VoiceTimbre {
        self.timbre
    }

    pub fn max_polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Resize the pool; shrinking drops idle voices first, then the oldest.
    pub fn set_max_polyphony(&mut self, max_polyphony: usize) {
        if max_polyphony >= self.voices.len() {
            let adsr = Adsr::for_timbre(self.timbre);
            self.voices.resize_with(max_polyphony, || Voice::new(adsr));
            return;
        }

        // Busy voices last, most recent at the very end
        self.voices
            .sort_by_key(|v| (!v.is_idle(), v.is_held(), v.started_at));
        let excess = self.voices.len() - max_polyphony;
        self.voices.drain(..excess);
    }

    /// Voices currently producing sound (held or releasing)
    pub fn sounding(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_idle()).count()
    }

    /// Voices still held (not yet released)
    pub fn held(&self) -> usize {
        self.voices.iter().filter(|v| v.is_held()).count()
    }

    /// Start a note that releases itself after `duration_s`.
    pub fn note_on(&mut self, note: Note, duration_s: f32) {
        let Some(index) = self.allocate() else {
            return;
        };

        self.events += 1;
        let voice = &mut self.voices[index];
        voice.note = Some(note);
        voice.frequency_hz = note.frequency_hz();
        voice.phase = 0.0;
        voice.phase_b = 0.0;
        voice.hold_samples = (duration_s.max(0.0) * self.sample_rate) as u64;
        voice.started_at = self.events;
        voice.envelope.level = 0.0;
        voice.envelope.trigger();
    }

    /// Release every held voice playing `note`
    pub fn note_off(&mut self, note: Note) {
        self.events += 1;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.is_held() && v.note == Some(note))
        {
            voice.envelope.release();
            voice.released_at = self.events;
        }
    }

    pub fn release_all(&mut self) {
        self.events += 1;
        for voice in self.voices.iter_mut().filter(|v| v.is_held()) {
            voice.envelope.release();
            voice.released_at = self.events;
        }
    }

    /// Silence every voice immediately
    pub fn stop_all(&mut self) {
        for voice in &mut self.voices {
            voice.envelope.stage = Stage::Idle;
            voice.envelope.level = 0.0;
            voice.note = None;
        }
    }

    fn allocate(&self) -> Option<usize> {
        if let Some(free) = self.voices.iter().position(Voice::is_idle) {
            return Some(free);
        }

        let longest_releasing = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_releasing())
            .min_by_key(|(_, v)| v.released_at)
            .map(|(i, _)| i);

        longest_releasing.or_else(|| {
            self.voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.started_at)
                .map(|(i, _)| i)
        })
    }

    /// Mix all voices into `out` (mono, added to existing content)
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample += self.next_sample();
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let (timbre, sample_rate) = (self.timbre, self.sample_rate);
        let mix: f32 = self
            .voices
            .iter_mut()
            .map(|v| v.next_sample(timbre, sample_rate))
            .sum();
        mix * self.gain
    }
}
