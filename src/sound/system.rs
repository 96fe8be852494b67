//! Audio system: cpal output stream fed by a shared bus of voice banks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use std::sync::{Arc, Mutex};

use super::allocator::{PolySynth, SynthFactory};
use super::notes::Note;
use super::voice::VoiceBank;
use crate::params::{audio_constants::BLOCK_SIZE, RecordingConfig, SoundConfig, VoiceTimbre};

type WavWriter = hound::WavWriter<std::io::BufWriter<std::fs::File>>;

/// Audio transport state, surfaced to the host as a non-fatal status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStatus {
    /// No output device or stream
    Unavailable,
    /// Stream built but waiting for a user gesture
    Suspended,
    Running,
}

/// All live voice banks, mixed by the audio callback
pub struct SynthBus {
    banks: Vec<(u64, VoiceBank)>,
    next_id: u64,
    sample_rate: f32,
    gain: f32,
}

impl SynthBus {
    pub fn new(sample_rate: f32, gain: f32) -> Self {
        Self {
            banks: Vec::new(),
            next_id: 0,
            sample_rate,
            gain,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn add_bank(&mut self, timbre: VoiceTimbre, max_polyphony: usize) -> u64 {
        self.next_id += 1;
        self.banks.push((
            self.next_id,
            VoiceBank::new(timbre, self.sample_rate, max_polyphony, self.gain),
        ));
        self.next_id
    }

    pub fn remove_bank(&mut self, id: u64) {
        self.banks.retain(|(bank_id, _)| *bank_id != id);
    }

    pub fn bank(&self, id: u64) -> Option<&VoiceBank> {
        self.banks.iter().find(|(i, _)| *i == id).map(|(_, b)| b)
    }

    pub fn bank_mut(&mut self, id: u64) -> Option<&mut VoiceBank> {
        self.banks.iter_mut().find(|(i, _)| *i == id).map(|(_, b)| b)
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Mono mix of every bank into `out` (overwrites)
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for (_, bank) in &mut self.banks {
            bank.render(out);
        }
    }
}

/// Cloneable handle the voice allocator builds synths through
#[derive(Clone)]
pub struct SynthHandle {
    bus: Arc<Mutex<SynthBus>>,
    status: Arc<Mutex<AudioStatus>>,
}

impl SynthHandle {
    /// Handle over a bus that no stream plays (tests, muted hosts)
    pub fn detached(bus: SynthBus, status: AudioStatus) -> Self {
        Self {
            bus: Arc::new(Mutex::new(bus)),
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub fn status(&self) -> AudioStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(AudioStatus::Unavailable)
    }

    fn set_status(&self, status: AudioStatus) {
        if let Ok(mut s) = self.status.lock() {
            *s = status;
        }
    }

    pub fn bus(&self) -> &Arc<Mutex<SynthBus>> {
        &self.bus
    }
}

impl SynthFactory for SynthHandle {
    fn create(&mut self, timbre: VoiceTimbre, max_polyphony: usize) -> Box<dyn PolySynth> {
        let id = self
            .bus
            .lock()
            .ok()
            .map(|mut bus| bus.add_bank(timbre, max_polyphony));
        Box::new(BankSynth {
            bus: Arc::clone(&self.bus),
            id,
            max_polyphony,
        })
    }

    fn is_running(&self) -> bool {
        self.status() == AudioStatus::Running
    }
}

/// One voice bank on the bus, driven through [`PolySynth`]
pub struct BankSynth {
    bus: Arc<Mutex<SynthBus>>,
    /// None once disposed
    id: Option<u64>,
    max_polyphony: usize,
}

impl BankSynth {
    fn with_bank<R>(&self, f: impl FnOnce(&mut VoiceBank) -> R) -> Option<R> {
        let id = self.id?;
        let mut bus = self.bus.lock().ok()?;
        bus.bank_mut(id).map(f)
    }
}

impl PolySynth for BankSynth {
    fn set_max_polyphony(&mut self, max_polyphony: usize) {
        self.max_polyphony = max_polyphony;
        self.with_bank(|bank| bank.set_max_polyphony(max_polyphony));
    }

    fn max_polyphony(&self) -> usize {
        self.max_polyphony
    }

    fn trigger_attack(&mut self, notes: &[Note], duration_s: f32) {
        self.with_bank(|bank| {
            for note in notes {
                bank.note_on(*note, duration_s);
            }
        });
    }

    fn trigger_release(&mut self, notes: &[Note]) {
        self.with_bank(|bank| {
            for note in notes {
                bank.note_off(*note);
            }
        });
    }

    fn release_all(&mut self) {
        self.with_bank(VoiceBank::release_all);
    }

    fn dispose(&mut self) {
        if let Some(id) = self.id.take() {
            if let Ok(mut bus) = self.bus.lock() {
                // Release tails would outlive the instance; cut them
                if let Some(bank) = bus.bank_mut(id) {
                    bank.stop_all();
                }
                bus.remove_bank(id);
            }
        }
    }

    fn sounding(&self) -> usize {
        self.with_bank(|bank| bank.sounding()).unwrap_or(0)
    }
}

impl Drop for BankSynth {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Audio system managing the output stream and synth bus
pub struct AudioSystem {
    handle: SynthHandle,

    /// Audio output stream (kept alive)
    stream: Option<cpal::Stream>,

    wav_writer: Option<Arc<Mutex<WavWriter>>>,
}

impl AudioSystem {
    /// Open the default output device. The stream starts suspended.
    pub fn new(
        sound_config: &SoundConfig,
        recording_config: Option<&RecordingConfig>,
    ) -> Result<Self, String> {
        sound_config
            .validate()
            .map_err(|e| format!("Invalid sound config: {}", e))?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("No audio output device found")?;

        let config = device
            .default_output_config()
            .map_err(|e| format!("Failed to get audio config: {}", e))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        info!(
            "Audio: {} @ {}Hz, {} channels",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            channels
        );

        // Create WAV writer if recording
        let wav_writer = match recording_config {
            Some(recording) => {
                let spec = hound::WavSpec {
                    channels: channels as u16,
                    sample_rate,
                    bits_per_sample: 32,
                    sample_format: hound::SampleFormat::Float,
                };
                let writer = hound::WavWriter::create(recording.audio_path(), spec)
                    .map_err(|e| format!("Failed to create WAV writer: {}", e))?;
                Some(Arc::new(Mutex::new(writer)))
            }
            None => None,
        };
        let wav_writer_clone = wav_writer.clone();

        let handle = SynthHandle::detached(
            SynthBus::new(sample_rate as f32, sound_config.gain()),
            AudioStatus::Suspended,
        );
        let bus = Arc::clone(&handle.bus);
        let mut block = vec![0.0f32; BLOCK_SIZE];

        // Build audio output stream
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut bus) = bus.lock() else {
                        data.fill(0.0);
                        return;
                    };

                    let frames_needed = data.len() / channels;
                    let mut frame_idx = 0;

                    // Render in fixed blocks until the device buffer is full
                    while frame_idx < frames_needed {
                        let samples_to_copy = (frames_needed - frame_idx).min(BLOCK_SIZE);
                        bus.render(&mut block[..samples_to_copy]);

                        for (i, &sample) in block[..samples_to_copy].iter().enumerate() {
                            // Safety limiter: hard clip to ±0.5
                            let sample = sample.clamp(-0.5, 0.5);
                            let out_idx = (frame_idx + i) * channels;
                            data[out_idx..out_idx + channels].fill(sample);

                            if let Some(ref writer) = wav_writer_clone {
                                if let Ok(mut w) = writer.lock() {
                                    for _ in 0..channels {
                                        let _ = w.write_sample(sample);
                                    }
                                }
                            }
                        }

                        frame_idx += samples_to_copy;
                    }
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| format!("Failed to build audio stream: {}", e))?;

        // Some backends start playing on build; wait for resume()
        if let Err(e) = stream.pause() {
            warn!("Could not pause audio stream: {}", e);
        }

        Ok(Self {
            handle,
            stream: Some(stream),
            wav_writer,
        })
    }

    /// Placeholder when no device could be opened: notes are still computed
    /// but nothing is ever audible.
    pub fn unavailable(sound_config: &SoundConfig) -> Self {
        Self {
            handle: SynthHandle::detached(
                SynthBus::new(sound_config.sample_rate_hz as f32, sound_config.gain()),
                AudioStatus::Unavailable,
            ),
            stream: None,
            wav_writer: None,
        }
    }

    pub fn status(&self) -> AudioStatus {
        self.handle.status()
    }

    /// Factory handle for the voice allocator
    pub fn handle(&self) -> SynthHandle {
        self.handle.clone()
    }

    /// Start the transport after a user gesture. Returns the new status.
    pub fn resume(&mut self) -> AudioStatus {
        if self.status() != AudioStatus::Suspended {
            return self.status();
        }
        let Some(stream) = self.stream.as_ref() else {
            return self.status();
        };

        match stream.play() {
            Ok(()) => {
                self.handle.set_status(AudioStatus::Running);
                info!("Audio running");
            }
            Err(e) => {
                warn!("Failed to start audio stream: {}", e);
                self.handle.set_status(AudioStatus::Unavailable);
            }
        }
        self.status()
    }

    /// Flush and close the WAV file, if recording
    pub fn finish_recording(&mut self) {
        let Some(writer) = self.wav_writer.take() else {
            return;
        };
        // The stream callback holds the other reference
        self.stream = None;
        match Arc::try_unwrap(writer) {
            Ok(mutex) => match mutex.into_inner() {
                Ok(w) => {
                    if let Err(e) = w.finalize() {
                        warn!("Failed to finalize WAV file: {}", e);
                    }
                }
                Err(_) => warn!("WAV writer lock poisoned"),
            },
            Err(_) => warn!("WAV writer still in use, file left unfinalized"),
        }
        self.handle.set_status(AudioStatus::Unavailable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::allocator::{max_polyphony_for, VoiceAllocator};
    use crate::sound::notes::{NoteGrid, MAJOR_PENTATONIC, MINOR_PENTATONIC};

    fn handle(status: AudioStatus) -> SynthHandle {
        SynthHandle::detached(SynthBus::new(8000.0, 1.0), status)
    }

    #[test]
    fn test_factory_adds_and_dispose_removes_bank() {
        let mut handle = handle(AudioStatus::Running);
        let mut synth = handle.create(VoiceTimbre::Duo, 4);
        assert_eq!(handle.bus().lock().unwrap().bank_count(), 1);

        synth.trigger_attack(&MAJOR_PENTATONIC[..2], 1.0);
        assert_eq!(synth.sounding(), 2);

        synth.dispose();
        assert_eq!(handle.bus().lock().unwrap().bank_count(), 0);
        assert_eq!(synth.sounding(), 0);
    }

    #[test]
    fn test_dropped_synth_leaves_bus() {
        let mut handle = handle(AudioStatus::Running);
        drop(handle.create(VoiceTimbre::Fm, 2));
        assert_eq!(handle.bus().lock().unwrap().bank_count(), 0);
    }

    #[test]
    fn test_running_follows_status() {
        assert!(handle(AudioStatus::Running).is_running());
        assert!(!handle(AudioStatus::Suspended).is_running());
        assert!(!handle(AudioStatus::Unavailable).is_running());
    }

    #[test]
    fn test_allocator_over_real_banks_respects_voice_bound() {
        let handle = handle(AudioStatus::Running);
        let bus = Arc::clone(handle.bus());
        let mut allocator = VoiceAllocator::new(Box::new(handle), VoiceTimbre::Duo, 3, true);
        let bound = max_polyphony_for(3);
        let mut block = vec![0.0; 400];

        for tick in 0..12 {
            let scale = if tick % 2 == 0 {
                &MAJOR_PENTATONIC
            } else {
                &MINOR_PENTATONIC
            };
            let grid = NoteGrid::new(vec![scale[tick..tick + 3].to_vec()]);
            allocator.tick(&grid, 0.9);
            assert!(allocator.sounding() <= bound);

            bus.lock().unwrap().render(&mut block);
            assert!(allocator.sounding() <= bound);
        }

        allocator.set_timbre(VoiceTimbre::Fm);
        assert_eq!(bus.lock().unwrap().bank_count(), 1);
        allocator.teardown();
        assert_eq!(bus.lock().unwrap().bank_count(), 0);
    }

    #[test]
    fn test_unavailable_system_never_runs() {
        let config = SoundConfig {
            sample_rate_hz: 22050,
            ..SoundConfig::default()
        };
        let mut system = AudioSystem::unavailable(&config);
        assert_eq!(system.resume(), AudioStatus::Unavailable);
        assert!(!system.handle().is_running());

        // Without a device the configured rate drives the silent bus
        assert_eq!(system.handle().bus().lock().unwrap().sample_rate(), 22050.0);
    }
}
