//! Sonification: grid regions → notes → synth voices.

pub mod allocator;
pub mod chromestesia;
pub mod notes;
pub mod system;
pub mod tone_mapper;
pub mod voice;

pub use allocator::{AllocatorState, PolySynth, SynthFactory, VoiceAllocator};
pub use notes::{Letter, Note, NoteGrid};
pub use system::{AudioStatus, AudioSystem, SynthHandle};
pub use tone_mapper::{RegionLayout, ToneMap, ToneMapper};
pub use voice::VoiceBank;
