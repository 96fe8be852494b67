//! Parameter definitions with units and documented semantics.
//!
//! Defaults mirror what the surrounding UI would hand the pipeline:
//! - Grid: cell edge in pixels, seeding strata, RNG seed
//! - Render: target frame rate, simulation step, color scheme
//! - Sound: polyphony ceiling, audio tick, voice timbre

mod grid;
mod render;
mod sound;

// Re-export all types
pub use grid::GridConfig;
pub use render::{ColorScheme, ProjectionPolicy, RecordingConfig, RenderConfig};
pub use sound::{audio_constants, SoundConfig, VoiceTimbre};
