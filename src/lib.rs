//! Lifewave library - cellular automaton rendered as instanced quads and
//! sonified through a polyphonic synth

pub mod cli;
pub mod error;
pub mod grid;
pub mod lifecycle;
pub mod params;
pub mod projector;
pub mod rendering;
pub mod scheduler;
pub mod sound;
pub mod visualizer;
