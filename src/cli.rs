//! Command-line argument parsing.

use clap::{Parser, ValueEnum};

use crate::params::audio_constants::MIN_SOUND_DELTA_S;
use crate::params::{
    ColorScheme, GridConfig, ProjectionPolicy, RecordingConfig, RenderConfig, SoundConfig,
    VoiceTimbre,
};

/// Synth timbre flag values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VoiceArg {
    Duo,
    Fm,
}

/// Projection policy flag values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Recolor every cell each tick
    Sweep,
    /// Compact living and decaying cells into separate lists
    Split,
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "Lifewave")]
#[command(about = "Cellular automaton rendered and sonified in real time", long_about = None)]
pub struct Args {
    /// Target render rate (frames per second)
    #[arg(long, value_name = "FPS", default_value_t = 60.0)]
    pub fps: f32,

    /// Simulation step interval (seconds, 0 = every render tick)
    #[arg(long, value_name = "SECONDS", default_value_t = 0.125)]
    pub round_delta: f32,

    /// Audio tick interval (seconds, at least 0.4)
    #[arg(long, value_name = "SECONDS", default_value_t = 0.9)]
    pub sound_delta: f32,

    /// Notes sampled per audio tick
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub max_tones: usize,

    /// Cell edge (pixels)
    #[arg(long, value_name = "PX", default_value_t = 7.0)]
    pub cell_size: f32,

    /// Synth timbre
    #[arg(long, value_enum, default_value_t = VoiceArg::Duo)]
    pub voice: VoiceArg,

    /// Start with sound disabled
    #[arg(long)]
    pub mute: bool,

    /// Light color scheme
    #[arg(long)]
    pub light: bool,

    /// Instance projection policy
    #[arg(long, value_enum, default_value_t = PolicyArg::Sweep)]
    pub policy: PolicyArg,

    /// Pattern placement seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Record frames and audio (duration in seconds)
    #[arg(long, value_name = "SECONDS")]
    pub record: Option<f32>,

    /// Window width (pixels)
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Window height (pixels)
    #[arg(long, default_value_t = 720)]
    pub height: u32,
}

impl Args {
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            window_width: self.width,
            window_height: self.height,
            target_fps: self.fps,
            round_delta_s: self.round_delta,
            color_scheme: if self.light {
                ColorScheme::Light
            } else {
                ColorScheme::Dark
            },
            policy: match self.policy {
                PolicyArg::Sweep => ProjectionPolicy::ColorSweep,
                PolicyArg::Split => ProjectionPolicy::SplitCompaction,
            },
            ..RenderConfig::default()
        }
    }

    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            cell_edge_px: self.cell_size,
            seed: self.seed,
            ..GridConfig::default()
        }
    }

    pub fn sound_config(&self) -> SoundConfig {
        SoundConfig {
            max_tones: self.max_tones,
            sound_delta_s: self.sound_delta.max(MIN_SOUND_DELTA_S),
            voice: match self.voice {
                VoiceArg::Duo => VoiceTimbre::Duo,
                VoiceArg::Fm => VoiceTimbre::Fm,
            },
            sound_enabled: !self.mute,
            ..SoundConfig::default()
        }
    }

    /// Create recording configuration if recording mode is enabled
    pub fn create_recording_config(&self) -> std::io::Result<Option<RecordingConfig>> {
        let Some(duration) = self.record else {
            return Ok(None);
        };
        let config = RecordingConfig::new(duration, self.fps.round().max(1.0) as u32);

        // Create output directories
        std::fs::create_dir_all(config.frames_dir())?;
        std::fs::create_dir_all(&config.output_dir)?;

        Ok(Some(config))
    }
}
