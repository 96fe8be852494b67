//! Rendering, scheduling and recording configuration.

/// Light or dark palette for cell colors and background
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorScheme {
    #[default]
    Dark,
    Light,
}

impl ColorScheme {
    pub fn toggled(self) -> Self {
        match self {
            ColorScheme::Dark => ColorScheme::Light,
            ColorScheme::Light => ColorScheme::Dark,
        }
    }
}

/// How grid state is projected into instance buffers each render tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectionPolicy {
    /// One instance per cell, recolored every tick
    #[default]
    ColorSweep,

    /// Only non-dead cells, compacted into living and decaying sets
    SplitCompaction,
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Window width (pixels)
    pub window_width: u32,

    /// Window height (pixels)
    pub window_height: u32,

    /// Target render rate (ticks per second), independent of monitor refresh
    pub target_fps: f32,

    /// Simulation step interval (seconds)
    /// 0 = advance once per render tick
    pub round_delta_s: f32,

    /// Cell palette
    pub color_scheme: ColorScheme,

    /// Instance projection policy
    pub policy: ProjectionPolicy,

    /// Show the note grid overlay
    pub show_visualizer: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            target_fps: 60.0,
            round_delta_s: 1.0 / 8.0,
            color_scheme: ColorScheme::Dark,
            policy: ProjectionPolicy::ColorSweep,
            show_visualizer: true,
        }
    }
}

impl RenderConfig {
    /// Seconds between render ticks
    pub fn frame_interval_s(&self) -> f32 {
        1.0 / self.target_fps
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.target_fps > 0.0) {
            return Err(format!("Target fps must be > 0, got {}", self.target_fps));
        }
        if !(self.round_delta_s >= 0.0) {
            return Err(format!(
                "Simulation step must be >= 0 s, got {}",
                self.round_delta_s
            ));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err("Window size must be > 0".to_string());
        }
        Ok(())
    }
}

/// Recording mode configuration
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Duration to record (seconds)
    pub duration_secs: f32,

    /// Output directory for frames and audio
    pub output_dir: String,

    /// Frame rate (FPS)
    pub fps: u32,
}

impl RecordingConfig {
    pub fn new(duration_secs: f32, fps: u32) -> Self {
        Self {
            duration_secs,
            output_dir: "recording".to_string(),
            fps,
        }
    }

    /// Total number of frames to capture
    pub fn total_frames(&self) -> usize {
        (self.duration_secs * self.fps as f32).ceil() as usize
    }

    /// Frame directory path
    pub fn frames_dir(&self) -> String {
        format!("{}/frames", self.output_dir)
    }

    /// Audio file path
    pub fn audio_path(&self) -> String {
        format!("{}/audio.wav", self.output_dir)
    }
}
