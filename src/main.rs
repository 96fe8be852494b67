//! Lifewave - a Game of Life you can hear
//!
//! Cells fade through three decay stages on screen while regions of the
//! grid are summed into pentatonic chords every audio tick.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use lifewave::cli::Args;
use lifewave::error::LifewaveError;
use lifewave::grid::LifeEngine;
use lifewave::lifecycle::{FrameOutcome, LifecycleController};
use lifewave::params::*;
use lifewave::rendering::RenderSystem;
use lifewave::sound::{AudioStatus, AudioSystem, NoteGrid};
use lifewave::visualizer::NoteVisualizer;

/// Main application state
struct App {
    // Window and rendering
    window: Option<Arc<Window>>,
    render_system: Option<RenderSystem>,

    // Pipeline
    lifecycle: LifecycleController<LifeEngine>,
    audio: AudioSystem,
    visualizer: NoteVisualizer,
    /// Filled by the lifecycle's note sink, drained each frame
    pending_notes: Rc<RefCell<Option<Option<NoteGrid>>>>,

    // Configuration
    render_config: RenderConfig,
    grid_config: GridConfig,
    sound_config: SoundConfig,
    recording_config: Option<RecordingConfig>,

    frame_num: usize,
}

impl App {
    fn new(args: &Args) -> Result<Self, LifewaveError> {
        let render_config = args.render_config();
        let grid_config = args.grid_config();
        let sound_config = args.sound_config();
        let recording_config = args
            .create_recording_config()
            .map_err(|e| {
                LifewaveError::InvalidConfig(format!("cannot create recording directories: {}", e))
            })?;

        let mut audio = match AudioSystem::new(&sound_config, recording_config.as_ref()) {
            Ok(audio) => audio,
            Err(e) => {
                warn!("{}; continuing silently", LifewaveError::Audio(e));
                AudioSystem::unavailable(&sound_config)
            }
        };

        // Recording has no user gesture to wait for
        if recording_config.is_some() {
            audio.resume();
        }

        let mut lifecycle = LifecycleController::new(
            &render_config,
            &grid_config,
            &sound_config,
            Box::new(audio.handle()),
        )?;

        lifecycle.set_on_ready(|| info!("Grid ready"));

        let pending_notes = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&pending_notes);
        lifecycle.set_note_sink(move |notes: Option<&NoteGrid>| {
            *sink.borrow_mut() = Some(notes.cloned());
        });

        Ok(Self {
            window: None,
            render_system: None,
            lifecycle,
            audio,
            visualizer: NoteVisualizer::new(),
            pending_notes,
            render_config,
            grid_config,
            sound_config,
            recording_config,
            frame_num: 0,
        })
    }

    /// Measure the grid for a surface size (pixels)
    fn measure(&mut self, width_px: u32, height_px: u32) {
        // Unmeasured (minimized) surfaces never create a grid
        let Some((width, height)) = self.grid_config.cells_for_surface(width_px, height_px)
        else {
            return;
        };
        if let Err(e) = self.lifecycle.on_measure(width, height) {
            error!("Grid measurement rejected: {}", e);
        }
    }

    fn resume_audio(&mut self) {
        if self.audio.status() == AudioStatus::Suspended {
            self.audio.resume();
        }
    }

    fn handle_key(&mut self, key: KeyCode, event_loop: &ActiveEventLoop) {
        match key {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::Space => self.resume_audio(),
            KeyCode::KeyR => {
                if let Err(e) = self.lifecycle.request_regenerate() {
                    error!("Regenerate failed: {}", e);
                }
            }
            KeyCode::KeyT => {
                self.sound_config.voice = self.sound_config.voice.toggled();
                self.lifecycle.set_timbre(self.sound_config.voice);
            }
            KeyCode::KeyL => {
                self.render_config.color_scheme = self.render_config.color_scheme.toggled();
                self.lifecycle
                    .set_color_scheme(self.render_config.color_scheme);
            }
            KeyCode::KeyM => {
                self.sound_config.sound_enabled = !self.sound_config.sound_enabled;
                self.lifecycle
                    .set_sound_enabled(self.sound_config.sound_enabled);
                info!(
                    "Sound {}",
                    if self.sound_config.sound_enabled { "on" } else { "off" }
                );
            }
            KeyCode::KeyV => {
                self.render_config.show_visualizer = !self.render_config.show_visualizer;
            }
            KeyCode::BracketLeft | KeyCode::BracketRight => {
                let step = if key == KeyCode::BracketRight { 0.1 } else { -0.1 };
                let delta = (self.sound_config.sound_delta_s + step)
                    .max(audio_constants::MIN_SOUND_DELTA_S);
                self.sound_config.sound_delta_s = delta;
                self.lifecycle.set_sound_delta(delta);
                info!("Audio tick every {:.1} s", delta);
            }
            KeyCode::ArrowUp | KeyCode::ArrowDown => {
                let step = if key == KeyCode::ArrowUp { 5.0 } else { -5.0 };
                let fps = (self.render_config.target_fps + step).clamp(1.0, 240.0);
                match self.lifecycle.set_target_fps(fps) {
                    Ok(()) => self.render_config.target_fps = fps,
                    Err(e) => error!("{}", e),
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = &self.window else {
            return;
        };

        // Recording steps a fixed delta on every redraw
        if self.recording_config.is_some() {
            window.request_redraw();
            return;
        }

        // Sleep until the next render tick instead of spinning on redraws
        let now = Instant::now();
        match self.lifecycle.next_frame_at(now) {
            Some(deadline) if deadline <= now => {
                event_loop.set_control_flow(ControlFlow::Wait);
                window.request_redraw();
            }
            Some(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        // Create window
        let window_attributes = Window::default_attributes()
            .with_title("Lifewave")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.render_config.window_width,
                self.render_config.window_height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        // Initialize rendering system
        let render_system = match pollster::block_on(RenderSystem::new(
            Arc::clone(&window),
            self.recording_config.clone(),
        )) {
            Ok(render_system) => render_system,
            Err(e) => {
                error!("{}", LifewaveError::Render(e));
                event_loop.exit();
                return;
            }
        };

        let (width, height) = render_system.window_size();
        self.lifecycle
            .set_instance_buffer_limit(render_system.max_buffer_size());
        self.window = Some(window);
        self.render_system = Some(render_system);

        // The engine is local, so it is ready as soon as the window is
        if let Err(e) = self
            .lifecycle
            .attach_engine(LifeEngine::new(&self.grid_config))
        {
            error!("Failed to allocate grid: {}", e);
        }
        self.measure(width, height);

        println!("\nLifewave is running!");
        println!("Click or press Space to start audio");
        println!("R regenerate | T timbre | L light/dark | M sound | V notes");
        println!("Up/Down fps | [ ] audio tick");
        println!("Press ESC to quit\n");
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(key),
                        ..
                    },
                ..
            } => self.handle_key(key, event_loop),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                ..
            } => self.resume_audio(),
            WindowEvent::Resized(size) => {
                if let Some(render_system) = self.render_system.as_mut() {
                    render_system.resize(size.width, size.height);
                }
                self.measure(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                self.render_frame(event_loop);
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.lifecycle.teardown();
        self.audio.finish_recording();
    }
}

impl App {
    /// Advance the pipeline. A render tick uploads and draws the new state;
    /// otherwise the last uploaded frame is presented again (expose, resize).
    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        let outcome = match self.recording_config {
            // Fixed step so recordings are frame-exact
            Some(_) => self
                .lifecycle
                .frame_delta(self.render_config.frame_interval_s()),
            None => self.lifecycle.frame(Instant::now()),
        };
        let ticked = outcome != FrameOutcome::Idle;

        let Some(render_system) = self.render_system.as_mut() else {
            return;
        };

        if ticked {
            if let Some(notes) = self.pending_notes.borrow_mut().take() {
                self.visualizer
                    .update(notes.as_ref(), render_system.window_size());
            }
            render_system.sync_grid(self.lifecycle.projector_mut());
            render_system.sync_overlay(self.visualizer.tiles_mut());
        }

        let background = self.lifecycle.projector().lut().background();
        match render_system.render(
            ticked.then_some(self.frame_num),
            background,
            self.render_config.show_visualizer,
        ) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = render_system.window_size();
                render_system.resize(width, height);
            }
            Err(e) => error!("Render error: {:?}", e),
        }
        if !ticked {
            return;
        }
        self.frame_num += 1;

        if let Some(ref config) = self.recording_config {
            if self.frame_num >= config.total_frames() {
                info!("Recorded {} frames to {}", self.frame_num, config.output_dir);
                event_loop.exit();
            }
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Lifewave - Game of Life, rendered and sonified");
    println!("Initializing systems...\n");

    let args = Args::parse();
    let mut app = match App::new(&args) {
        Ok(app) => app,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    if let Err(e) = event_loop.run_app(&mut app) {
        error!("Event loop error: {}", e);
    }
}
