//! Grid lifecycle and per-frame orchestration.
//!
//! The controller owns the grid and drives all three clocks from the host's
//! presentation callback. Within one render tick the order is fixed:
//! simulation clock, advance, projection, audio clock, tone mapping, voice
//! allocation, note sink. Render and audio therefore always see the
//! post-advance grid.

use log::{debug, info, warn};
use std::time::Instant;

use crate::error::{check_dimensions, LifewaveError, Result};
use crate::grid::{GridEngine, GridStore};
use crate::params::{
    audio_constants::SYNTH_ATTACK_MINIMUM_DURATION_S, ColorScheme, GridConfig, RenderConfig,
    SoundConfig, VoiceTimbre,
};
use crate::projector::{GridProjector, PrepareKind};
use crate::scheduler::{ClockBuffer, FrameScheduler, RateMeter, Registration, TickRates};
use crate::sound::{NoteGrid, SynthFactory, ToneMapper, VoiceAllocator};

/// Host time covered by one tick-rate report (seconds)
const RATE_WINDOW_S: f32 = 1.0;

/// Receives every audio tick's note grid; `None` on teardown
pub type NoteSink = Box<dyn FnMut(Option<&NoteGrid>)>;

/// What a measurement or regenerate request did to the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureOutcome {
    /// Engine not attached yet; applied once it is
    Deferred,
    /// First grid allocated
    Allocated,
    /// Different size: old grid discarded, new one allocated
    Reallocated,
    /// Same size: new content in place
    Regenerated,
    Unchanged,
}

/// Result of one host presentation frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No render tick: not due, no grid, projection not prepared, or torn down
    Idle,
    Rendered {
        /// The simulation stepped this tick
        advanced: bool,
        /// The audio clock fired and a note grid was produced
        sounded: bool,
    },
}

pub struct LifecycleController<E: GridEngine> {
    engine: Option<E>,
    grid: Option<E::Grid>,
    on_ready: Option<Box<dyn FnMut()>>,
    ready_fired: bool,

    /// Last measured grid size (cells)
    measured: Option<(u32, u32)>,
    regenerate_requested: bool,
    regenerate_token: u64,

    scheduler: FrameScheduler,
    simulation: ClockBuffer,
    audio: ClockBuffer,

    projector: GridProjector,
    /// Largest single instance buffer the GPU accepts (bytes)
    instance_buffer_limit: u64,
    tone_mapper: ToneMapper,
    allocator: VoiceAllocator,
    note_sink: Option<NoteSink>,
    latest_notes: Option<NoteGrid>,

    rates: RateMeter,
    last_rates: Option<TickRates>,

    alive: bool,
}

impl<E: GridEngine> LifecycleController<E> {
    pub fn new(
        render: &RenderConfig,
        grid: &GridConfig,
        sound: &SoundConfig,
        synth_factory: Box<dyn SynthFactory>,
    ) -> Result<Self> {
        render.validate().map_err(LifewaveError::InvalidConfig)?;
        grid.validate().map_err(LifewaveError::InvalidConfig)?;
        sound.validate().map_err(LifewaveError::InvalidConfig)?;

        Ok(Self {
            engine: None,
            grid: None,
            on_ready: None,
            ready_fired: false,
            measured: None,
            regenerate_requested: false,
            regenerate_token: 0,
            scheduler: FrameScheduler::new(render.target_fps),
            simulation: ClockBuffer::new(render.round_delta_s),
            audio: ClockBuffer::new(sound.audio_interval_s()),
            projector: GridProjector::new(render.policy, grid.cell_edge_px, render.color_scheme),
            instance_buffer_limit: wgpu::Limits::default().max_buffer_size,
            tone_mapper: ToneMapper::new(sound.max_tones),
            allocator: VoiceAllocator::new(
                synth_factory,
                sound.voice,
                sound.max_tones,
                sound.sound_enabled,
            ),
            note_sink: None,
            latest_notes: None,
            rates: RateMeter::new(RATE_WINDOW_S),
            last_rates: None,
            alive: true,
        })
    }

    /// Called once the grid is allocated and the engine is loaded
    pub fn set_on_ready(&mut self, on_ready: impl FnMut() + 'static) {
        self.on_ready = Some(Box::new(on_ready));
    }

    pub fn set_note_sink(&mut self, sink: impl FnMut(Option<&NoteGrid>) + 'static) {
        self.note_sink = Some(Box::new(sink));
    }

    /// The simulation engine finished loading. Applies any pending measurement.
    pub fn attach_engine(&mut self, engine: E) -> Result<MeasureOutcome> {
        if !self.alive {
            return Ok(MeasureOutcome::Unchanged);
        }

        self.engine = Some(engine);
        self.scheduler.register();
        info!("Simulation engine attached");

        match self.measured {
            Some((width, height)) => self.apply_measurement(width, height),
            None => Ok(MeasureOutcome::Deferred),
        }
    }

    /// Bound instance buffers by the device's `max_buffer_size`
    pub fn set_instance_buffer_limit(&mut self, bytes: u64) {
        self.instance_buffer_limit = bytes;
    }

    /// Host layout measured a grid size (cells). Zero sizes and grids whose
    /// instance buffers would not fit on the GPU fail fast.
    pub fn on_measure(&mut self, width: u32, height: u32) -> Result<MeasureOutcome> {
        check_dimensions(width, height)?;
        let bytes = self.projector.instance_buffer_bytes(width, height);
        if bytes > self.instance_buffer_limit {
            return Err(LifewaveError::GridTooLarge {
                width,
                height,
                bytes,
                limit: self.instance_buffer_limit,
            });
        }
        if !self.alive {
            return Ok(MeasureOutcome::Unchanged);
        }

        self.measured = Some((width, height));
        if self.engine.is_none() {
            return Ok(MeasureOutcome::Deferred);
        }
        self.apply_measurement(width, height)
    }

    /// New random content at the same dimensions
    pub fn request_regenerate(&mut self) -> Result<MeasureOutcome> {
        self.regenerate_requested = true;
        match self.measured {
            Some((width, height)) if self.engine.is_some() && self.alive => {
                self.apply_measurement(width, height)
            }
            _ => Ok(MeasureOutcome::Deferred),
        }
    }

    /// Any change of the token means "regenerate"
    pub fn set_regenerate_token(&mut self, token: u64) -> Result<MeasureOutcome> {
        if token == self.regenerate_token {
            return Ok(MeasureOutcome::Unchanged);
        }
        self.regenerate_token = token;
        self.request_regenerate()
    }

    fn apply_measurement(&mut self, width: u32, height: u32) -> Result<MeasureOutcome> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(MeasureOutcome::Deferred);
        };

        let current = self.grid.as_ref().map(|g| (g.width(), g.height()));
        let outcome = match current {
            None => {
                self.grid = Some(engine.create(width, height)?);
                info!("Allocated {}x{} grid", width, height);
                MeasureOutcome::Allocated
            }
            Some((w, h)) if (w, h) != (width, height) => {
                info!("Reallocating grid {}x{} -> {}x{}", w, h, width, height);
                // Old grid goes first so nothing can reference it
                self.grid = None;
                self.grid = Some(engine.create(width, height)?);
                MeasureOutcome::Reallocated
            }
            Some(_) if self.regenerate_requested => {
                if let Some(grid) = self.grid.as_mut() {
                    grid.regenerate();
                }
                info!("Regenerated {}x{} grid in place", width, height);
                MeasureOutcome::Regenerated
            }
            Some(_) => MeasureOutcome::Unchanged,
        };
        self.regenerate_requested = false;

        if matches!(
            outcome,
            MeasureOutcome::Allocated | MeasureOutcome::Reallocated
        ) {
            self.reset_clocks();
        }
        if outcome != MeasureOutcome::Unchanged {
            self.prepare();
            self.fire_ready();
        }
        Ok(outcome)
    }

    fn prepare(&mut self) -> Option<PrepareKind> {
        let grid = self.grid.as_ref()?;
        Some(self.projector.prepare(grid))
    }

    fn reset_clocks(&mut self) {
        self.scheduler.reset();
        self.simulation.reset();
        self.audio.reset();
        self.rates.reset();
    }

    fn fire_ready(&mut self) {
        if self.ready_fired || self.grid.is_none() {
            return;
        }
        self.ready_fired = true;
        if let Some(on_ready) = self.on_ready.as_mut() {
            on_ready();
        }
    }

    /// Host presentation callback (wall clock)
    pub fn frame(&mut self, now: Instant) -> FrameOutcome {
        let Some(registration) = self.tick_registration() else {
            return FrameOutcome::Idle;
        };
        match self.scheduler.on_frame(registration, now) {
            Some(elapsed) => self.tick(elapsed),
            None => FrameOutcome::Idle,
        }
    }

    /// Host presentation callback with an explicit delta (recording, tests)
    pub fn frame_delta(&mut self, delta_s: f32) -> FrameOutcome {
        let Some(registration) = self.tick_registration() else {
            return FrameOutcome::Idle;
        };
        match self.scheduler.on_frame_delta(registration, delta_s) {
            Some(elapsed) => self.tick(elapsed),
            None => FrameOutcome::Idle,
        }
    }

    fn tick_registration(&self) -> Option<Registration> {
        if !self.alive || self.grid.is_none() {
            return None;
        }
        self.scheduler.registration()
    }

    fn tick(&mut self, elapsed_s: f32) -> FrameOutcome {
        let Some(grid) = self.grid.as_mut() else {
            return FrameOutcome::Idle;
        };
        // Never draw instance data left over from another grid
        if !self.projector.is_prepared_for(&*grid) {
            warn!("Render tick skipped: projector not prepared for current grid");
            return FrameOutcome::Idle;
        }

        let advanced = self.simulation.accumulate(elapsed_s);
        if advanced {
            grid.advance();
        }
        self.projector.update(&*grid);

        let sounded = self.audio.accumulate(elapsed_s);
        if sounded {
            let notes = self.tone_mapper.map(&*grid).notes;
            self.allocator.tick(&notes, self.audio.interval_s());
            if let Some(sink) = self.note_sink.as_mut() {
                sink(Some(&notes));
            }
            self.latest_notes = Some(notes);
        }

        if let Some(rates) = self.rates.record(elapsed_s, advanced, sounded) {
            debug!(
                "Tick rates: render {:.1} Hz, simulation {:.1} Hz, audio {:.2} Hz",
                rates.render_hz, rates.simulation_hz, rates.audio_hz
            );
            self.last_rates = Some(rates);
        }

        FrameOutcome::Rendered { advanced, sounded }
    }

    /// When the host should next call `frame`; `None` while there is nothing
    /// to tick (no grid, no registration, torn down).
    pub fn next_frame_at(&self, now: Instant) -> Option<Instant> {
        if !self.alive || self.grid.is_none() {
            return None;
        }
        self.scheduler.next_tick_at(now)
    }

    /// Change the render rate: the scheduler registration is recreated.
    pub fn set_target_fps(&mut self, target_fps: f32) -> Result<()> {
        if !(target_fps > 0.0) {
            return Err(LifewaveError::InvalidConfig(format!(
                "Target fps must be > 0, got {}",
                target_fps
            )));
        }

        if self.scheduler.is_registered() {
            self.scheduler.reconfigure(target_fps);
        } else {
            self.scheduler = FrameScheduler::new(target_fps);
        }
        info!("Render rate set to {} fps", target_fps);
        Ok(())
    }

    pub fn set_round_delta(&mut self, round_delta_s: f32) {
        self.simulation.set_interval(round_delta_s);
    }

    /// Audio tick interval, floored at the shortest attack the synth plays
    pub fn set_sound_delta(&mut self, sound_delta_s: f32) {
        self.audio
            .set_interval(sound_delta_s.max(SYNTH_ATTACK_MINIMUM_DURATION_S));
    }

    /// Swap the color lookup table and re-run prepare on the live grid
    pub fn set_color_scheme(&mut self, scheme: ColorScheme) {
        if self.projector.lut().scheme() == scheme {
            return;
        }
        self.projector.set_color_scheme(scheme);
        self.prepare();
        if let Some(grid) = self.grid.as_ref() {
            self.projector.update(grid);
        }
    }

    pub fn set_max_tones(&mut self, max_tones: usize) {
        self.tone_mapper.set_max_tones(max_tones);
        self.allocator.set_max_tones(max_tones);
    }

    pub fn set_timbre(&mut self, timbre: VoiceTimbre) {
        self.allocator.set_timbre(timbre);
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.allocator.set_sound_enabled(enabled);
    }

    pub fn grid(&self) -> Option<&E::Grid> {
        self.grid.as_ref()
    }

    pub fn projector(&self) -> &GridProjector {
        &self.projector
    }

    pub fn projector_mut(&mut self) -> &mut GridProjector {
        &mut self.projector
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn simulation_clock(&self) -> &ClockBuffer {
        &self.simulation
    }

    pub fn audio_clock(&self) -> &ClockBuffer {
        &self.audio
    }

    pub fn allocator(&self) -> &VoiceAllocator {
        &self.allocator
    }

    pub fn latest_notes(&self) -> Option<&NoteGrid> {
        self.latest_notes.as_ref()
    }

    /// Most recent tick-rate measurement
    pub fn tick_rates(&self) -> Option<TickRates> {
        self.last_rates
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Deregister, silence and drop the grid. Later frames are no-ops.
    pub fn teardown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;

        self.scheduler.teardown();
        self.allocator.teardown();
        self.projector.reset();
        self.grid = None;
        self.latest_notes = None;
        self.rates.reset();
        if let Some(sink) = self.note_sink.as_mut() {
            sink(None);
        }
        info!("Lifecycle torn down");
    }
}

impl<E: GridEngine> Drop for LifecycleController<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellState, LifeEngine, LifeGrid};
    use crate::params::ProjectionPolicy;
    use crate::projector::InstanceRaw;
    use crate::sound::system::{AudioStatus, SynthBus, SynthHandle};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Engine producing fully alive grids so every region is audible
    struct SolidEngine;

    impl GridEngine for SolidEngine {
        type Grid = LifeGrid;

        fn create(&mut self, width: u32, height: u32) -> Result<LifeGrid> {
            check_dimensions(width, height)?;
            LifeGrid::from_cells(
                width,
                height,
                vec![CellState::Alive; width as usize * height as usize],
            )
        }
    }

    fn configs() -> (RenderConfig, GridConfig, SoundConfig) {
        let render = RenderConfig {
            target_fps: 10.0,
            round_delta_s: 0.2,
            ..RenderConfig::default()
        };
        let sound = SoundConfig {
            sound_delta_s: 0.5,
            max_tones: 4,
            ..SoundConfig::default()
        };
        (render, GridConfig::default(), sound)
    }

    fn controller<E: GridEngine>(status: AudioStatus) -> (LifecycleController<E>, SynthHandle) {
        let (render, grid, sound) = configs();
        let handle = SynthHandle::detached(SynthBus::new(8000.0, 1.0), status);
        let controller =
            LifecycleController::new(&render, &grid, &sound, Box::new(handle.clone())).unwrap();
        (controller, handle)
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let (render, grid, _) = configs();
        let sound = SoundConfig {
            max_tones: 99,
            ..SoundConfig::default()
        };
        let handle = SynthHandle::detached(SynthBus::new(8000.0, 1.0), AudioStatus::Running);
        assert!(
            LifecycleController::<LifeEngine>::new(&render, &grid, &sound, Box::new(handle))
                .is_err()
        );
    }

    #[test]
    fn test_ticks_are_noops_until_engine_ready() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        assert_eq!(lc.on_measure(20, 20).unwrap(), MeasureOutcome::Deferred);
        assert_eq!(lc.frame_delta(1.0), FrameOutcome::Idle);
        assert!(lc.grid().is_none());

        let ready = Rc::new(Cell::new(0));
        let counter = Rc::clone(&ready);
        lc.set_on_ready(move || counter.set(counter.get() + 1));

        assert_eq!(
            lc.attach_engine(LifeEngine::new(&GridConfig::default()))
                .unwrap(),
            MeasureOutcome::Allocated
        );
        assert_eq!(ready.get(), 1);
        assert!(matches!(lc.frame_delta(0.1), FrameOutcome::Rendered { .. }));

        // Readiness fires once, not on every rebuild
        lc.on_measure(30, 30).unwrap();
        assert_eq!(ready.get(), 1);
    }

    #[test]
    fn test_zero_measurement_fails_fast() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        lc.attach_engine(LifeEngine::new(&GridConfig::default()))
            .unwrap();
        assert!(matches!(
            lc.on_measure(0, 12),
            Err(LifewaveError::InvalidDimensions { .. })
        ));
        assert!(lc.grid().is_none());
        assert_eq!(lc.frame_delta(1.0), FrameOutcome::Idle);
    }

    #[test]
    fn test_same_size_measure_is_unchanged() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        lc.attach_engine(LifeEngine::new(&GridConfig::default()))
            .unwrap();
        lc.on_measure(16, 16).unwrap();
        let id = lc.grid().unwrap().generation_id();
        assert_eq!(lc.on_measure(16, 16).unwrap(), MeasureOutcome::Unchanged);
        assert_eq!(lc.grid().unwrap().generation_id(), id);
    }

    #[test]
    fn test_regenerate_in_place_keeps_layout() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        lc.attach_engine(LifeEngine::new(&GridConfig::default()))
            .unwrap();
        lc.on_measure(24, 24).unwrap();
        let id = lc.grid().unwrap().generation_id();
        let layout = lc.projector().layout_version();

        assert_eq!(lc.request_regenerate().unwrap(), MeasureOutcome::Regenerated);
        assert_ne!(lc.grid().unwrap().generation_id(), id);
        assert_eq!(lc.projector().layout_version(), layout);
        assert!(lc.projector().is_prepared_for(lc.grid().unwrap()));
        assert!(matches!(lc.frame_delta(0.1), FrameOutcome::Rendered { .. }));

        // Token: same value is ignored, a new one regenerates
        assert_eq!(lc.set_regenerate_token(0).unwrap(), MeasureOutcome::Unchanged);
        assert_eq!(lc.set_regenerate_token(7).unwrap(), MeasureOutcome::Regenerated);
    }

    #[test]
    fn test_resize_reallocates_and_resets_clocks() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        lc.attach_engine(LifeEngine::new(&GridConfig::default()))
            .unwrap();
        lc.on_measure(20, 20).unwrap();

        // Build up partial intervals on every clock
        lc.frame_delta(0.15);
        lc.frame_delta(0.05);
        assert!(lc.simulation_clock().accumulated_s() > 0.0);
        assert!(lc.audio_clock().accumulated_s() > 0.0);
        let layout = lc.projector().layout_version();

        assert_eq!(lc.on_measure(40, 30).unwrap(), MeasureOutcome::Reallocated);
        assert_eq!(lc.scheduler().accumulated_s(), 0.0);
        assert_eq!(lc.simulation_clock().accumulated_s(), 0.0);
        assert_eq!(lc.audio_clock().accumulated_s(), 0.0);
        assert!(lc.projector().layout_version() > layout);

        let grid = lc.grid().unwrap();
        assert_eq!((grid.width(), grid.height()), (40, 30));

        // Next render tick only shows 40x30 slots
        assert!(matches!(lc.frame_delta(0.1), FrameOutcome::Rendered { .. }));
        let set = lc.projector().instance_sets()[0];
        assert_eq!(set.capacity(), 1200);
        assert_eq!(set.count(), 1200);
        let expected = lc.projector().cell_transform(39, 29, 40, 30);
        assert_eq!(set.visible()[1199].transform, expected);
    }

    #[test]
    fn test_tick_order_and_audio_cadence() {
        let (mut lc, handle) = controller::<SolidEngine>(AudioStatus::Running);
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        lc.set_note_sink(move |notes| sink.borrow_mut().push(notes.map(NoteGrid::len)));

        lc.attach_engine(SolidEngine).unwrap();
        lc.on_measure(10, 10).unwrap();

        // 10 fps render, 0.2 s simulation, 0.5 s audio
        let outcomes: Vec<_> = (0..10).map(|_| lc.frame_delta(0.1)).collect();
        let advanced = outcomes
            .iter()
            .filter(|o| matches!(o, FrameOutcome::Rendered { advanced: true, .. }))
            .count();
        let sounded = outcomes
            .iter()
            .filter(|o| matches!(o, FrameOutcome::Rendered { sounded: true, .. }))
            .count();
        assert!((4..=5).contains(&advanced), "advanced {}", advanced);
        assert!((1..=2).contains(&sounded), "sounded {}", sounded);
        assert_eq!(received.borrow().len(), sounded);

        assert!(lc.latest_notes().is_some());
        assert!(handle.bus().lock().unwrap().bank_count() == 1);
    }

    #[test]
    fn test_notes_computed_while_audio_suspended() {
        let (mut lc, _) = controller::<SolidEngine>(AudioStatus::Suspended);
        lc.set_round_delta(1000.0);
        lc.attach_engine(SolidEngine).unwrap();
        lc.on_measure(10, 10).unwrap();

        for _ in 0..6 {
            lc.frame_delta(0.1);
        }
        let notes = lc.latest_notes().unwrap();
        assert_eq!(notes.len(), 4);
        assert!(lc.allocator().previous().is_empty());
        assert_eq!(lc.allocator().sounding(), 0);
    }

    #[test]
    fn test_scheme_change_recolors() {
        let (mut lc, _) = controller::<SolidEngine>(AudioStatus::Running);
        lc.attach_engine(SolidEngine).unwrap();
        lc.on_measure(4, 4).unwrap();
        lc.frame_delta(0.1);

        lc.set_color_scheme(ColorScheme::Light);
        let lut = *lc.projector().lut();
        let set = lc.projector().instance_sets()[0];
        assert_eq!(set.instances()[0].color, lut.color(CellState::Alive));
    }

    #[test]
    fn test_fps_change_recreates_registration() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        lc.attach_engine(LifeEngine::new(&GridConfig::default()))
            .unwrap();
        lc.on_measure(8, 8).unwrap();
        let before = lc.scheduler().registration();

        lc.set_target_fps(30.0).unwrap();
        assert_ne!(lc.scheduler().registration(), before);
        assert!(lc.set_target_fps(0.0).is_err());
    }

    #[test]
    fn test_teardown_silences_and_guards_ticks() {
        let (mut lc, handle) = controller::<SolidEngine>(AudioStatus::Running);
        let last = Rc::new(RefCell::new(Some(0)));
        let sink = Rc::clone(&last);
        lc.set_note_sink(move |notes| *sink.borrow_mut() = notes.map(NoteGrid::len));

        lc.attach_engine(SolidEngine).unwrap();
        lc.on_measure(10, 10).unwrap();
        for _ in 0..6 {
            lc.frame_delta(0.1);
        }

        lc.teardown();
        lc.teardown();
        assert!(!lc.is_alive());
        assert!(!lc.scheduler().is_registered());
        assert_eq!(handle.bus().lock().unwrap().bank_count(), 0);
        assert_eq!(*last.borrow(), None);

        assert_eq!(lc.frame_delta(1.0), FrameOutcome::Idle);
        assert_eq!(lc.on_measure(12, 12).unwrap(), MeasureOutcome::Unchanged);
        assert!(lc.grid().is_none());
    }

    #[test]
    fn test_split_policy_resize_has_no_stale_instances() {
        let (mut render, grid, sound) = configs();
        render.policy = ProjectionPolicy::SplitCompaction;
        let handle = SynthHandle::detached(SynthBus::new(8000.0, 1.0), AudioStatus::Running);
        let mut lc =
            LifecycleController::new(&render, &grid, &sound, Box::new(handle)).unwrap();
        lc.attach_engine(SolidEngine).unwrap();
        lc.on_measure(20, 20).unwrap();
        lc.frame_delta(0.1);

        lc.on_measure(5, 4).unwrap();
        lc.frame_delta(0.1);
        let living = lc.projector().instance_sets()[1];
        assert_eq!(living.capacity(), 21);
        assert!(living.count() <= 21);
        assert_eq!(living.visible()[living.count() - 1], InstanceRaw::hidden());
    }

    #[test]
    fn test_unprepared_grid_is_never_rendered() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        lc.attach_engine(LifeEngine::new(&GridConfig::default()))
            .unwrap();
        lc.on_measure(12, 12).unwrap();

        // New content behind the controller's back: prepare never ran for it
        if let Some(grid) = lc.grid.as_mut() {
            grid.regenerate();
        }
        assert!(!lc.projector().is_prepared_for(lc.grid().unwrap()));
        assert_eq!(lc.frame_delta(0.3), FrameOutcome::Idle);
        assert_eq!(lc.grid().unwrap().generation(), 0);

        // Going through the controller prepares again
        lc.request_regenerate().unwrap();
        assert!(matches!(lc.frame_delta(0.3), FrameOutcome::Rendered { .. }));
    }

    #[test]
    fn test_grid_beyond_gpu_buffer_limit_fails_fast() {
        let (mut lc, _) = controller::<LifeEngine>(AudioStatus::Running);
        lc.attach_engine(LifeEngine::new(&GridConfig::default()))
            .unwrap();

        // One pixel per cell on a 4K surface
        assert!(matches!(
            lc.on_measure(3840, 2160),
            Err(LifewaveError::GridTooLarge { bytes: 630_374_400, .. })
        ));
        assert!(lc.grid().is_none());

        let slot = std::mem::size_of::<InstanceRaw>() as u64;
        lc.set_instance_buffer_limit(100 * slot);
        assert_eq!(lc.on_measure(10, 10).unwrap(), MeasureOutcome::Allocated);
        assert!(lc.on_measure(11, 10).is_err());
        let grid = lc.grid().unwrap();
        assert_eq!((grid.width(), grid.height()), (10, 10));
    }

    #[test]
    fn test_sound_delta_floored_at_attack_minimum() {
        let (mut lc, _) = controller::<SolidEngine>(AudioStatus::Running);
        lc.set_sound_delta(0.01);
        assert_eq!(lc.audio_clock().interval_s(), SYNTH_ATTACK_MINIMUM_DURATION_S);
        lc.set_sound_delta(1.5);
        assert_eq!(lc.audio_clock().interval_s(), 1.5);
    }

    #[test]
    fn test_next_frame_deadline_and_tick_rates() {
        let (mut lc, _) = controller::<SolidEngine>(AudioStatus::Running);
        let now = Instant::now();
        assert_eq!(lc.next_frame_at(now), None);

        lc.attach_engine(SolidEngine).unwrap();
        assert_eq!(lc.next_frame_at(now), None);
        lc.on_measure(10, 10).unwrap();
        assert_eq!(lc.next_frame_at(now), Some(now));

        assert_eq!(lc.tick_rates(), None);
        for _ in 0..12 {
            lc.frame_delta(0.1);
        }
        let rates = lc.tick_rates().unwrap();
        assert!((9.0..=11.0).contains(&rates.render_hz), "{:?}", rates);
        assert!(rates.simulation_hz < rates.render_hz);

        lc.teardown();
        assert_eq!(lc.next_frame_at(now), None);
    }
}
