//! Fixed-rate clocks decoupled from the host's presentation callback.
//!
//! The host calls [`FrameScheduler::on_frame`] whenever it presents (vsync,
//! redraw request, whatever cadence it has). The scheduler turns that into
//! render ticks at the configured target rate. Each tick fires at most once
//! per host frame and carries over only the remainder, so a stalled host
//! (minimized window) produces one late tick instead of a burst.

use std::time::{Duration, Instant};

/// Accumulated elapsed time for one independently clocked subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockBuffer {
    interval_s: f32,
    accumulated_s: f32,
}

impl ClockBuffer {
    /// Interval of 0 fires on every accumulate call
    pub fn new(interval_s: f32) -> Self {
        Self {
            interval_s: interval_s.max(0.0),
            accumulated_s: 0.0,
        }
    }

    pub fn interval_s(&self) -> f32 {
        self.interval_s
    }

    pub fn accumulated_s(&self) -> f32 {
        self.accumulated_s
    }

    pub fn set_interval(&mut self, interval_s: f32) {
        self.interval_s = interval_s.max(0.0);
    }

    /// Add elapsed time; returns true when the clock fires.
    pub fn accumulate(&mut self, delta_s: f32) -> bool {
        self.accumulated_s += delta_s.max(0.0);

        if self.interval_s <= 0.0 {
            self.accumulated_s = 0.0;
            return true;
        }

        if self.accumulated_s >= self.interval_s {
            // Keep the remainder to avoid long-run drift, never a backlog
            self.accumulated_s %= self.interval_s;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.accumulated_s = 0.0;
    }
}

/// Measured tick rates (Hz) over one meter window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRates {
    pub render_hz: f32,
    pub simulation_hz: f32,
    pub audio_hz: f32,
}

/// Counts render, simulation and audio ticks against elapsed host time.
#[derive(Debug, Clone)]
pub struct RateMeter {
    window_s: f32,
    elapsed_s: f32,
    render: u32,
    simulation: u32,
    audio: u32,
}

impl RateMeter {
    pub fn new(window_s: f32) -> Self {
        Self {
            window_s: window_s.max(f32::EPSILON),
            elapsed_s: 0.0,
            render: 0,
            simulation: 0,
            audio: 0,
        }
    }

    /// Record one render tick. Returns the rates once a full window has passed.
    pub fn record(&mut self, elapsed_s: f32, advanced: bool, sounded: bool) -> Option<TickRates> {
        self.elapsed_s += elapsed_s.max(0.0);
        self.render += 1;
        self.simulation += advanced as u32;
        self.audio += sounded as u32;

        if self.elapsed_s < self.window_s {
            return None;
        }
        let rates = TickRates {
            render_hz: self.render as f32 / self.elapsed_s,
            simulation_hz: self.simulation as f32 / self.elapsed_s,
            audio_hz: self.audio as f32 / self.elapsed_s,
        };
        self.reset();
        Some(rates)
    }

    pub fn reset(&mut self) {
        self.elapsed_s = 0.0;
        self.render = 0;
        self.simulation = 0;
        self.audio = 0;
    }
}

/// Handle identifying the scheduler's current host registration.
///
/// A stale handle (from before a reconfigure or teardown) never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration(u64);

/// Render-tick scheduler driven by host presentation frames.
#[derive(Debug)]
pub struct FrameScheduler {
    clock: ClockBuffer,
    active: Option<Registration>,
    next_id: u64,
    last_frame: Option<Instant>,
    /// Elapsed host time since the last fired tick
    since_tick_s: f32,
}

impl FrameScheduler {
    /// Create a scheduler without an active registration
    pub fn new(target_fps: f32) -> Self {
        Self {
            clock: ClockBuffer::new(1.0 / target_fps),
            active: None,
            next_id: 0,
            last_frame: None,
            since_tick_s: 0.0,
        }
    }

    /// Register with the host; any previous registration is torn down first.
    pub fn register(&mut self) -> Registration {
        self.teardown();

        self.next_id += 1;
        let registration = Registration(self.next_id);
        self.active = Some(registration);
        registration
    }

    /// Change the target rate: tear down and recreate the registration.
    pub fn reconfigure(&mut self, target_fps: f32) -> Registration {
        self.teardown();
        self.clock = ClockBuffer::new(1.0 / target_fps);
        self.register()
    }

    /// Drop the active registration. Safe to call repeatedly.
    ///
    /// Returns whether a registration was actually removed.
    pub fn teardown(&mut self) -> bool {
        let was_active = self.active.take().is_some();
        self.last_frame = None;
        self.since_tick_s = 0.0;
        self.clock.reset();
        was_active
    }

    pub fn registration(&self) -> Option<Registration> {
        self.active
    }

    pub fn is_registered(&self) -> bool {
        self.active.is_some()
    }

    pub fn interval_s(&self) -> f32 {
        self.clock.interval_s()
    }

    pub fn accumulated_s(&self) -> f32 {
        self.clock.accumulated_s()
    }

    /// Zero the render clock (grid reallocation)
    pub fn reset(&mut self) {
        self.clock.reset();
        self.since_tick_s = 0.0;
    }

    /// Wall-clock instant at which the next render tick becomes due.
    ///
    /// `None` without an active registration; before the first host frame the
    /// tick is due at `now`. Lets the host sleep between ticks instead of
    /// polling.
    pub fn next_tick_at(&self, now: Instant) -> Option<Instant> {
        self.active?;
        let Some(last) = self.last_frame else {
            return Some(now);
        };
        let remaining_s = (self.clock.interval_s() - self.clock.accumulated_s()).max(0.0);
        Some(last + Duration::from_secs_f32(remaining_s))
    }

    /// Host presentation callback using wall-clock time.
    ///
    /// Returns the elapsed time since the previous render tick when a tick fires.
    pub fn on_frame(&mut self, registration: Registration, now: Instant) -> Option<f32> {
        if self.active != Some(registration) {
            return None;
        }

        let delta_s = match self.last_frame.replace(now) {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => 0.0,
        };

        self.on_frame_delta(registration, delta_s)
    }

    /// Host presentation callback with an explicit frame delta.
    pub fn on_frame_delta(&mut self, registration: Registration, delta_s: f32) -> Option<f32> {
        if self.active != Some(registration) {
            return None;
        }

        self.since_tick_s += delta_s.max(0.0);

        if self.clock.accumulate(delta_s) {
            let elapsed = self.since_tick_s;
            self.since_tick_s = 0.0;
            Some(elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_carries_remainder() {
        let mut clock = ClockBuffer::new(0.1);
        assert!(!clock.accumulate(0.06));
        assert!(clock.accumulate(0.06));
        assert!((clock.accumulated_s() - 0.02).abs() < 1e-5);
    }

    #[test]
    fn test_clock_no_catch_up_burst() {
        let mut clock = ClockBuffer::new(0.1);
        // A 1 second stall fires once, not ten times
        assert!(clock.accumulate(1.05));
        assert!(clock.accumulated_s() < 0.1);
        assert!(!clock.accumulate(0.01));
    }

    #[test]
    fn test_zero_interval_fires_every_time() {
        let mut clock = ClockBuffer::new(0.0);
        assert!(clock.accumulate(0.0));
        assert!(clock.accumulate(0.001));
    }

    #[test]
    fn test_scheduler_rate_independent_of_host_rate() {
        let mut scheduler = FrameScheduler::new(30.0);
        let reg = scheduler.register();

        // 144 Hz host for one second
        let fired = (0..144)
            .filter(|_| scheduler.on_frame_delta(reg, 1.0 / 144.0).is_some())
            .count();
        assert!((29..=31).contains(&fired), "fired {}", fired);

        // 20 Hz host: can only fire once per host frame
        let mut slow = FrameScheduler::new(30.0);
        let reg = slow.register();
        let fired = (0..20)
            .filter(|_| slow.on_frame_delta(reg, 1.0 / 20.0).is_some())
            .count();
        assert_eq!(fired, 20);
    }

    #[test]
    fn test_tick_reports_elapsed_since_last_tick() {
        let mut scheduler = FrameScheduler::new(10.0);
        let reg = scheduler.register();
        assert_eq!(scheduler.on_frame_delta(reg, 0.04), None);
        assert_eq!(scheduler.on_frame_delta(reg, 0.04), None);
        let elapsed = scheduler.on_frame_delta(reg, 0.04).unwrap();
        assert!((elapsed - 0.12).abs() < 1e-5);
    }

    #[test]
    fn test_reconfigure_invalidates_old_registration() {
        let mut scheduler = FrameScheduler::new(60.0);
        let old = scheduler.register();
        let new = scheduler.reconfigure(10.0);

        assert_ne!(old, new);
        assert_eq!(scheduler.on_frame_delta(old, 1.0), None);
        assert!(scheduler.on_frame_delta(new, 0.2).is_some());
        assert!((scheduler.interval_s() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut scheduler = FrameScheduler::new(60.0);
        let reg = scheduler.register();
        assert!(scheduler.teardown());
        assert!(!scheduler.teardown());
        assert!(!scheduler.is_registered());
        assert_eq!(scheduler.on_frame_delta(reg, 1.0), None);
    }

    #[test]
    fn test_wall_clock_frames() {
        let mut scheduler = FrameScheduler::new(10.0);
        let reg = scheduler.register();
        let start = Instant::now();

        // First frame only establishes the time base
        assert_eq!(scheduler.on_frame(reg, start), None);
        assert!(scheduler
            .on_frame(reg, start + Duration::from_millis(150))
            .is_some());
    }

    #[test]
    fn test_next_tick_deadline() {
        let mut scheduler = FrameScheduler::new(10.0);
        let start = Instant::now();
        assert_eq!(scheduler.next_tick_at(start), None);

        let reg = scheduler.register();
        assert_eq!(scheduler.next_tick_at(start), Some(start));

        scheduler.on_frame(reg, start);
        let deadline = scheduler.next_tick_at(start).unwrap();
        assert!(((deadline - start).as_secs_f32() - 0.1).abs() < 1e-4);

        // 40 ms into the interval, 60 ms remain
        let later = start + Duration::from_millis(40);
        assert_eq!(scheduler.on_frame(reg, later), None);
        let deadline = scheduler.next_tick_at(later).unwrap();
        assert!(((deadline - later).as_secs_f32() - 0.06).abs() < 1e-4);

        // Waking just past the deadline fires the tick
        assert!(scheduler
            .on_frame(reg, deadline + Duration::from_millis(1))
            .is_some());

        scheduler.teardown();
        assert_eq!(scheduler.next_tick_at(later), None);
    }

    #[test]
    fn test_rate_meter_reports_per_window() {
        let mut meter = RateMeter::new(0.95);
        let mut report = None;
        for i in 0..10 {
            assert!(report.is_none());
            report = meter.record(0.1, i % 2 == 0, i == 4);
        }
        let rates = report.unwrap();
        assert!((rates.render_hz - 10.0).abs() < 0.01);
        assert!((rates.simulation_hz - 5.0).abs() < 0.01);
        assert!((rates.audio_hz - 1.0).abs() < 0.01);

        // Window starts over after a report
        assert_eq!(meter.record(0.1, true, true), None);
    }
}
