//! Note grid → synthesizer voice triggers.
//!
//! Each audio tick releases exactly the notes attacked on the previous tick
//! and attacks the new set. The synth gets `2 * max_tones` voices so the
//! outgoing release tails and the incoming attacks can overlap.

use log::{debug, info};

use super::notes::{Note, NoteGrid};
use crate::params::{audio_constants::SYNTH_ATTACK_MINIMUM_DURATION_S, VoiceTimbre};

/// A polyphonic synthesizer instance for one timbre.
pub trait PolySynth {
    fn set_max_polyphony(&mut self, max_polyphony: usize);

    fn max_polyphony(&self) -> usize;

    /// Start `notes`, each releasing itself after `duration_s`
    fn trigger_attack(&mut self, notes: &[Note], duration_s: f32);

    /// Release `notes` if they are still held
    fn trigger_release(&mut self, notes: &[Note]);

    fn release_all(&mut self);

    /// Free the instance; no calls follow this one
    fn dispose(&mut self);

    /// Voices currently producing sound
    fn sounding(&self) -> usize;
}

/// Builds synth instances and reports whether audio is flowing.
pub trait SynthFactory {
    fn create(&mut self, timbre: VoiceTimbre, max_polyphony: usize) -> Box<dyn PolySynth>;

    /// Audio transport is running (unlocked by the user, device present)
    fn is_running(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorState {
    Uninitialized,
    Ready,
    Disposed,
}

/// Voice count for a polyphony ceiling
pub fn max_polyphony_for(max_tones: usize) -> usize {
    2 * max_tones
}

/// Attack length for an audio tick interval
pub fn attack_duration_s(interval_s: f32) -> f32 {
    interval_s.max(SYNTH_ATTACK_MINIMUM_DURATION_S)
}

pub struct VoiceAllocator {
    factory: Box<dyn SynthFactory>,
    synth: Option<Box<dyn PolySynth>>,
    state: AllocatorState,
    timbre: VoiceTimbre,
    max_tones: usize,
    sound_enabled: bool,
    /// Notes attacked on the last audible tick
    previous: Vec<Note>,
}

impl VoiceAllocator {
    pub fn new(
        factory: Box<dyn SynthFactory>,
        timbre: VoiceTimbre,
        max_tones: usize,
        sound_enabled: bool,
    ) -> Self {
        Self {
            factory,
            synth: None,
            state: AllocatorState::Uninitialized,
            timbre,
            max_tones,
            sound_enabled,
            previous: Vec::new(),
        }
    }

    pub fn state(&self) -> AllocatorState {
        self.state
    }

    pub fn timbre(&self) -> VoiceTimbre {
        self.timbre
    }

    pub fn max_tones(&self) -> usize {
        self.max_tones
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn is_running(&self) -> bool {
        self.factory.is_running()
    }

    /// Notes that will be released on the next audible tick
    pub fn previous(&self) -> &[Note] {
        &self.previous
    }

    pub fn sounding(&self) -> usize {
        self.synth.as_ref().map_or(0, |synth| synth.sounding())
    }

    /// Build the synth instance. No-op unless uninitialized.
    pub fn init(&mut self) {
        if self.state != AllocatorState::Uninitialized {
            return;
        }

        self.synth = Some(
            self.factory
                .create(self.timbre, max_polyphony_for(self.max_tones)),
        );
        self.state = AllocatorState::Ready;
        info!(
            "Synth ready: {:?}, {} voices",
            self.timbre,
            max_polyphony_for(self.max_tones)
        );
    }

    /// Play one audio tick. Silent when audio is not running or sound is off.
    ///
    /// Returns whether any attack or release was issued.
    pub fn tick(&mut self, notes: &NoteGrid, interval_s: f32) -> bool {
        if self.state == AllocatorState::Uninitialized {
            self.init();
        }
        if !self.sound_enabled || !self.factory.is_running() {
            return false;
        }
        let Some(synth) = self.synth.as_mut() else {
            return false;
        };

        if !self.previous.is_empty() {
            synth.trigger_release(&self.previous);
        }

        let next = notes.flatten();
        if !next.is_empty() {
            synth.trigger_attack(&next, attack_duration_s(interval_s));
        }
        debug!("Audio tick:\n{}", notes);

        self.previous = next;
        true
    }

    /// Switch timbre: the old instance is released and disposed before the
    /// new one exists.
    pub fn set_timbre(&mut self, timbre: VoiceTimbre) {
        if timbre == self.timbre {
            return;
        }
        self.timbre = timbre;

        if self.state != AllocatorState::Ready {
            return;
        }

        if let Some(mut old) = self.synth.take() {
            old.release_all();
            old.dispose();
        }
        self.previous.clear();

        self.synth = Some(self.factory.create(timbre, max_polyphony_for(self.max_tones)));
        info!("Switched synth timbre to {:?}", timbre);
    }

    pub fn set_max_tones(&mut self, max_tones: usize) {
        if max_tones == self.max_tones {
            return;
        }
        self.max_tones = max_tones;

        if let Some(synth) = self.synth.as_mut() {
            synth.set_max_polyphony(max_polyphony_for(max_tones));
        }
    }

    /// Turning sound off releases whatever is still held.
    pub fn set_sound_enabled(&mut self, enabled: bool) {
        if enabled == self.sound_enabled {
            return;
        }
        self.sound_enabled = enabled;

        if !enabled {
            if let Some(synth) = self.synth.as_mut() {
                synth.release_all();
            }
            self.previous.clear();
        }
    }

    /// Release everything and dispose the synth. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(mut synth) = self.synth.take() {
            synth.release_all();
            synth.dispose();
        }
        self.previous.clear();
        if self.state != AllocatorState::Disposed {
            info!("Synth disposed");
        }
        self.state = AllocatorState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::notes::{Letter, MAJOR_PENTATONIC};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Create(VoiceTimbre, usize),
        Attack(usize, Vec<Note>, f32),
        Release(usize, Vec<Note>),
        ReleaseAll(usize),
        Dispose(usize),
        Polyphony(usize, usize),
    }

    #[derive(Default)]
    struct Shared {
        events: RefCell<Vec<Event>>,
        running: Cell<bool>,
        instances: Cell<usize>,
    }

    /// Records calls; holds notes with simple oldest-first stealing
    struct MockSynth {
        id: usize,
        shared: Rc<Shared>,
        max_polyphony: usize,
        held: Vec<Note>,
        disposed: bool,
    }

    impl PolySynth for MockSynth {
        fn set_max_polyphony(&mut self, max_polyphony: usize) {
            self.max_polyphony = max_polyphony;
            let excess = self.held.len().saturating_sub(max_polyphony);
            self.held.drain(..excess);
            self.shared
                .events
                .borrow_mut()
                .push(Event::Polyphony(self.id, max_polyphony));
        }

        fn max_polyphony(&self) -> usize {
            self.max_polyphony
        }

        fn trigger_attack(&mut self, notes: &[Note], duration_s: f32) {
            assert!(!self.disposed, "attack after dispose");
            for note in notes {
                if self.held.len() == self.max_polyphony {
                    self.held.remove(0);
                }
                self.held.push(*note);
            }
            self.shared
                .events
                .borrow_mut()
                .push(Event::Attack(self.id, notes.to_vec(), duration_s));
        }

        fn trigger_release(&mut self, notes: &[Note]) {
            assert!(!self.disposed, "release after dispose");
            self.held.retain(|n| !notes.contains(n));
            self.shared
                .events
                .borrow_mut()
                .push(Event::Release(self.id, notes.to_vec()));
        }

        fn release_all(&mut self) {
            self.held.clear();
            self.shared.events.borrow_mut().push(Event::ReleaseAll(self.id));
        }

        fn dispose(&mut self) {
            self.disposed = true;
            self.shared.events.borrow_mut().push(Event::Dispose(self.id));
        }

        fn sounding(&self) -> usize {
            self.held.len()
        }
    }

    struct MockFactory(Rc<Shared>);

    impl SynthFactory for MockFactory {
        fn create(&mut self, timbre: VoiceTimbre, max_polyphony: usize) -> Box<dyn PolySynth> {
            let id = self.0.instances.get();
            self.0.instances.set(id + 1);
            self.0
                .events
                .borrow_mut()
                .push(Event::Create(timbre, max_polyphony));
            Box::new(MockSynth {
                id,
                shared: Rc::clone(&self.0),
                max_polyphony,
                held: Vec::new(),
                disposed: false,
            })
        }

        fn is_running(&self) -> bool {
            self.0.running.get()
        }
    }

    fn allocator(running: bool) -> (VoiceAllocator, Rc<Shared>) {
        let shared = Rc::new(Shared::default());
        shared.running.set(running);
        let allocator = VoiceAllocator::new(
            Box::new(MockFactory(Rc::clone(&shared))),
            VoiceTimbre::Duo,
            4,
            true,
        );
        (allocator, shared)
    }

    fn notes(n: usize) -> NoteGrid {
        NoteGrid::new(vec![MAJOR_PENTATONIC[..n].to_vec()])
    }

    #[test]
    fn test_polyphony_is_twice_max_tones() {
        let (mut alloc, shared) = allocator(true);
        alloc.init();
        assert_eq!(alloc.state(), AllocatorState::Ready);
        assert_eq!(shared.events.borrow()[0], Event::Create(VoiceTimbre::Duo, 8));

        alloc.set_max_tones(6);
        assert_eq!(
            shared.events.borrow().last(),
            Some(&Event::Polyphony(0, 12))
        );
    }

    #[test]
    fn test_tick_releases_previous_then_attacks_new() {
        let (mut alloc, shared) = allocator(true);
        let first = notes(2);
        let second = NoteGrid::new(vec![vec![Note::natural(Letter::A, 4)]]);

        assert!(alloc.tick(&first, 0.9));
        assert!(alloc.tick(&second, 0.9));

        let events = shared.events.borrow();
        assert_eq!(
            events[1..],
            [
                Event::Attack(0, first.flatten(), 0.9),
                Event::Release(0, first.flatten()),
                Event::Attack(0, second.flatten(), 0.9),
            ]
        );
    }

    #[test]
    fn test_duration_floored() {
        let (mut alloc, shared) = allocator(true);
        alloc.tick(&notes(1), 0.0);
        let events = shared.events.borrow();
        match &events[1] {
            Event::Attack(_, _, duration) => {
                assert!((duration - SYNTH_ATTACK_MINIMUM_DURATION_S).abs() < 1e-6)
            }
            other => panic!("expected attack, got {:?}", other),
        }
    }

    #[test]
    fn test_not_running_is_silent() {
        let (mut alloc, shared) = allocator(false);
        assert!(!alloc.tick(&notes(3), 0.9));
        assert!(alloc.previous().is_empty());

        // Only the instance creation happened
        assert_eq!(shared.events.borrow().len(), 1);

        shared.running.set(true);
        assert!(alloc.tick(&notes(3), 0.9));
        assert_eq!(alloc.previous().len(), 3);
    }

    #[test]
    fn test_sound_disabled_releases_once() {
        let (mut alloc, shared) = allocator(true);
        alloc.tick(&notes(2), 0.9);
        alloc.set_sound_enabled(false);
        assert_eq!(shared.events.borrow().last(), Some(&Event::ReleaseAll(0)));

        let before = shared.events.borrow().len();
        assert!(!alloc.tick(&notes(2), 0.9));
        assert_eq!(shared.events.borrow().len(), before);
    }

    #[test]
    fn test_timbre_switch_releases_before_new_instance() {
        let (mut alloc, shared) = allocator(true);
        alloc.tick(&notes(3), 0.9);
        assert_eq!(alloc.sounding(), 3);

        alloc.set_timbre(VoiceTimbre::Fm);
        assert_eq!(alloc.sounding(), 0);
        alloc.tick(&notes(2), 0.9);

        let events = shared.events.borrow();
        let release = events.iter().position(|e| *e == Event::ReleaseAll(0));
        let dispose = events.iter().position(|e| *e == Event::Dispose(0));
        let create = events
            .iter()
            .position(|e| *e == Event::Create(VoiceTimbre::Fm, 8));
        let attack = events
            .iter()
            .position(|e| matches!(e, Event::Attack(1, _, _)));

        assert!(release < dispose);
        assert!(dispose < create);
        assert!(create < attack);
        // The new instance never releases notes it did not attack
        assert!(!events.iter().any(|e| matches!(e, Event::Release(1, _))));
    }

    #[test]
    fn test_voice_bound_holds_across_ticks() {
        let (mut alloc, _shared) = allocator(true);
        let bound = max_polyphony_for(alloc.max_tones());

        for tick in 0..20 {
            let n = 1 + tick % 4;
            let grid = NoteGrid::new(vec![MAJOR_PENTATONIC[tick % 8..tick % 8 + n].to_vec()]);
            alloc.tick(&grid, 0.9);
            assert!(alloc.sounding() <= bound);
        }
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (mut alloc, shared) = allocator(true);
        alloc.tick(&notes(2), 0.9);
        alloc.teardown();
        alloc.teardown();
        assert_eq!(alloc.state(), AllocatorState::Disposed);

        // Disposed instances never see another call
        assert!(!alloc.tick(&notes(2), 0.9));
        let disposes = shared
            .events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Dispose(_)))
            .count();
        assert_eq!(disposes, 1);
        assert_eq!(shared.instances.get(), 1);
    }
}
