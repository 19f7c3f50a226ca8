// SPDX-License-Identifier: MIT OR Apache-2.0
//! Active-item state machine.
//!
//! The [`Sequencer`] owns the notion of "current index", restarts the
//! progress animation whenever the active item or its duration changes, and
//! advances (or, in controlled mode, requests advancing) when a run
//! completes.

use crate::animator::{ProgressAnimator, WeakAnimator};
use crate::item::{Item, ItemId, Sequence};
use crate::options::SequencerOptions;
use crate::scheduler::FrameScheduler;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;

/// Sequencer configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencerError {
    /// No items to cycle through
    #[error("Sequence cannot be empty")]
    EmptySequence,

    /// `default_active_index` outside the sequence
    #[error("Default active index {index} out of bounds for {len} items")]
    DefaultIndexOutOfBounds {
        /// Offending index
        index: usize,
        /// Sequence length
        len: usize,
    },

    /// Controlled `active_index` outside the sequence
    #[error("Active index {index} out of bounds for {len} items")]
    ActiveIndexOutOfBounds {
        /// Offending index
        index: usize,
        /// Sequence length
        len: usize,
    },

    /// Host tried to drive the index of an uncontrolled engine
    #[error("Sequencer is not in controlled mode")]
    NotControlled,

    /// Options switched between controlled and uncontrolled mode
    #[error("Control mode is fixed at construction (controlled: {controlled})")]
    ControlModeChanged {
        /// Mode the engine was created in
        controlled: bool,
    },
}

/// Result type for sequencer operations
pub type Result<T> = std::result::Result<T, SequencerError>;

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerState {
    /// Not mounted yet, no animation
    #[default]
    Idle,
    /// Animating the active item
    Playing,
    /// Auto-play off or no usable duration; progress held at 0
    Paused,
    /// Torn down
    Destroyed,
}

impl SequencerState {
    /// Check if the engine can still change state
    pub fn is_live(&self) -> bool {
        !matches!(self, SequencerState::Destroyed)
    }
}

/// Whether the host can schedule frames yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountState {
    /// Frames cannot be scheduled
    #[default]
    NotReady,
    /// Mounted
    Ready,
}

type ActiveChangeListener = Box<dyn FnMut(usize, &Item)>;
type CycleCompleteListener = Box<dyn FnMut()>;
type ProgressListener = Box<dyn FnMut(f64)>;

#[derive(Default)]
struct Listeners {
    on_active_change: Option<ActiveChangeListener>,
    on_cycle_complete: Option<CycleCompleteListener>,
    on_progress_change: Option<ProgressListener>,
}

/// Inputs that decide whether a run must be (re)started
#[derive(Debug, Clone, Copy, PartialEq)]
struct RunKey {
    index: usize,
    duration_ms: f64,
    auto_play: bool,
}

impl RunKey {
    fn plays(&self) -> bool {
        self.auto_play && self.duration_ms > 0.0
    }
}

struct SequencerCore {
    sequence: Rc<Sequence>,
    auto_play: bool,
    default_duration_ms: f64,
    controlled: bool,
    index: usize,
    progress: f64,
    mount: MountState,
    destroyed: bool,
    /// Key of the last run started or reset
    applied: Option<RunKey>,
    listeners: Listeners,
    /// Active-change notifications raised while one is being delivered
    queued_changes: VecDeque<usize>,
    dispatching_change: bool,
}

impl SequencerCore {
    fn current_duration(&self) -> f64 {
        self.sequence
            .resolve_duration(self.index, self.default_duration_ms)
    }

    fn run_key(&self) -> RunKey {
        RunKey {
            index: self.index,
            duration_ms: self.current_duration(),
            auto_play: self.auto_play,
        }
    }

    /// Move the active index. In controlled mode the host owns it, so this
    /// does nothing.
    fn apply_index(&mut self, index: usize) {
        if self.controlled || index == self.index {
            return;
        }
        self.index = index;
        self.progress = 0.0;
    }
}

enum RunAction {
    Start(f64),
    Reset,
}

/// Timed sequencing engine for one widget instance
pub struct Sequencer {
    core: Rc<RefCell<SequencerCore>>,
    scheduler: Rc<dyn FrameScheduler>,
    animator: Option<ProgressAnimator>,
}

impl Sequencer {
    /// Create an engine for `sequence`.
    ///
    /// Fails if `options` point outside the sequence. The engine starts in
    /// [`SequencerState::Idle`]; call [`Sequencer::mount`] once the host can
    /// schedule frames.
    pub fn new(
        sequence: Sequence,
        options: SequencerOptions,
        scheduler: Rc<dyn FrameScheduler>,
    ) -> Result<Self> {
        options.validate(sequence.len())?;

        let controlled = options.is_controlled();
        let index = options.active_index.unwrap_or(options.default_active_index);

        tracing::debug!(
            "Created sequencer: {} items, start index {}, controlled: {}",
            sequence.len(),
            index,
            controlled
        );

        Ok(Self {
            core: Rc::new(RefCell::new(SequencerCore {
                sequence: Rc::new(sequence),
                auto_play: options.auto_play,
                default_duration_ms: options.default_duration_ms,
                controlled,
                index,
                progress: 0.0,
                mount: MountState::NotReady,
                destroyed: false,
                applied: None,
                listeners: Listeners::default(),
                queued_changes: VecDeque::new(),
                dispatching_change: false,
            })),
            scheduler,
            animator: None,
        })
    }

    /// Host is ready for frame callbacks; begin animating if configured to.
    pub fn mount(&mut self) {
        {
            let mut core = self.core.borrow_mut();
            if core.destroyed || core.mount == MountState::Ready {
                return;
            }
            core.mount = MountState::Ready;
        }

        if self.animator.is_none() {
            let animator = ProgressAnimator::new(self.scheduler.clone());
            bind_callbacks(&animator, Rc::downgrade(&self.core));
            self.animator = Some(animator);
        }

        tracing::debug!("Sequencer mounted");
        self.reconcile();
    }

    /// Tear down: cancel the animation and drop all listeners. Terminal.
    pub fn destroy(&mut self) {
        let listeners = {
            let mut core = self.core.borrow_mut();
            if core.destroyed {
                return;
            }
            core.destroyed = true;
            std::mem::take(&mut core.listeners)
        };
        drop(listeners);

        if let Some(animator) = self.animator.take() {
            animator.destroy();
        }
        tracing::debug!("Sequencer destroyed");
    }

    /// Jump to `index`.
    ///
    /// Out-of-range and unchanged indices are ignored. In uncontrolled mode
    /// the index moves immediately; in either mode the active-change
    /// listener is told about the request.
    pub fn go_to_index(&mut self, index: usize) {
        {
            let mut core = self.core.borrow_mut();
            if core.destroyed {
                return;
            }
            if !core.sequence.contains_index(index) || index == core.index {
                tracing::trace!("Ignoring navigation to index {}", index);
                return;
            }
            core.apply_index(index);
        }

        emit_active_change(&self.core, index);
        self.reconcile();
    }

    /// Jump to the item with `id`; unknown IDs are ignored
    pub fn go_to_id(&mut self, id: &ItemId) {
        let index = self.core.borrow().sequence.index_of(id);
        match index {
            Some(index) => self.go_to_index(index),
            None => tracing::trace!("Ignoring navigation to unknown item {}", id),
        }
    }

    /// Jump to the following item, wrapping at the end
    pub fn go_to_next(&mut self) {
        let (index, len) = self.position();
        self.go_to_index((index + 1) % len);
    }

    /// Jump to the preceding item, wrapping at the start
    pub fn go_to_previous(&mut self) {
        let (index, len) = self.position();
        self.go_to_index((index + len - 1) % len);
    }

    fn position(&self) -> (usize, usize) {
        let core = self.core.borrow();
        (core.index, core.sequence.len())
    }

    /// Adopt a host-supplied index (controlled mode).
    ///
    /// Does not notify the active-change listener; the host already knows.
    pub fn set_active_index(&mut self, index: usize) -> Result<()> {
        {
            let mut core = self.core.borrow_mut();
            if !core.controlled {
                return Err(SequencerError::NotControlled);
            }
            let len = core.sequence.len();
            if index >= len {
                return Err(SequencerError::ActiveIndexOutOfBounds { index, len });
            }
            if core.destroyed || index == core.index {
                return Ok(());
            }
            core.index = index;
            core.progress = 0.0;
        }

        self.reconcile();
        Ok(())
    }

    /// Turn automatic advancement on or off. Either way progress restarts at 0.
    pub fn set_auto_play(&mut self, auto_play: bool) {
        self.core.borrow_mut().auto_play = auto_play;
        self.reconcile();
    }

    /// Change the fallback duration. If the active item uses it, its run
    /// restarts from 0 with the new duration.
    pub fn set_default_duration(&mut self, duration_ms: f64) {
        self.core.borrow_mut().default_duration_ms = duration_ms;
        self.reconcile();
    }

    /// Apply a full set of options.
    ///
    /// `default_active_index` only matters at construction and is just
    /// bounds-checked here.
    pub fn reconfigure(&mut self, options: &SequencerOptions) -> Result<()> {
        {
            let mut core = self.core.borrow_mut();
            options.validate(core.sequence.len())?;
            if options.is_controlled() != core.controlled {
                return Err(SequencerError::ControlModeChanged {
                    controlled: core.controlled,
                });
            }
            core.auto_play = options.auto_play;
            core.default_duration_ms = options.default_duration_ms;
        }

        let result = match options.active_index {
            Some(index) => self.set_active_index(index),
            None => Ok(()),
        };
        // An unchanged controlled index still has to pick up the new
        // auto-play and duration values.
        self.reconcile();
        result
    }

    /// Register the active-change listener, replacing any previous one
    pub fn on_active_change(&mut self, listener: impl FnMut(usize, &Item) + 'static) {
        self.core.borrow_mut().listeners.on_active_change = Some(Box::new(listener));
    }

    /// Register the cycle-complete listener, replacing any previous one
    pub fn on_cycle_complete(&mut self, listener: impl FnMut() + 'static) {
        self.core.borrow_mut().listeners.on_cycle_complete = Some(Box::new(listener));
    }

    /// Register the progress listener, replacing any previous one
    pub fn on_progress_change(&mut self, listener: impl FnMut(f64) + 'static) {
        self.core.borrow_mut().listeners.on_progress_change = Some(Box::new(listener));
    }

    /// Index of the active item
    pub fn current_index(&self) -> usize {
        self.core.borrow().index
    }

    /// The active item
    pub fn current_item(&self) -> Item {
        let core = self.core.borrow();
        core.sequence
            .get(core.index)
            .cloned()
            .unwrap_or_else(|| fallback_item(&core.sequence))
    }

    /// Progress of the active item in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.core.borrow().progress
    }

    /// Progress as a percentage in `[0, 100]`, for progress bars
    pub fn progress_percent(&self) -> f64 {
        (self.progress() * 100.0).clamp(0.0, 100.0)
    }

    /// Resolved duration of the active item
    pub fn current_duration_ms(&self) -> f64 {
        self.core.borrow().current_duration()
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        let core = self.core.borrow();
        if core.destroyed {
            SequencerState::Destroyed
        } else if core.mount == MountState::NotReady {
            SequencerState::Idle
        } else if core.run_key().plays() {
            SequencerState::Playing
        } else {
            SequencerState::Paused
        }
    }

    /// Whether the host owns the active index
    pub fn is_controlled(&self) -> bool {
        self.core.borrow().controlled
    }

    /// Whether `mount` has been called
    pub fn is_mounted(&self) -> bool {
        self.core.borrow().mount == MountState::Ready
    }

    /// Whether auto-play is on
    pub fn auto_play(&self) -> bool {
        self.core.borrow().auto_play
    }

    /// The items being cycled through
    pub fn sequence(&self) -> Rc<Sequence> {
        self.core.borrow().sequence.clone()
    }

    fn reconcile(&self) {
        if let Some(animator) = &self.animator {
            reconcile(&self.core, animator);
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Sequencer")
            .field("index", &core.index)
            .field("len", &core.sequence.len())
            .field("progress", &core.progress)
            .field("controlled", &core.controlled)
            .field("auto_play", &core.auto_play)
            .field("mount", &core.mount)
            .field("destroyed", &core.destroyed)
            .finish_non_exhaustive()
    }
}

/// Only reached if the active index ever leaves the sequence.
fn fallback_item(sequence: &Sequence) -> Item {
    tracing::error!("Active index out of bounds for {} items", sequence.len());
    sequence
        .get(0)
        .cloned()
        .unwrap_or_else(|| Item::new(ItemId::generate()))
}

fn bind_callbacks(animator: &ProgressAnimator, core: Weak<RefCell<SequencerCore>>) {
    let progress_core = core.clone();
    let weak_animator = animator.downgrade();

    animator.update_callbacks(
        move |progress| {
            if let Some(core) = progress_core.upgrade() {
                handle_progress(&core, progress);
            }
        },
        move || {
            if let Some(core) = core.upgrade() {
                handle_complete(&core, &weak_animator);
            }
        },
    );
}

/// Start or reset the run if its inputs changed since the last one
fn reconcile(core: &Rc<RefCell<SequencerCore>>, animator: &ProgressAnimator) {
    let action = {
        let mut core = core.borrow_mut();
        if core.destroyed || core.mount != MountState::Ready {
            return;
        }

        let key = core.run_key();
        if core.applied == Some(key) {
            return;
        }
        core.applied = Some(key);

        // Zero before any frame of the new run.
        core.progress = 0.0;

        if key.plays() {
            tracing::debug!(
                "Starting item {} for {} ms",
                key.index,
                key.duration_ms
            );
            RunAction::Start(key.duration_ms)
        } else {
            tracing::debug!("Holding item {} (auto-play: {})", key.index, key.auto_play);
            RunAction::Reset
        }
    };

    match action {
        RunAction::Start(duration_ms) => animator.start(duration_ms),
        RunAction::Reset => animator.reset(),
    }
}

fn handle_progress(core: &Rc<RefCell<SequencerCore>>, progress: f64) {
    let listener = {
        let mut core = core.borrow_mut();
        if core.destroyed {
            return;
        }
        core.progress = progress;
        core.listeners.on_progress_change.take()
    };

    if let Some(mut listener) = listener {
        listener(progress);
        let mut core = core.borrow_mut();
        if !core.destroyed && core.listeners.on_progress_change.is_none() {
            core.listeners.on_progress_change = Some(listener);
        }
    }
}

fn handle_complete(core: &Rc<RefCell<SequencerCore>>, animator: &WeakAnimator) {
    let (next, wrapped) = {
        let mut core = core.borrow_mut();
        if core.destroyed {
            return;
        }

        let finished = core.index;
        let len = core.sequence.len();
        let next = (finished + 1) % len;
        core.apply_index(next);
        if !core.controlled {
            // A one-item sequence lands on the same index; still a new run.
            core.applied = None;
            core.progress = 0.0;
        }
        (next, finished == len - 1)
    };

    tracing::debug!("Item finished, next index {}", next);
    emit_active_change(core, next);

    if wrapped {
        tracing::debug!("Cycle complete");
        emit_cycle_complete(core);
    }

    if let Some(animator) = animator.upgrade() {
        reconcile(core, &animator);
    }
}

fn emit_active_change(core: &Rc<RefCell<SequencerCore>>, index: usize) {
    {
        let mut core = core.borrow_mut();
        if core.destroyed {
            return;
        }
        core.queued_changes.push_back(index);
        // A listener navigating from inside its own call; the outer loop
        // delivers this once the listener returns.
        if core.dispatching_change {
            return;
        }
        core.dispatching_change = true;
    }

    loop {
        let (index, listener, sequence) = {
            let mut core = core.borrow_mut();
            let next = if core.destroyed {
                None
            } else {
                core.queued_changes.pop_front()
            };
            let Some(index) = next else {
                core.queued_changes.clear();
                core.dispatching_change = false;
                return;
            };
            (index, core.listeners.on_active_change.take(), core.sequence.clone())
        };

        let Some(mut listener) = listener else {
            continue;
        };
        if let Some(item) = sequence.get(index) {
            listener(index, item);
        }

        let mut core = core.borrow_mut();
        if !core.destroyed && core.listeners.on_active_change.is_none() {
            core.listeners.on_active_change = Some(listener);
        }
    }
}

fn emit_cycle_complete(core: &Rc<RefCell<SequencerCore>>) {
    let listener = {
        let mut core = core.borrow_mut();
        if core.destroyed {
            return;
        }
        core.listeners.on_cycle_complete.take()
    };

    if let Some(mut listener) = listener {
        listener();
        let mut core = core.borrow_mut();
        if !core.destroyed && core.listeners.on_cycle_complete.is_none() {
            core.listeners.on_cycle_complete = Some(listener);
        }
    }
}
