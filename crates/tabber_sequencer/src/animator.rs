// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame-driven progress animation.
//!
//! A [`ProgressAnimator`] drives one scalar from 0 to 1 over a duration,
//! reporting each frame's value and a single completion event. It knows
//! nothing about items or indices.

use crate::scheduler::{FrameHandle, FrameScheduler};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Progress callback, receives a value in `[0, 1]`
pub type ProgressCallback = Rc<dyn Fn(f64)>;

/// Completion callback, fired once per finished run
pub type CompleteCallback = Rc<dyn Fn()>;

struct AnimatorInner {
    scheduler: Rc<dyn FrameScheduler>,
    duration_ms: f64,
    start_time: f64,
    progress: f64,
    frame: Option<FrameHandle>,
    running: bool,
    destroyed: bool,
    /// Bumped on every start and stop; frames from older runs are ignored
    run: u64,
    on_progress: ProgressCallback,
    on_complete: CompleteCallback,
}

impl AnimatorInner {
    fn halt(&mut self) {
        self.running = false;
        self.run = self.run.wrapping_add(1);
        if let Some(handle) = self.frame.take() {
            self.scheduler.cancel_frame(handle);
        }
    }
}

impl Drop for AnimatorInner {
    fn drop(&mut self) {
        if let Some(handle) = self.frame.take() {
            self.scheduler.cancel_frame(handle);
        }
    }
}

/// Animates progress from 0 to 1 on host frames
pub struct ProgressAnimator {
    inner: Rc<RefCell<AnimatorInner>>,
}

/// Non-owning handle used by callbacks that need to restart the animator
#[derive(Clone)]
pub(crate) struct WeakAnimator(Weak<RefCell<AnimatorInner>>);

impl WeakAnimator {
    pub(crate) fn upgrade(&self) -> Option<ProgressAnimator> {
        self.0.upgrade().map(|inner| ProgressAnimator { inner })
    }
}

fn noop_progress() -> ProgressCallback {
    Rc::new(|_| {})
}

fn noop_complete() -> CompleteCallback {
    Rc::new(|| {})
}

/// Clamp unusable durations to the instant-complete path
fn sanitize_duration(duration_ms: f64) -> f64 {
    if duration_ms.is_finite() && duration_ms > 0.0 {
        duration_ms
    } else {
        if duration_ms != 0.0 {
            tracing::warn!("Invalid animation duration {}, completing instantly", duration_ms);
        }
        0.0
    }
}

impl ProgressAnimator {
    /// Create an idle animator with no-op callbacks
    pub fn new(scheduler: Rc<dyn FrameScheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(AnimatorInner {
                scheduler,
                duration_ms: 0.0,
                start_time: 0.0,
                progress: 0.0,
                frame: None,
                running: false,
                destroyed: false,
                run: 0,
                on_progress: noop_progress(),
                on_complete: noop_complete(),
            })),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakAnimator {
        WeakAnimator(Rc::downgrade(&self.inner))
    }

    /// Swap the callbacks without touching the run in flight
    pub fn update_callbacks(
        &self,
        on_progress: impl Fn(f64) + 'static,
        on_complete: impl Fn() + 'static,
    ) {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            tracing::debug!("Ignoring callback update on destroyed animator");
            return;
        }
        inner.on_progress = Rc::new(on_progress);
        inner.on_complete = Rc::new(on_complete);
    }

    /// Start a new run, cancelling any run in progress.
    ///
    /// A zero (or unusable) duration reports progress 1 and completes
    /// synchronously without scheduling a frame.
    pub fn start(&self, duration_ms: f64) {
        let duration_ms = sanitize_duration(duration_ms);

        let (run, on_progress) = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                tracing::debug!("Ignoring start on destroyed animator");
                return;
            }

            inner.halt();
            inner.duration_ms = duration_ms;

            if duration_ms == 0.0 {
                inner.progress = 1.0;
            } else {
                inner.progress = 0.0;
                inner.running = true;
                inner.start_time = inner.scheduler.now();
                let run = inner.run;
                Self::request_frame(&mut inner, Rc::downgrade(&self.inner), run);
            }

            tracing::trace!("Animation run {} started ({} ms)", inner.run, duration_ms);
            (inner.run, inner.on_progress.clone())
        };

        if duration_ms == 0.0 {
            on_progress(1.0);
            self.complete_if_current(run);
        } else {
            on_progress(0.0);
        }
    }

    fn request_frame(inner: &mut AnimatorInner, weak: Weak<RefCell<AnimatorInner>>, run: u64) {
        let handle = inner.scheduler.request_frame(Box::new(move |timestamp| {
            if let Some(inner) = weak.upgrade() {
                ProgressAnimator { inner }.on_frame(run, timestamp);
            }
        }));
        inner.frame = Some(handle);
    }

    fn on_frame(&self, run: u64, timestamp: f64) {
        let (progress, finished, on_progress) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.running || inner.run != run {
                return;
            }
            inner.frame = None;

            let elapsed = timestamp - inner.start_time;
            let progress = (elapsed / inner.duration_ms)
                .clamp(0.0, 1.0)
                .max(inner.progress);
            inner.progress = progress;

            let finished = progress >= 1.0;
            if finished {
                inner.running = false;
            } else {
                Self::request_frame(&mut inner, Rc::downgrade(&self.inner), run);
            }
            (progress, finished, inner.on_progress.clone())
        };

        tracing::trace!("Animation progress {:.3}", progress);
        on_progress(progress);

        if finished {
            self.complete_if_current(run);
        }
    }

    /// Fire completion unless the progress callback already started or
    /// stopped another run.
    fn complete_if_current(&self, run: u64) {
        let on_complete = {
            let inner = self.inner.borrow();
            if inner.run != run || inner.destroyed {
                return;
            }
            inner.on_complete.clone()
        };
        on_complete();
    }

    /// Cancel the run in flight. Safe to call when idle.
    pub fn stop(&self) {
        self.inner.borrow_mut().halt();
    }

    /// Cancel the run in flight and report progress 0
    pub fn reset(&self) {
        let on_progress = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return;
            }
            inner.halt();
            inner.progress = 0.0;
            inner.on_progress.clone()
        };
        on_progress(0.0);
    }

    /// Cancel and drop the callbacks. The animator ignores all further calls.
    pub fn destroy(&self) {
        let (old_progress, old_complete) = {
            let mut inner = self.inner.borrow_mut();
            inner.halt();
            inner.destroyed = true;
            (
                std::mem::replace(&mut inner.on_progress, noop_progress()),
                std::mem::replace(&mut inner.on_complete, noop_complete()),
            )
        };
        // Released outside the borrow; they may own state that refers back here.
        drop((old_progress, old_complete));
    }

    /// Whether a run is waiting on frames
    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    /// Whether `destroy` has been called
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    /// Duration of the current or last run
    pub fn duration_ms(&self) -> f64 {
        self.inner.borrow().duration_ms
    }

    /// Last progress value reported
    pub fn progress(&self) -> f64 {
        self.inner.borrow().progress
    }
}

impl fmt::Debug for ProgressAnimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ProgressAnimator")
            .field("duration_ms", &inner.duration_ms)
            .field("progress", &inner.progress)
            .field("running", &inner.running)
            .field("destroyed", &inner.destroyed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualFrameScheduler;
    use std::cell::Cell;

    struct Recorder {
        progress: Rc<RefCell<Vec<f64>>>,
        completions: Rc<Cell<u32>>,
    }

    fn setup() -> (ManualFrameScheduler, ProgressAnimator, Recorder) {
        let scheduler = ManualFrameScheduler::new();
        let animator = ProgressAnimator::new(Rc::new(scheduler.clone()));
        let recorder = Recorder {
            progress: Rc::new(RefCell::new(Vec::new())),
            completions: Rc::new(Cell::new(0)),
        };

        let progress = recorder.progress.clone();
        let completions = recorder.completions.clone();
        animator.update_callbacks(
            move |p| progress.borrow_mut().push(p),
            move || completions.set(completions.get() + 1),
        );
        (scheduler, animator, recorder)
    }

    #[test]
    fn test_run_reaches_one_and_completes_once() {
        let (scheduler, animator, recorder) = setup();
        animator.start(100.0);

        assert_eq!(*recorder.progress.borrow(), vec![0.0]);
        assert!(animator.is_running());

        scheduler.run_for(200.0, 16.0);

        let values = recorder.progress.borrow().clone();
        assert_eq!(values.first(), Some(&0.0));
        assert_eq!(values.last(), Some(&1.0));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.iter().filter(|p| **p >= 1.0).count(), 1);
        assert_eq!(recorder.completions.get(), 1);
        assert!(!animator.is_running());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_progress_tracks_elapsed_time() {
        let (scheduler, animator, recorder) = setup();
        animator.start(1000.0);

        scheduler.advance(250.0);
        scheduler.advance(250.0);
        assert_eq!(*recorder.progress.borrow(), vec![0.0, 0.25, 0.5]);
        assert_eq!(recorder.completions.get(), 0);
    }

    #[test]
    fn test_zero_duration_completes_synchronously() {
        let (scheduler, animator, recorder) = setup();
        animator.start(0.0);

        assert_eq!(*recorder.progress.borrow(), vec![1.0]);
        assert_eq!(recorder.completions.get(), 1);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!animator.is_running());
    }

    #[test]
    fn test_invalid_durations_complete_instantly() {
        for duration in [-50.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let (scheduler, animator, recorder) = setup();
            animator.start(duration);

            assert_eq!(*recorder.progress.borrow(), vec![1.0]);
            assert_eq!(recorder.completions.get(), 1);
            assert_eq!(scheduler.pending_count(), 0);
        }
    }

    #[test]
    fn test_restart_suppresses_previous_run() {
        let (scheduler, animator, recorder) = setup();
        animator.start(100.0);
        scheduler.advance(50.0);
        assert_eq!(*recorder.progress.borrow(), vec![0.0, 0.5]);

        animator.start(1000.0);
        recorder.progress.borrow_mut().clear();
        assert_eq!(scheduler.pending_count(), 1);

        // The old run would have completed here.
        scheduler.advance(60.0);
        assert_eq!(*recorder.progress.borrow(), vec![0.06]);
        assert_eq!(recorder.completions.get(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (scheduler, animator, recorder) = setup();
        animator.stop();
        animator.start(100.0);
        animator.stop();
        animator.stop();

        scheduler.run_for(500.0, 16.0);
        assert_eq!(*recorder.progress.borrow(), vec![0.0]);
        assert_eq!(recorder.completions.get(), 0);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_reset_reports_zero() {
        let (scheduler, animator, recorder) = setup();
        animator.start(100.0);
        scheduler.advance(40.0);
        animator.reset();

        assert_eq!(*recorder.progress.borrow(), vec![0.0, 0.4, 0.0]);
        assert_eq!(animator.progress(), 0.0);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_callbacks_swap_mid_run() {
        let (scheduler, animator, recorder) = setup();
        animator.start(100.0);
        scheduler.advance(50.0);

        let swapped = Rc::new(RefCell::new(Vec::new()));
        let sink = swapped.clone();
        let done = Rc::new(Cell::new(false));
        let done_sink = done.clone();
        animator.update_callbacks(move |p| sink.borrow_mut().push(p), move || done_sink.set(true));

        scheduler.advance(50.0);
        assert_eq!(*recorder.progress.borrow(), vec![0.0, 0.5]);
        assert_eq!(*swapped.borrow(), vec![1.0]);
        assert!(done.get());
        assert_eq!(recorder.completions.get(), 0);
    }

    #[test]
    fn test_destroy_makes_scheduled_frames_inert() {
        let (scheduler, animator, recorder) = setup();
        animator.start(100.0);
        animator.destroy();

        scheduler.run_for(500.0, 16.0);
        animator.start(100.0);
        animator.reset();
        scheduler.run_for(500.0, 16.0);

        assert_eq!(*recorder.progress.borrow(), vec![0.0]);
        assert_eq!(recorder.completions.get(), 0);
        assert!(animator.is_destroyed());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_dropping_animator_cancels_frame() {
        let (scheduler, animator, recorder) = setup();
        animator.start(100.0);
        drop(animator);

        assert_eq!(scheduler.pending_count(), 0);
        scheduler.run_for(500.0, 16.0);
        assert_eq!(recorder.completions.get(), 0);
    }

    #[test]
    fn test_repeated_timestamp_keeps_progress() {
        let scheduler = ManualFrameScheduler::starting_at(1000.0);
        let animator = ProgressAnimator::new(Rc::new(scheduler.clone()));
        let values = Rc::new(RefCell::new(Vec::new()));
        let sink = values.clone();
        animator.update_callbacks(move |p| sink.borrow_mut().push(p), || {});

        animator.start(100.0);
        scheduler.advance(30.0);
        scheduler.advance(0.0);
        assert_eq!(*values.borrow(), vec![0.0, 0.3, 0.3]);
    }

    #[test]
    fn test_completion_can_start_next_run() {
        let scheduler = ManualFrameScheduler::new();
        let animator = Rc::new(ProgressAnimator::new(Rc::new(scheduler.clone())));
        let completions = Rc::new(Cell::new(0));

        let weak = animator.downgrade();
        let count = completions.clone();
        animator.update_callbacks(|_| {}, move || {
            count.set(count.get() + 1);
            if count.get() < 3 {
                if let Some(animator) = weak.upgrade() {
                    animator.start(100.0);
                }
            }
        });

        animator.start(100.0);
        scheduler.run_for(1000.0, 10.0);
        assert_eq!(completions.get(), 3);
        assert!(!animator.is_running());
    }
}
