// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-frame scheduling primitive supplied by the host.
//!
//! The engine never polls a clock on its own. It asks the host for a callback
//! on the next display refresh and is handed the frame timestamp when that
//! refresh happens. Hosts wire this to their render loop; tests and headless
//! hosts use [`ManualFrameScheduler`].

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// One-shot callback run on the next frame with the frame timestamp (ms)
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Handle identifying one pending frame callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

impl FrameHandle {
    /// Create a handle from a raw ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Host frame scheduler.
///
/// All methods take `&self`; implementations are single-threaded and use
/// interior mutability.
pub trait FrameScheduler {
    /// Current time in milliseconds, on the same clock as frame timestamps
    fn now(&self) -> f64;

    /// Schedule `callback` for the next frame.
    ///
    /// Implementations must not run the callback before returning.
    fn request_frame(&self, callback: FrameCallback) -> FrameHandle;

    /// Invalidate a pending frame. The callback is dropped without running.
    /// Unknown or already-fired handles are ignored.
    fn cancel_frame(&self, handle: FrameHandle);
}

struct ManualState {
    now: f64,
    next_handle: u64,
    pending: IndexMap<FrameHandle, FrameCallback>,
}

/// Deterministic scheduler driven by explicit clock advances.
///
/// Clones share the same clock and queue, so the host keeps one clone to
/// drive frames while the engine holds another.
#[derive(Clone)]
pub struct ManualFrameScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualFrameScheduler {
    /// Create a scheduler with its clock at 0
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// Create a scheduler with its clock at `now` ms
    pub fn starting_at(now: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(ManualState {
                now,
                next_handle: 1,
                pending: IndexMap::new(),
            })),
        }
    }

    /// Run one frame `delta_ms` after the previous one.
    ///
    /// Only callbacks pending when the frame begins are run; anything they
    /// request lands on the following frame. Returns the number of callbacks
    /// that ran.
    pub fn advance(&self, delta_ms: f64) -> usize {
        let (timestamp, due) = {
            let mut state = self.state.borrow_mut();
            if delta_ms.is_finite() && delta_ms > 0.0 {
                state.now += delta_ms;
            }
            let due: Vec<FrameHandle> = state.pending.keys().copied().collect();
            (state.now, due)
        };

        let mut ran = 0;
        for handle in due {
            // Re-check each handle; an earlier callback may have cancelled it.
            let callback = self.state.borrow_mut().pending.shift_remove(&handle);
            if let Some(callback) = callback {
                callback(timestamp);
                ran += 1;
            }
        }
        ran
    }

    /// Run consecutive frames of `frame_ms` until `total_ms` has elapsed.
    /// The last frame is shortened to land exactly on `total_ms`.
    /// Returns the number of frames run.
    pub fn run_for(&self, total_ms: f64, frame_ms: f64) -> usize {
        if !(frame_ms.is_finite() && frame_ms > 0.0) || !total_ms.is_finite() {
            return 0;
        }

        let mut elapsed = 0.0;
        let mut frames = 0;
        while elapsed < total_ms {
            let step = frame_ms.min(total_ms - elapsed);
            self.advance(step);
            elapsed += step;
            frames += 1;
        }
        frames
    }

    /// Run frames until nothing is pending or `max_frames` is reached.
    /// Returns the number of frames run.
    pub fn run_until_idle(&self, frame_ms: f64, max_frames: usize) -> usize {
        let mut frames = 0;
        while frames < max_frames && self.pending_count() > 0 {
            self.advance(frame_ms);
            frames += 1;
        }
        frames
    }

    /// Number of frame callbacks waiting to run
    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }
}

impl Default for ManualFrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualFrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualFrameScheduler")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn now(&self) -> f64 {
        self.state.borrow().now
    }

    fn request_frame(&self, callback: FrameCallback) -> FrameHandle {
        let mut state = self.state.borrow_mut();
        let handle = FrameHandle::new(state.next_handle);
        state.next_handle += 1;
        state.pending.insert(handle, callback);
        handle
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        // Drop the callback after releasing the borrow.
        let removed = self.state.borrow_mut().pending.shift_remove(&handle);
        drop(removed);
    }
}
