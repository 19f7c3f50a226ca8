// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timed sequencing engine for auto-advancing tab widgets.
//!
//! This crate drives the part of a tab carousel that has timing in it:
//! - Which item is active
//! - A 0..1 progress value animated on host frames
//! - Auto-advance with wraparound and cycle notifications
//! - Controlled (host-owned) and uncontrolled active index
//!
//! ## Architecture
//!
//! The engine is built on:
//! - A [`FrameScheduler`] seam for the host's per-frame callback primitive
//! - [`ProgressAnimator`], one cancellable progress run at a time
//! - [`Sequencer`], the state machine that reconciles index, duration and
//!   auto-play into animator runs
//!
//! Rendering is left to the host, which reads `current_index`,
//! `current_item` and `progress`, and calls `go_to_index`.

pub mod animator;
pub mod item;
pub mod options;
pub mod scheduler;
pub mod sequencer;

pub use animator::{CompleteCallback, ProgressAnimator, ProgressCallback};
pub use item::{Item, ItemId, Sequence};
pub use options::{ConfigError, SequencerOptions, TabberConfig, DEFAULT_DURATION_MS};
pub use scheduler::{FrameCallback, FrameHandle, FrameScheduler, ManualFrameScheduler};
pub use sequencer::{MountState, Result, Sequencer, SequencerError, SequencerState};
