// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless tabber host.
//!
//! Loads a RON widget config, mounts a sequencer and drives it from a
//! ~60 Hz tokio interval, logging every item change until the requested
//! number of full cycles has played.
//!
//! ```text
//! tabber_demo [config.ron] [--cycles N]
//! ```

use clap::Parser;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tabber_sequencer::{
    ConfigError, ManualFrameScheduler, Sequencer, SequencerError, SequencerState, TabberConfig,
};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Demo errors
#[derive(Debug, Error)]
enum DemoError {
    /// Config could not be loaded or built
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Host fed back an index the engine rejected
    #[error("{0}")]
    Sequencer(#[from] SequencerError),
}

#[derive(Parser, Debug)]
#[command(name = "tabber_demo", version, about = "Headless tabber host")]
struct DemoArgs {
    /// Widget config in RON
    #[arg(default_value = "demos/basic.ron")]
    config: PathBuf,

    /// Full cycles to play before exiting
    #[arg(long, default_value_t = 1)]
    cycles: u32,
}

/// Sequencer plus the frame clock and the state its listeners report into
struct DemoHost {
    scheduler: ManualFrameScheduler,
    sequencer: Sequencer,
    cycles: Rc<Cell<u32>>,
    requested: Rc<Cell<Option<usize>>>,
}

impl DemoHost {
    fn new(config: TabberConfig) -> Result<Self, DemoError> {
        let scheduler = ManualFrameScheduler::new();
        let mut sequencer = config.build(Rc::new(scheduler.clone()))?;

        let cycles = Rc::new(Cell::new(0u32));
        let requested = Rc::new(Cell::new(None));

        let request = requested.clone();
        sequencer.on_active_change(move |index, item| {
            tracing::info!("Now showing #{} {} ({})", index, item.id, item.title);
            request.set(Some(index));
        });
        let counter = cycles.clone();
        sequencer.on_cycle_complete(move || {
            counter.set(counter.get() + 1);
            tracing::info!("Completed cycle {}", counter.get());
        });
        sequencer.on_progress_change(|progress| {
            tracing::trace!("Progress {:.0}%", progress * 100.0);
        });

        sequencer.mount();
        tracing::info!(
            "Showing #{} {} for {} ms (controlled: {})",
            sequencer.current_index(),
            sequencer.current_item().id,
            sequencer.current_duration_ms(),
            sequencer.is_controlled()
        );

        Ok(Self {
            scheduler,
            sequencer,
            cycles,
            requested,
        })
    }

    /// Run one frame. Returns false once there is nothing left to animate.
    fn frame(&mut self, delta_ms: f64) -> Result<bool, DemoError> {
        self.scheduler.advance(delta_ms);

        // A controlled engine only asks; answer the way a host would.
        let requested = self.requested.take();
        if self.sequencer.is_controlled() {
            if let Some(index) = requested {
                self.sequencer.set_active_index(index)?;
            }
        }

        if self.sequencer.state() != SequencerState::Playing
            || self.scheduler.pending_count() == 0
        {
            tracing::warn!(
                "Sequencer stopped playing at item #{}",
                self.sequencer.current_index()
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn cycles(&self) -> u32 {
        self.cycles.get()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = DemoArgs::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tabber_demo=info,tabber_sequencer=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tabber demo v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        tracing::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: DemoArgs) -> Result<(), DemoError> {
    let config = TabberConfig::load(&args.config)?;
    let mut host = DemoHost::new(config)?;

    if host.sequencer.state() != SequencerState::Playing {
        tracing::warn!("Auto-play is off or the first item has no duration; nothing to play");
        return Ok(());
    }

    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();

    while host.cycles() < args.cycles {
        interval.tick().await;
        let now = Instant::now();
        let keep_going = host.frame(now.duration_since(last).as_secs_f64() * 1000.0)?;
        last = now;
        if !keep_going {
            break;
        }
    }

    host.sequencer.destroy();
    tracing::info!("Played {} cycle(s)", host.cycles());
    Ok(())
}
