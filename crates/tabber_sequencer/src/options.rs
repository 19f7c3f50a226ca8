// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host-supplied configuration and RON config documents.

use crate::item::Sequence;
use crate::scheduler::FrameScheduler;
use crate::sequencer::{Sequencer, SequencerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

/// Default display duration for items without their own
pub const DEFAULT_DURATION_MS: f64 = 5000.0;

/// Engine options, all optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerOptions {
    /// Advance automatically when an item's time is up
    pub auto_play: bool,
    /// Fallback duration (ms) for items without an explicit one
    pub default_duration_ms: f64,
    /// Host-owned active index; presence selects controlled mode
    pub active_index: Option<usize>,
    /// Initial index in uncontrolled mode
    pub default_active_index: usize,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            auto_play: true,
            default_duration_ms: DEFAULT_DURATION_MS,
            active_index: None,
            default_active_index: 0,
        }
    }
}

impl SequencerOptions {
    /// Set auto-play
    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    /// Set the fallback duration
    pub fn with_default_duration(mut self, duration_ms: f64) -> Self {
        self.default_duration_ms = duration_ms;
        self
    }

    /// Switch to controlled mode starting at `index`
    pub fn controlled(mut self, index: usize) -> Self {
        self.active_index = Some(index);
        self
    }

    /// Set the initial uncontrolled index
    pub fn with_default_active_index(mut self, index: usize) -> Self {
        self.default_active_index = index;
        self
    }

    /// Whether these options select controlled mode
    pub fn is_controlled(&self) -> bool {
        self.active_index.is_some()
    }

    /// Check indices against a sequence of `len` items
    pub fn validate(&self, len: usize) -> Result<(), SequencerError> {
        if len == 0 {
            return Err(SequencerError::EmptySequence);
        }

        if self.default_active_index >= len {
            return Err(SequencerError::DefaultIndexOutOfBounds {
                index: self.default_active_index,
                len,
            });
        }

        match self.active_index {
            Some(index) if index >= len => {
                Err(SequencerError::ActiveIndexOutOfBounds { index, len })
            }
            _ => Ok(()),
        }
    }
}

/// Config loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON syntax or schema error, including invalid item lists
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Options rejected by the engine
    #[error("Invalid configuration: {0}")]
    Sequencer(#[from] SequencerError),
}

/// A complete widget configuration: items plus options
#[derive(Debug, Clone, Deserialize)]
pub struct TabberConfig {
    /// Engine options
    #[serde(default)]
    pub options: SequencerOptions,
    /// Items to cycle through
    pub items: Sequence,
}

impl TabberConfig {
    /// Parse a RON document
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.options.validate(config.items.len())?;
        Ok(config)
    }

    /// Load and parse a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&source)?;
        tracing::info!(
            "Loaded {} items from {}",
            config.items.len(),
            path.display()
        );
        Ok(config)
    }

    /// Build an engine on `scheduler`
    pub fn build(self, scheduler: Rc<dyn FrameScheduler>) -> Result<Sequencer, ConfigError> {
        Ok(Sequencer::new(self.items, self.options, scheduler)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualFrameScheduler;

    const CONFIG: &str = r#"(
        options: (
            auto_play: true,
            default_duration_ms: 500.0,
        ),
        items: [
            (id: "intro", duration_ms: Some(1000.0), title: "Intro"),
            (id: "features", duration_ms: Some(2000.0), title: "Features"),
            (id: "pricing", title: "Pricing", image: Some("pricing.png")),
        ],
    )"#;

    #[test]
    fn test_defaults() {
        let options = SequencerOptions::default();
        assert!(options.auto_play);
        assert_eq!(options.default_duration_ms, DEFAULT_DURATION_MS);
        assert!(!options.is_controlled());
        assert_eq!(options.default_active_index, 0);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(SequencerOptions::default().validate(3).is_ok());
        assert!(matches!(
            SequencerOptions::default().validate(0),
            Err(SequencerError::EmptySequence)
        ));
        assert!(matches!(
            SequencerOptions::default().with_default_active_index(3).validate(3),
            Err(SequencerError::DefaultIndexOutOfBounds { index: 3, len: 3 })
        ));
        assert!(matches!(
            SequencerOptions::default().controlled(5).validate(3),
            Err(SequencerError::ActiveIndexOutOfBounds { index: 5, len: 3 })
        ));
    }

    #[test]
    fn test_parse_config() {
        let config = TabberConfig::from_ron_str(CONFIG).unwrap();
        assert_eq!(config.items.len(), 3);
        assert_eq!(config.options.default_duration_ms, 500.0);
        assert!(config.options.auto_play);
        assert_eq!(config.options.active_index, None);
        assert_eq!(config.items.resolve_duration(2, config.options.default_duration_ms), 500.0);
        assert_eq!(
            config.items.get(2).and_then(|item| item.image.as_deref()),
            Some("pricing.png")
        );
    }

    #[test]
    fn test_parse_rejects_empty_items() {
        let err = TabberConfig::from_ron_str("(items: [])").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_out_of_bounds_index() {
        let err = TabberConfig::from_ron_str(
            r#"(options: (active_index: Some(4)), items: [(id: "a"), (id: "b")])"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Sequencer(SequencerError::ActiveIndexOutOfBounds { index: 4, len: 2 })
        ));
    }

    #[test]
    fn test_build_from_config() {
        let scheduler = ManualFrameScheduler::new();
        let config = TabberConfig::from_ron_str(CONFIG).unwrap();
        let sequencer = config.build(Rc::new(scheduler)).unwrap();
        assert_eq!(sequencer.current_index(), 0);
        assert_eq!(sequencer.current_item().title, "Intro");
        assert!(!sequencer.is_controlled());
    }

    #[test]
    fn test_load_missing_file() {
        let err = TabberConfig::load("/nonexistent/tabber.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
