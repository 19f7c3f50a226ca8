// SPDX-License-Identifier: MIT OR Apache-2.0
//! Items and the ordered sequence they are cycled through.

use crate::sequencer::{Result, SequencerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier for an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create an ID from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random item ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One entry in the sequence.
///
/// Only `id` and `duration_ms` matter to the engine; the rest is presentation
/// payload carried through to the renderer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item ID, used for lookup by the host
    pub id: ItemId,
    /// Display duration in milliseconds, `None` to inherit the default
    #[serde(default)]
    pub duration_ms: Option<f64>,
    /// Tab title
    #[serde(default)]
    pub title: String,
    /// Tab description
    #[serde(default)]
    pub description: String,
    /// Image source shown while active
    #[serde(default)]
    pub image: Option<String>,
    /// Free-form data for custom renderers
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Item {
    /// Create a new item with no explicit duration
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            duration_ms: None,
            title: String::new(),
            description: String::new(),
            image: None,
            data: None,
        }
    }

    /// Set the display duration
    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Set title and description
    pub fn with_text(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.title = title.into();
        self.description = description.into();
        self
    }

    /// Set the image source
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Attach render data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The item's own duration, if it is usable.
    ///
    /// Zero, negative and non-finite values count as "not set".
    pub fn explicit_duration(&self) -> Option<f64> {
        self.duration_ms.filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// Ordered, non-empty list of items
#[derive(Debug, Clone)]
pub struct Sequence {
    items: Vec<Item>,
}

impl Sequence {
    /// Build a sequence, rejecting empty input.
    ///
    /// IDs are not required to be unique; lookups by ID find the first match.
    pub fn new(items: impl IntoIterator<Item = Item>) -> Result<Self> {
        let items: Vec<Item> = items.into_iter().collect();
        if items.is_empty() {
            return Err(SequencerError::EmptySequence);
        }

        Ok(Self { items })
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get an item by position
    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    /// Position of the first item with `id`
    pub fn index_of(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    /// Iterate items in order
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    /// Whether `index` is a valid position
    pub fn contains_index(&self, index: usize) -> bool {
        index < self.items.len()
    }

    /// Display duration for the item at `index`.
    ///
    /// Falls back to `default_ms` when the item has no usable duration. A
    /// default that is not a positive finite number resolves to 0.
    pub fn resolve_duration(&self, index: usize, default_ms: f64) -> f64 {
        if let Some(duration) = self.get(index).and_then(Item::explicit_duration) {
            return duration;
        }

        if default_ms.is_finite() && default_ms > 0.0 {
            default_ms
        } else {
            if self.contains_index(index) {
                tracing::debug!(
                    "Unusable default duration {} for item {}, treating as 0",
                    default_ms,
                    index
                );
            }
            0.0
        }
    }
}

impl Serialize for Sequence {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(&self.items)
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let items = Vec::<Item>::deserialize(deserializer)?;
        Sequence::new(items).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_rejects_empty() {
        let err = Sequence::new(Vec::new()).unwrap_err();
        assert!(matches!(err, SequencerError::EmptySequence));
    }

    #[test]
    fn test_sequence_accepts_duplicate_ids() {
        let sequence = Sequence::new([
            Item::new("a").with_duration(100.0),
            Item::new("b"),
            Item::new("a").with_duration(300.0),
        ])
        .unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.index_of(&ItemId::new("a")), Some(0));
        assert_eq!(sequence.resolve_duration(2, 500.0), 300.0);
    }

    #[test]
    fn test_sequence_preserves_order() {
        let sequence = Sequence::new([Item::new("c"), Item::new("a"), Item::new("b")]).unwrap();
        let ids: Vec<_> = sequence.items().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(sequence.index_of(&ItemId::new("a")), Some(1));
        assert_eq!(sequence.index_of(&ItemId::new("z")), None);
        assert_eq!(sequence.get(2).map(|item| item.id.as_str()), Some("b"));
        assert!(sequence.get(3).is_none());
    }

    #[test]
    fn test_duration_resolution() {
        let sequence = Sequence::new([
            Item::new("explicit").with_duration(1000.0),
            Item::new("inherit"),
            Item::new("zero").with_duration(0.0),
            Item::new("negative").with_duration(-5.0),
            Item::new("nan").with_duration(f64::NAN),
        ])
        .unwrap();

        assert_eq!(sequence.resolve_duration(0, 500.0), 1000.0);
        assert_eq!(sequence.resolve_duration(1, 500.0), 500.0);
        assert_eq!(sequence.resolve_duration(2, 500.0), 500.0);
        assert_eq!(sequence.resolve_duration(3, 500.0), 500.0);
        assert_eq!(sequence.resolve_duration(4, 500.0), 500.0);
    }

    #[test]
    fn test_invalid_default_resolves_to_zero() {
        let sequence = Sequence::new([Item::new("a"), Item::new("b").with_duration(200.0)]).unwrap();
        assert_eq!(sequence.resolve_duration(0, 0.0), 0.0);
        assert_eq!(sequence.resolve_duration(0, -1.0), 0.0);
        assert_eq!(sequence.resolve_duration(0, f64::INFINITY), 0.0);
        assert_eq!(sequence.resolve_duration(1, f64::NAN), 200.0);
    }

    #[test]
    fn test_item_deserialization() {
        let item: Item = serde_json::from_str(
            r#"{"id": "intro", "duration_ms": 4000, "title": "Intro", "data": {"accent": "blue"}}"#,
        )
        .unwrap();
        assert_eq!(item.id, ItemId::new("intro"));
        assert_eq!(item.explicit_duration(), Some(4000.0));
        assert_eq!(item.title, "Intro");
        assert!(item.description.is_empty());
        assert_eq!(item.data, Some(serde_json::json!({"accent": "blue"})));
    }

    #[test]
    fn test_sequence_serializes_as_list() {
        let sequence = Sequence::new([Item::new("a").with_duration(100.0), Item::new("b")]).unwrap();
        let source = ron::to_string(&sequence).unwrap();
        let parsed: Sequence = ron::from_str(&source).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get(0), sequence.get(0));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ItemId::generate(), ItemId::generate());
    }
}
