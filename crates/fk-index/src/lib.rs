#![forbid(unsafe_code)]

use std::collections::HashMap;

use fk_types::Cell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("label {label:?} not found in index")]
    NotFound { label: String },
    #[error("position {position} out of range [0, {len})")]
    OutOfRange { position: usize, len: usize },
}

/// Ordered sequence of cell labels with an optional name.
///
/// Labels are not required to be unique; label lookup returns the first
/// occurrence. Set algebra and de-duplication key on the canonical text
/// rendering of each label, the same discipline used for composed
/// group/join keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<Cell>,
    name: Option<String>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<Cell>, name: Option<String>) -> Self {
        Self { labels, name }
    }

    /// Default index: labels 0..n-1.
    #[must_use]
    pub fn range(len: usize) -> Self {
        Self {
            labels: (0..len as i64).map(Cell::Int64).collect(),
            name: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    #[must_use]
    pub fn labels(&self) -> &[Cell] {
        &self.labels
    }

    pub fn get(&self, position: usize) -> Result<&Cell, IndexError> {
        self.labels.get(position).ok_or(IndexError::OutOfRange {
            position,
            len: self.labels.len(),
        })
    }

    /// Position of the first occurrence of `label`.
    pub fn position(&self, label: &Cell) -> Result<usize, IndexError> {
        self.labels
            .iter()
            .position(|candidate| candidate == label)
            .ok_or_else(|| IndexError::NotFound {
                label: label.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, label: &Cell) -> bool {
        self.labels.iter().any(|candidate| candidate == label)
    }

    /// Owned copy of the labels in `[start, end)`, clamped to bounds.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.labels.len());
        let start = start.min(end);
        Self {
            labels: self.labels[start..end].to_vec(),
            name: self.name.clone(),
        }
    }

    /// Index extended by one label.
    #[must_use]
    pub fn append(&self, label: Cell) -> Self {
        let mut labels = self.labels.clone();
        labels.push(label);
        Self {
            labels,
            name: self.name.clone(),
        }
    }

    /// Labels at the given positions, in the given order. Positions must
    /// have been produced against this index.
    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Self {
        Self {
            labels: positions
                .iter()
                .filter_map(|&pos| self.labels.get(pos).cloned())
                .collect(),
            name: self.name.clone(),
        }
    }

    /// Reset to the default 0..n-1 range.
    #[must_use]
    pub fn reset(&self) -> Self {
        Self::range(self.labels.len())
    }

    /// Canonical text rendering of every label.
    #[must_use]
    pub fn to_text(&self) -> Vec<String> {
        self.labels.iter().map(Cell::to_string).collect()
    }

    fn seen_map(labels: &[Cell]) -> HashMap<String, ()> {
        let mut seen = HashMap::with_capacity(labels.len());
        for label in labels {
            seen.entry(label.to_string()).or_insert(());
        }
        seen
    }

    /// Union: self's labels then other's unseen labels, de-duplicated,
    /// first-appearance order.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut seen = HashMap::<String, ()>::new();
        let mut labels = Vec::with_capacity(self.labels.len() + other.labels.len());
        for label in self.labels.iter().chain(other.labels.iter()) {
            if seen.insert(label.to_string(), ()).is_none() {
                labels.push(label.clone());
            }
        }
        Self {
            labels,
            name: self.name.clone(),
        }
    }

    /// Intersection, de-duplicated, in self's first-appearance order.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let other_set = Self::seen_map(&other.labels);
        let mut seen = HashMap::<String, ()>::new();
        let labels = self
            .labels
            .iter()
            .filter(|label| {
                let key = label.to_string();
                other_set.contains_key(&key) && seen.insert(key, ()).is_none()
            })
            .cloned()
            .collect();
        Self {
            labels,
            name: self.name.clone(),
        }
    }

    /// Labels in self but not in other, in self's order.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let other_set = Self::seen_map(&other.labels);
        let labels = self
            .labels
            .iter()
            .filter(|label| !other_set.contains_key(&label.to_string()))
            .cloned()
            .collect();
        Self {
            labels,
            name: self.name.clone(),
        }
    }
}
