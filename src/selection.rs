//! Selection store: the shared "what is the user looking at" state.
//!
//! DESIGN
//! ======
//! Selection is replaced, never patched: [`SelectionStore::set_selected_entities`]
//! swaps the whole ID set and reports what kind of change it was, so the
//! caller decides whether a backend request is due. Feature selection is an
//! ordered list with toggle semantics; the most recently enabled feature is
//! shown first.

#[cfg(test)]
#[path = "selection_test.rs"]
mod selection_test;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{EntityId, FeatureContributions, FeatureKey, TimeRange};

/// Current selection for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub selected_entities: BTreeSet<EntityId>,
    /// Display order: index 0 is the most recently enabled feature.
    pub selected_features: Vec<FeatureKey>,
    pub hovered_entity: Option<EntityId>,
    pub time_range: Option<TimeRange>,
}

impl SelectionState {
    #[must_use]
    pub fn is_feature_selected(&self, key: &FeatureKey) -> bool {
        self.selected_features.contains(key)
    }

    #[must_use]
    pub fn is_entity_selected(&self, id: &EntityId) -> bool {
        self.selected_entities.contains(id)
    }

    /// How a mark for `id` should be drawn.
    ///
    /// Everything is highlighted while nothing is selected; otherwise only
    /// the selection and the hovered entity are.
    #[must_use]
    pub fn emphasis(&self, id: &EntityId) -> Emphasis {
        if self.hovered_entity.as_ref() == Some(id)
            || self.selected_entities.is_empty()
            || self.selected_entities.contains(id)
        {
            Emphasis::Highlighted
        } else {
            Emphasis::Dimmed
        }
    }
}

/// Draw style derived from selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Emphasis {
    Highlighted,
    Dimmed,
}

/// Outcome of replacing the entity selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySelectionChange {
    /// New non-empty set; scores must be recomputed.
    Changed,
    /// Selection is now empty; views reset, nothing to fetch.
    Cleared,
    /// Same set as before.
    Unchanged,
}

/// Outcome of a feature toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureToggle {
    Enabled,
    Disabled,
}

/// Owns [`SelectionState`]; the only way to mutate it.
#[derive(Debug, Clone, Default)]
pub struct SelectionStore {
    state: SelectionState,
}

impl SelectionStore {
    #[must_use]
    pub fn new(state: SelectionState) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Replace the selected entity set atomically. Duplicate IDs collapse.
    pub fn set_selected_entities(&mut self, ids: impl IntoIterator<Item = EntityId>) -> EntitySelectionChange {
        let next: BTreeSet<EntityId> = ids.into_iter().collect();
        if next == self.state.selected_entities {
            return EntitySelectionChange::Unchanged;
        }
        self.state.selected_entities = next;
        if self.state.selected_entities.is_empty() {
            EntitySelectionChange::Cleared
        } else {
            EntitySelectionChange::Changed
        }
    }

    /// Enable `key` at the head of the list, or remove it if present.
    pub fn toggle_feature(&mut self, key: FeatureKey) -> FeatureToggle {
        if let Some(idx) = self.state.selected_features.iter().position(|k| *k == key) {
            self.state.selected_features.remove(idx);
            FeatureToggle::Disabled
        } else {
            self.state.selected_features.insert(0, key);
            FeatureToggle::Enabled
        }
    }

    /// Returns `true` if the hovered entity changed.
    pub fn set_hovered_entity(&mut self, id: Option<EntityId>) -> bool {
        if self.state.hovered_entity == id {
            return false;
        }
        self.state.hovered_entity = id;
        true
    }

    pub fn set_time_range(&mut self, range: Option<TimeRange>) {
        self.state.time_range = range;
    }

    /// Replace everything, e.g. on dataset switch.
    pub fn reset(&mut self, state: SelectionState) {
        self.state = state;
    }
}

/// Order the feature picker: selected features first, then by descending
/// peak absolute contribution. Features without a contribution row sort
/// after those with one; ties keep dataset order.
#[must_use]
pub fn feature_list_order(
    features: &[FeatureKey],
    selected: &[FeatureKey],
    contributions: Option<&FeatureContributions>,
) -> Vec<FeatureKey> {
    let mut ranked: Vec<(usize, &FeatureKey, bool, Option<f64>)> = features
        .iter()
        .enumerate()
        .map(|(i, key)| (i, key, selected.contains(key), contributions.and_then(|fc| fc.max_abs(i))))
        .collect();
    ranked.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| match (a.3, b.3) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.into_iter().map(|(_, key, _, _)| key.clone()).collect()
}
