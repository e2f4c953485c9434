use super::*;

fn ids(raw: &[&str]) -> Vec<EntityId> {
    raw.iter().map(|s| EntityId::from(*s)).collect()
}

fn store_with_features(raw: &[&str]) -> SelectionStore {
    SelectionStore::new(SelectionState {
        selected_features: raw.iter().map(|s| FeatureKey::from(*s)).collect(),
        ..SelectionState::default()
    })
}

fn feature_names(store: &SelectionStore) -> Vec<&str> {
    store.state().selected_features.iter().map(FeatureKey::as_str).collect()
}

// =============================================================================
// set_selected_entities
// =============================================================================

#[test]
fn new_selection_reports_changed() {
    let mut store = SelectionStore::default();
    assert_eq!(store.set_selected_entities(ids(&["a", "b"])), EntitySelectionChange::Changed);
    assert_eq!(store.state().selected_entities.len(), 2);
}

#[test]
fn duplicate_ids_collapse() {
    let mut store = SelectionStore::default();
    store.set_selected_entities(ids(&["a", "a", "b"]));
    assert_eq!(store.state().selected_entities.len(), 2);
}

#[test]
fn identical_selection_is_unchanged_regardless_of_order() {
    let mut store = SelectionStore::default();
    store.set_selected_entities(ids(&["a", "b"]));
    assert_eq!(store.set_selected_entities(ids(&["b", "a"])), EntitySelectionChange::Unchanged);
}

#[test]
fn empty_selection_clears() {
    let mut store = SelectionStore::default();
    store.set_selected_entities(ids(&["a"]));
    assert_eq!(store.set_selected_entities(Vec::new()), EntitySelectionChange::Cleared);
    assert!(store.state().selected_entities.is_empty());
    assert_eq!(store.set_selected_entities(Vec::new()), EntitySelectionChange::Unchanged);
}

#[test]
fn selection_replaces_rather_than_extends() {
    let mut store = SelectionStore::default();
    store.set_selected_entities(ids(&["a", "b"]));
    store.set_selected_entities(ids(&["c"]));
    assert_eq!(store.state().selected_entities, ids(&["c"]).into_iter().collect::<BTreeSet<_>>());
}

// =============================================================================
// toggle_feature
// =============================================================================

#[test]
fn toggle_on_inserts_at_head() {
    let mut store = store_with_features(&["cpu_idle"]);
    assert_eq!(store.toggle_feature("mem_total".into()), FeatureToggle::Enabled);
    assert_eq!(feature_names(&store), vec!["mem_total", "cpu_idle"]);
}

#[test]
fn toggle_off_removes_and_keeps_order() {
    let mut store = store_with_features(&["a", "b", "c"]);
    assert_eq!(store.toggle_feature("b".into()), FeatureToggle::Disabled);
    assert_eq!(feature_names(&store), vec!["a", "c"]);
}

#[test]
fn toggle_twice_moves_feature_to_head() {
    let mut store = store_with_features(&["a", "b"]);
    store.toggle_feature("b".into());
    store.toggle_feature("b".into());
    assert_eq!(feature_names(&store), vec!["b", "a"]);
}

// =============================================================================
// hover / time range / emphasis
// =============================================================================

#[test]
fn hover_reports_only_real_changes() {
    let mut store = SelectionStore::default();
    assert!(store.set_hovered_entity(Some("a".into())));
    assert!(!store.set_hovered_entity(Some("a".into())));
    assert!(store.set_hovered_entity(None));
    assert!(!store.set_hovered_entity(None));
}

#[test]
fn time_range_set_and_cleared() {
    let mut store = SelectionStore::default();
    store.set_time_range(Some(TimeRange::new(1, 2)));
    assert_eq!(store.state().time_range, Some(TimeRange::new(1, 2)));
    store.set_time_range(None);
    assert_eq!(store.state().time_range, None);
}

#[test]
fn empty_selection_highlights_everything() {
    let state = SelectionState::default();
    assert_eq!(state.emphasis(&"any".into()), Emphasis::Highlighted);
}

#[test]
fn non_empty_selection_dims_unselected() {
    let mut store = SelectionStore::default();
    store.set_selected_entities(ids(&["a"]));
    assert_eq!(store.state().emphasis(&"a".into()), Emphasis::Highlighted);
    assert_eq!(store.state().emphasis(&"b".into()), Emphasis::Dimmed);
    store.set_hovered_entity(Some("b".into()));
    assert_eq!(store.state().emphasis(&"b".into()), Emphasis::Highlighted);
}

#[test]
fn reset_replaces_state() {
    let mut store = store_with_features(&["a"]);
    store.set_selected_entities(ids(&["x"]));
    store.reset(SelectionState::default());
    assert_eq!(store.state(), &SelectionState::default());
}

// =============================================================================
// feature_list_order
// =============================================================================

fn keys(raw: &[&str]) -> Vec<FeatureKey> {
    raw.iter().map(|s| FeatureKey::from(*s)).collect()
}

#[test]
fn feature_order_puts_selected_first_then_by_contribution() {
    let features = keys(&["a", "b", "c", "d"]);
    let fc = FeatureContributions {
        agg_feat_contrib_mat: vec![vec![0.1], vec![-0.8], vec![0.5], vec![0.9]],
        order_col: vec![0],
    };
    let order = feature_list_order(&features, &keys(&["c"]), Some(&fc));
    assert_eq!(order, keys(&["c", "d", "b", "a"]));
}

#[test]
fn feature_order_without_contributions_keeps_dataset_order() {
    let features = keys(&["a", "b", "c"]);
    let order = feature_list_order(&features, &keys(&["c", "b"]), None);
    assert_eq!(order, keys(&["b", "c", "a"]));
}

#[test]
fn feature_order_missing_rows_sort_last() {
    let features = keys(&["a", "b", "c"]);
    let fc = FeatureContributions { agg_feat_contrib_mat: vec![vec![0.1]], order_col: vec![0] };
    let order = feature_list_order(&features, &[], Some(&fc));
    assert_eq!(order, keys(&["a", "b", "c"]));
    let fc = FeatureContributions { agg_feat_contrib_mat: vec![vec![], vec![0.2]], order_col: vec![0] };
    assert_eq!(feature_list_order(&features, &[], Some(&fc)), keys(&["b", "a", "c"]));
}
