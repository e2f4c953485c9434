#![allow(clippy::float_cmp)]

use super::*;
use crate::model::{BaselineRecord, ProjectionMethod, TimeRange};
use crate::test_helpers::{baseline, cluster_result, projection, telemetry, zscores};
use gesture::scale::LinearScale;

fn preset(entities: &[&str], features: &[&str]) -> DatasetPreset {
    DatasetPreset {
        selected_entities: entities.iter().map(|s| EntityId::from(*s)).collect(),
        selected_features: features.iter().map(|s| FeatureKey::from(*s)).collect(),
        ..DatasetPreset::empty("ganglia.csv")
    }
}

fn key(s: &str) -> FeatureKey {
    FeatureKey::from(s)
}

fn id(s: &str) -> EntityId {
    EntityId::from(s)
}

fn decomposition(cells: &[(&str, &str, f64)]) -> Decomposition {
    Decomposition { zscores: zscores(cells), baselines: Vec::new() }
}

/// Coordinator with A and B selected and `cpu_idle` scored for both.
fn loaded() -> Coordinator {
    let mut c = Coordinator::new(preset(&["A", "B"], &["cpu_idle"]));
    let plan = c.load_plan();
    let ticket = plan.decomposition.unwrap();
    c.apply_decomposition(&ticket, decomposition(&[("A", "cpu_idle", 1.0), ("B", "cpu_idle", 2.0)]))
        .unwrap();
    c
}

fn enabled(outcome: ToggleOutcome) -> (Option<DecompositionTicket>, Option<EntityDataTicket>) {
    match outcome {
        ToggleOutcome::Enabled { decomposition, entity_data } => (decomposition, entity_data),
        other => panic!("expected Enabled, got {other:?}"),
    }
}

fn chart() -> ChartScales {
    ChartScales::new(LinearScale::new((0.0, 100.0), (0.0, 500.0)), LinearScale::new((0.0, 100.0), (200.0, 0.0)))
}

// =============================================================================
// load plan
// =============================================================================

#[test]
fn load_plan_requests_everything_for_preset_selection() {
    let mut c = Coordinator::new(preset(&["B", "A"], &["cpu_idle", "mem_total"]));
    let plan = c.load_plan();
    assert_eq!(plan.entity_data.features, vec![key("cpu_idle"), key("mem_total")]);
    assert_eq!(plan.projection.params, c.params());
    let d = plan.decomposition.unwrap();
    assert_eq!(d.request.entities, vec![id("A"), id("B")]);
    assert_eq!(d.request.features, vec![key("cpu_idle"), key("mem_total")]);
    assert!(d.request.recompute);
    assert_eq!(d.request.baseline_edit, None);
    assert_eq!(d.stamp.scope, RequestScope::Selection);
}

#[test]
fn load_plan_without_entities_skips_decomposition() {
    let mut c = Coordinator::new(preset(&[], &["cpu_idle"]));
    assert!(c.load_plan().decomposition.is_none());
}

// =============================================================================
// feature toggles
// =============================================================================

#[test]
fn enabling_feature_merges_new_column_beside_existing_ones() {
    let mut c = loaded();
    let (ticket, data) = enabled(c.toggle_feature(key("mem_total")));
    let ticket = ticket.unwrap();
    assert_eq!(c.selection().state().selected_features, vec![key("mem_total"), key("cpu_idle")]);
    assert_eq!(ticket.request.features, vec![key("mem_total")]);
    assert_eq!(ticket.request.entities, vec![id("A"), id("B")]);
    assert!(ticket.request.recompute);
    assert!(data.is_some(), "column not loaded yet");

    let applied = c.apply_decomposition(&ticket, decomposition(&[("A", "mem_total", 0.5)])).unwrap();
    assert_eq!(applied, Applied { columns: 1, cells: 1, baselines: 0 });
    assert_eq!(c.zscores().value(&id("A"), &key("mem_total")), Some(0.5));
    assert_eq!(c.zscores().value(&id("A"), &key("cpu_idle")), Some(1.0));
    assert_eq!(c.zscores().value(&id("B"), &key("cpu_idle")), Some(2.0));
    assert!(!c.zscores().row(&id("B")).unwrap().has_value(&key("mem_total")));
}

#[test]
fn disabling_feature_purges_column_and_stales_inflight_answer() {
    let mut c = loaded();
    let (ticket, _) = enabled(c.toggle_feature(key("mem_total")));
    let ticket = ticket.unwrap();

    assert_eq!(c.toggle_feature(key("cpu_idle")), ToggleOutcome::Disabled { purged: 2 });
    assert!(!c.zscores().has_column(&key("cpu_idle")));

    assert_eq!(c.toggle_feature(key("mem_total")), ToggleOutcome::Disabled { purged: 0 });
    let err = c.apply_decomposition(&ticket, decomposition(&[("A", "mem_total", 0.5)])).unwrap_err();
    assert!(matches!(err, MergeError::StaleResponse { .. }));
    assert!(!c.zscores().has_column(&key("mem_total")));
}

#[test]
fn out_of_order_answers_keep_the_newest_toggle() {
    let mut c = loaded();
    let (first, _) = enabled(c.toggle_feature(key("mem_total")));
    c.toggle_feature(key("mem_total"));
    let (second, _) = enabled(c.toggle_feature(key("mem_total")));

    c.apply_decomposition(&second.unwrap(), decomposition(&[("A", "mem_total", 9.0)])).unwrap();
    assert!(c.apply_decomposition(&first.unwrap(), decomposition(&[("A", "mem_total", 1.0)])).is_err());
    assert_eq!(c.zscores().value(&id("A"), &key("mem_total")), Some(9.0));
}

#[test]
fn enabling_without_entities_issues_no_decomposition() {
    let mut c = Coordinator::new(preset(&[], &[]));
    let (ticket, data) = enabled(c.toggle_feature(key("cpu_idle")));
    assert!(ticket.is_none());
    assert_eq!(data.unwrap().features, vec![key("cpu_idle")]);
}

#[test]
fn enabling_loaded_column_skips_entity_data() {
    let mut c = loaded();
    let plan_data = EntityDataTicket {
        request_id: Uuid::new_v4(),
        dataset: DatasetTag { name: "ganglia.csv".into(), generation: 0 },
        features: vec![key("cpu_idle"), key("mem_total")],
    };
    let table = telemetry(&[(0, "A", &[("cpu_idle", 1.0), ("mem_total", 2.0)])]);
    c.apply_entity_data(&plan_data, EntityData { table }).unwrap();
    let (_, data) = enabled(c.toggle_feature(key("mem_total")));
    assert!(data.is_none());
}

#[test]
fn unknown_feature_is_rejected_once_catalog_is_known() {
    let mut c = loaded();
    let tag = c.dataset_tag();
    c.apply_feature_metadata(&tag, vec![FeatureMetadata { key: key("cpu_idle"), units: Some("%".into()) }])
        .unwrap();
    assert_eq!(c.toggle_feature(key("bogus")), ToggleOutcome::Unknown);
    assert_eq!(c.selection().state().selected_features, vec![key("cpu_idle")]);
}

#[test]
fn selection_answer_skips_columns_superseded_since_issue() {
    let mut c = Coordinator::new(preset(&["A"], &["cpu_idle", "mem_total"]));
    let ticket = c.load_plan().decomposition.unwrap();
    c.toggle_feature(key("mem_total"));

    let applied = c
        .apply_decomposition(&ticket, decomposition(&[("A", "cpu_idle", 1.0), ("A", "mem_total", 2.0)]))
        .unwrap();
    assert_eq!(applied.columns, 1);
    assert_eq!(c.zscores().value(&id("A"), &key("cpu_idle")), Some(1.0));
    assert_eq!(c.zscores().value(&id("A"), &key("mem_total")), None);
}

// =============================================================================
// entity selection
// =============================================================================

#[test]
fn newer_selection_stales_older_answers() {
    let mut c = loaded();
    let first = c.select_entities([id("A"), id("C")]).ticket.unwrap();
    let second = c.select_entities([id("C")]).ticket.unwrap();
    assert_eq!(second.request.entities, vec![id("C")]);

    c.apply_decomposition(&second, decomposition(&[("C", "cpu_idle", 3.0)])).unwrap();
    let err = c.apply_decomposition(&first, decomposition(&[("A", "cpu_idle", 7.0)])).unwrap_err();
    assert!(matches!(err, MergeError::StaleResponse { .. }));

    let ids: Vec<&EntityId> = c.zscores().entity_ids().collect();
    assert_eq!(ids, vec![&id("C")]);
}

#[test]
fn selection_change_stales_feature_answers() {
    let mut c = loaded();
    let (ticket, _) = enabled(c.toggle_feature(key("mem_total")));
    c.select_entities([id("B")]);
    assert!(c.apply_decomposition(&ticket.unwrap(), decomposition(&[("A", "mem_total", 1.0)])).is_err());
}

#[test]
fn identical_selection_is_a_no_op() {
    let mut c = loaded();
    let outcome = c.select_entities([id("B"), id("A"), id("A")]);
    assert_eq!(outcome.change, EntitySelectionChange::Unchanged);
    assert!(outcome.ticket.is_none());
    assert_eq!(c.zscores().len(), 2);
}

#[test]
fn clearing_selection_drops_scores_and_inflight_work() {
    let mut c = loaded();
    let inflight = c.select_entities([id("C")]).ticket.unwrap();
    let outcome = c.select_entities(Vec::<EntityId>::new());
    assert_eq!(outcome.change, EntitySelectionChange::Cleared);
    assert!(outcome.ticket.is_none());
    assert!(c.zscores().is_empty());
    assert!(c.apply_decomposition(&inflight, decomposition(&[("C", "cpu_idle", 1.0)])).is_err());
    assert!(c.zscores().is_empty());
}

// =============================================================================
// baselines
// =============================================================================

#[test]
fn selection_answer_seeds_baselines() {
    let mut c = Coordinator::new(preset(&["A"], &["cpu_idle"]));
    let ticket = c.load_plan().decomposition.unwrap();
    let response = Decomposition {
        zscores: zscores(&[("A", "cpu_idle", 1.0)]),
        baselines: vec![baseline("cpu_idle", 10, 50, 0.0, 100.0), baseline("disk_free", 0, 1, 0.0, 1.0)],
    };
    let applied = c.apply_decomposition(&ticket, response).unwrap();
    assert_eq!(applied.baselines, 1);
    assert_eq!(c.baselines().records().len(), 1);
    assert_eq!(c.snapshot().baseline(&key("cpu_idle")).unwrap().time, TimeRange::new(10, 50));
}

#[test]
fn brush_commit_issues_rescore_against_edited_region() {
    let mut c = loaded();
    let (edit, ticket) = c
        .commit_baseline_brush(&key("cpu_idle"), PixelRect::new(50.0, 0.0, 250.0, 100.0), &chart())
        .unwrap();
    assert_eq!(edit.region.time, TimeRange::new(10, 50));
    let ticket = ticket.unwrap();
    assert_eq!(ticket.stamp.scope, RequestScope::Feature(key("cpu_idle")));
    assert!(!ticket.request.recompute);
    assert_eq!(ticket.request.baseline_edit, Some(edit.region));
    assert_eq!(ticket.request.features, vec![key("cpu_idle")]);

    let response = Decomposition {
        zscores: zscores(&[("A", "cpu_idle", -1.0), ("B", "cpu_idle", -2.0)]),
        baselines: vec![BaselineRecord { feature: key("cpu_idle"), region: edit.region }],
    };
    c.apply_decomposition(&ticket, response).unwrap();
    assert_eq!(c.zscores().value(&id("B"), &key("cpu_idle")), Some(-2.0));
    assert_eq!(c.baselines().region(&key("cpu_idle")), Some(edit.region));
}

#[test]
fn brush_commit_without_entities_only_edits() {
    let mut c = Coordinator::new(preset(&[], &["cpu_idle"]));
    let (edit, ticket) = c
        .commit_baseline_brush(&key("cpu_idle"), PixelRect::new(50.0, 0.0, 250.0, 100.0), &chart())
        .unwrap();
    assert!(ticket.is_none());
    assert_eq!(c.baselines().region(&key("cpu_idle")), Some(edit.region));
}

#[test]
fn newer_brush_edit_stales_older_rescore() {
    let mut c = loaded();
    let (_, older) = c
        .commit_baseline_brush(&key("cpu_idle"), PixelRect::new(50.0, 0.0, 250.0, 100.0), &chart())
        .unwrap();
    let (_, newer) = c
        .commit_baseline_brush(&key("cpu_idle"), PixelRect::new(100.0, 0.0, 250.0, 100.0), &chart())
        .unwrap();
    c.apply_decomposition(&newer.unwrap(), decomposition(&[("A", "cpu_idle", 5.0)])).unwrap();
    assert!(c.apply_decomposition(&older.unwrap(), decomposition(&[("A", "cpu_idle", 4.0)])).is_err());
    assert_eq!(c.zscores().value(&id("A"), &key("cpu_idle")), Some(5.0));
}

// =============================================================================
// selection and feature answers racing
// =============================================================================

/// A and B scored on `cpu_idle`, then reselected to A and C with `mem_total`
/// enabled: one selection ticket over `cpu_idle`, one feature ticket for
/// `mem_total`, both in flight.
fn reselected_then_enabled() -> (Coordinator, DecompositionTicket, DecompositionTicket) {
    let mut c = loaded();
    let selection = c.select_entities([id("A"), id("C")]).ticket.unwrap();
    let (feature, _) = enabled(c.toggle_feature(key("mem_total")));
    (c, selection, feature.unwrap())
}

fn selection_answer() -> Decomposition {
    Decomposition {
        zscores: zscores(&[("A", "cpu_idle", 1.5), ("C", "cpu_idle", 2.5)]),
        baselines: vec![baseline("cpu_idle", 0, 40, 0.0, 100.0)],
    }
}

fn feature_answer() -> Decomposition {
    Decomposition {
        zscores: zscores(&[("A", "mem_total", 3.0), ("C", "mem_total", -3.0)]),
        baselines: vec![baseline("mem_total", 10, 20, 0.0, 8.0)],
    }
}

fn assert_both_columns_kept(c: &Coordinator) {
    assert_eq!(c.zscores().value(&id("C"), &key("cpu_idle")), Some(2.5));
    assert_eq!(c.zscores().value(&id("A"), &key("mem_total")), Some(3.0));
    assert_eq!(c.zscores().value(&id("B"), &key("cpu_idle")), None);
    assert_eq!(c.baselines().region(&key("cpu_idle")).unwrap().time, TimeRange::new(0, 40));
    assert_eq!(c.baselines().region(&key("mem_total")).unwrap().time, TimeRange::new(10, 20));
}

#[test]
fn late_selection_answer_keeps_newer_feature_baseline() {
    let (mut c, selection, feature) = reselected_then_enabled();
    c.apply_decomposition(&feature, feature_answer()).unwrap();
    c.apply_decomposition(&selection, selection_answer()).unwrap();
    assert_both_columns_kept(&c);
}

#[test]
fn feature_answer_after_selection_answer_adds_its_column() {
    let (mut c, selection, feature) = reselected_then_enabled();
    c.apply_decomposition(&selection, selection_answer()).unwrap();
    c.apply_decomposition(&feature, feature_answer()).unwrap();
    assert_both_columns_kept(&c);
}

#[test]
fn selection_answer_drops_stale_baseline_of_columns_it_covers() {
    let mut c = Coordinator::new(preset(&["A"], &["cpu_idle"]));
    let first = c.load_plan().decomposition.unwrap();
    let response = Decomposition {
        zscores: zscores(&[("A", "cpu_idle", 1.0)]),
        baselines: vec![baseline("cpu_idle", 0, 40, 0.0, 100.0)],
    };
    c.apply_decomposition(&first, response).unwrap();

    let second = c.select_entities([id("B")]).ticket.unwrap();
    c.apply_decomposition(&second, decomposition(&[("B", "cpu_idle", 2.0)])).unwrap();
    assert_eq!(c.baselines().region(&key("cpu_idle")), None);
}

/// A and B scored on both features, reselected to A and C, then a brush
/// edit on `mem_total` while the selection answer is in flight.
fn reselected_then_brushed() -> (Coordinator, DecompositionTicket, BaselineEdit, DecompositionTicket) {
    let mut c = Coordinator::new(preset(&["A", "B"], &["cpu_idle", "mem_total"]));
    let plan = c.load_plan().decomposition.unwrap();
    c.apply_decomposition(&plan, decomposition(&[("A", "cpu_idle", 1.0), ("A", "mem_total", 1.0)]))
        .unwrap();
    let selection = c.select_entities([id("A"), id("C")]).ticket.unwrap();
    let (edit, rescore) = c
        .commit_baseline_brush(&key("mem_total"), PixelRect::new(50.0, 0.0, 250.0, 100.0), &chart())
        .unwrap();
    (c, selection, edit, rescore.unwrap())
}

fn selection_answer_over_both() -> Decomposition {
    Decomposition {
        zscores: zscores(&[("A", "cpu_idle", 1.5), ("A", "mem_total", 9.0), ("C", "mem_total", 9.0)]),
        baselines: vec![baseline("cpu_idle", 0, 40, 0.0, 100.0), baseline("mem_total", 0, 99, 0.0, 1.0)],
    }
}

fn rescore_answer(edit: &BaselineEdit) -> Decomposition {
    Decomposition {
        zscores: zscores(&[("A", "mem_total", -4.0), ("C", "mem_total", 4.0)]),
        baselines: vec![BaselineRecord { feature: key("mem_total"), region: edit.region }],
    }
}

#[test]
fn late_selection_answer_keeps_brush_edit_and_rescore() {
    let (mut c, selection, edit, rescore) = reselected_then_brushed();
    c.apply_decomposition(&rescore, rescore_answer(&edit)).unwrap();
    let applied = c.apply_decomposition(&selection, selection_answer_over_both()).unwrap();

    assert_eq!(applied.columns, 1);
    assert_eq!(c.baselines().region(&key("mem_total")), Some(edit.region));
    assert_eq!(c.baselines().region(&key("cpu_idle")).unwrap().time, TimeRange::new(0, 40));
    assert_eq!(c.zscores().value(&id("A"), &key("mem_total")), Some(-4.0));
    assert_eq!(c.zscores().value(&id("A"), &key("cpu_idle")), Some(1.5));
}

#[test]
fn selection_answer_before_rescore_keeps_brush_edit() {
    let (mut c, selection, edit, rescore) = reselected_then_brushed();
    c.apply_decomposition(&selection, selection_answer_over_both()).unwrap();
    assert_eq!(c.baselines().region(&key("mem_total")), Some(edit.region));

    c.apply_decomposition(&rescore, rescore_answer(&edit)).unwrap();
    assert_eq!(c.baselines().region(&key("mem_total")), Some(edit.region));
    assert_eq!(c.zscores().value(&id("C"), &key("mem_total")), Some(4.0));
    assert_eq!(c.zscores().value(&id("A"), &key("cpu_idle")), Some(1.5));
}

// =============================================================================
// projection and clusters
// =============================================================================

#[test]
fn older_projection_cannot_overwrite_newer_recluster() {
    let mut c = loaded();
    let refresh = c.projection_request();
    let params = ClusterParams { n_neighbors: 10, min_dist: 0.2, num_clusters: 3 };
    let recluster = c.cluster_request(ClusterRequest { params, force: true });
    assert!(recluster.force);

    c.apply_cluster_result(&recluster, cluster_result(&[("A", 2), ("B", 1)])).unwrap();
    assert!(c.apply_projection(&refresh, projection(&[("A", 0), ("B", 0)])).is_err());

    let snap = c.snapshot();
    assert_eq!(snap.params, params);
    assert_eq!(snap.cluster_of(&id("A")), Some(2));
    assert_eq!(snap.projection.len(), 2);
}

#[test]
fn recluster_without_points_relabels_existing_projection() {
    let mut c = loaded();
    let refresh = c.projection_request();
    c.apply_projection(&refresh, projection(&[("A", 0), ("B", 0)])).unwrap();

    let ticket = c.cluster_request(ClusterRequest { params: c.params(), force: false });
    let response = ClusterResult {
        assignments: [(id("A"), 1), (id("B"), 3)].into_iter().collect(),
        points: Vec::new(),
        contributions: FeatureContributions::default(),
    };
    c.apply_cluster_result(&ticket, response).unwrap();

    let snap = c.snapshot();
    let labels: Vec<Option<i64>> = snap.projection.iter().map(|p| p.cluster).collect();
    assert_eq!(labels, vec![Some(1), Some(3)]);
    assert_eq!(snap.projection[1].coordinates(ProjectionMethod::Umap), Some((1.0, 1.0)));
}

// =============================================================================
// telemetry
// =============================================================================

#[test]
fn entity_data_columns_merge_into_loaded_rows() {
    let mut c = loaded();
    let plan = c.load_plan();
    c.apply_entity_data(&plan.entity_data, EntityData { table: telemetry(&[(0, "A", &[("cpu_idle", 90.0)])]) })
        .unwrap();
    let (_, data) = enabled(c.toggle_feature(key("mem_total")));
    let written = c
        .apply_entity_data(&data.unwrap(), EntityData { table: telemetry(&[(0, "A", &[("mem_total", 4.0)])]) })
        .unwrap();
    assert_eq!(written, 1);

    let snap = c.snapshot();
    assert_eq!(snap.telemetry.features(), &[key("cpu_idle"), key("mem_total")]);
    assert!(snap.catalog.is_empty());
    assert_eq!(snap.dataset_features(), vec![key("cpu_idle"), key("mem_total")]);
    assert_eq!(snap.series(&key("mem_total")).points[0].value, 4.0);
}

#[test]
fn mismatched_entity_data_leaves_table_untouched() {
    let mut c = loaded();
    let plan = c.load_plan();
    c.apply_entity_data(&plan.entity_data, EntityData { table: telemetry(&[(0, "A", &[("cpu_idle", 90.0)])]) })
        .unwrap();
    let bad = telemetry(&[(0, "Z", &[("mem_total", 4.0)])]);
    let err = c.apply_entity_data(&plan.entity_data, EntityData { table: bad }).unwrap_err();
    assert!(matches!(err, MergeError::ShapeMismatch { .. }));
    assert_eq!(c.snapshot().telemetry.features(), &[key("cpu_idle")]);
}

// =============================================================================
// dataset switch
// =============================================================================

#[test]
fn switching_dataset_rejects_old_answers_and_resets_state() {
    let mut c = loaded();
    let old = c.select_entities([id("C")]).ticket.unwrap();
    let old_projection = c.projection_request();

    let plan = c.switch_dataset(DatasetPreset {
        selected_features: vec![key("T_CPU0_TEMP")],
        ..DatasetPreset::empty("env_logs.csv")
    });
    assert_eq!(c.dataset(), "env_logs.csv");
    assert!(plan.decomposition.is_none());
    assert!(c.zscores().is_empty());
    assert!(c.selection().state().selected_entities.is_empty());

    let err = c.apply_decomposition(&old, decomposition(&[("C", "cpu_idle", 1.0)])).unwrap_err();
    assert!(matches!(err, MergeError::DatasetMismatch { .. }));
    assert!(c.apply_projection(&old_projection, projection(&[("C", 0)])).is_err());
    assert!(c.zscores().is_empty());
    assert!(c.snapshot().projection.is_empty());
}

#[test]
fn switching_back_to_same_name_still_rejects_old_answers() {
    let mut c = loaded();
    let old = c.select_entities([id("C")]).ticket.unwrap();
    c.switch_dataset(preset(&["C"], &["cpu_idle"]));
    assert!(matches!(
        c.apply_decomposition(&old, decomposition(&[("C", "cpu_idle", 1.0)])),
        Err(MergeError::DatasetMismatch { .. })
    ));
}

// =============================================================================
// snapshots and errors
// =============================================================================

#[test]
fn snapshot_taken_before_merge_is_unchanged() {
    let mut c = loaded();
    let before = c.snapshot();
    let (ticket, _) = enabled(c.toggle_feature(key("mem_total")));
    c.apply_decomposition(&ticket.unwrap(), decomposition(&[("A", "mem_total", 0.5)])).unwrap();

    assert!(!before.zscores.has_column(&key("mem_total")));
    assert_eq!(before.selection.selected_features, vec![key("cpu_idle")]);
    assert!(c.snapshot().zscores.has_column(&key("mem_total")));
}

#[test]
fn failure_is_recorded_until_same_operation_succeeds() {
    let mut c = loaded();
    c.record_failure(Operation::Decomposition, &"backend returned status 500");
    assert_eq!(c.error().as_deref(), Some("decomposition: backend returned status 500"));
    assert_eq!(c.zscores().len(), 2);

    let (ticket, _) = enabled(c.toggle_feature(key("mem_total")));
    c.apply_decomposition(&ticket.unwrap(), decomposition(&[("A", "mem_total", 0.5)])).unwrap();
    assert_eq!(c.error(), None);
}

#[test]
fn success_of_one_operation_keeps_another_operations_failure() {
    let mut c = loaded();
    let refresh = c.projection_request();
    c.record_failure(Operation::Projection, &"backend returned status 500");

    let (ticket, _) = enabled(c.toggle_feature(key("mem_total")));
    c.apply_decomposition(&ticket.unwrap(), decomposition(&[("A", "mem_total", 0.5)])).unwrap();
    assert_eq!(c.failure(Operation::Projection), Some("projection: backend returned status 500"));
    assert_eq!(c.snapshot().error.as_deref(), Some("projection: backend returned status 500"));

    c.record_failure(Operation::EntityData, &"shape mismatch");
    assert_eq!(
        c.error().as_deref(),
        Some("entity data: shape mismatch; projection: backend returned status 500")
    );

    c.apply_projection(&refresh, projection(&[("A", 0), ("B", 1)])).unwrap();
    assert_eq!(c.failure(Operation::Projection), None);
    assert_eq!(c.error().as_deref(), Some("entity data: shape mismatch"));

    c.clear_error();
    assert_eq!(c.error(), None);
}

#[test]
fn dataset_switch_clears_failures() {
    let mut c = loaded();
    c.record_failure(Operation::Clusters, &"connection reset");
    c.switch_dataset(DatasetPreset::empty("env_logs.csv"));
    assert_eq!(c.error(), None);
}
