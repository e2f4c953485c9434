use super::*;

fn marks() -> Vec<Mark<&'static str>> {
    vec![Mark::new("a", 1.0, 1.0), Mark::new("b", 5.0, 5.0), Mark::new("c", 10.0, 10.0)]
}

fn drag_square(g: &mut LassoGesture, lo: f64, hi: f64) {
    g.begin(Point::new(lo, lo));
    g.extend(Point::new(hi, lo));
    g.extend(Point::new(hi, hi));
    g.extend(Point::new(lo, hi));
}

// =============================================================
// Containment
// =============================================================

#[test]
fn square_drag_selects_enclosed_marks_only() {
    let mut g = LassoGesture::new();
    drag_square(&mut g, 0.0, 8.0);
    let marks = marks();
    let sel = g.finish(&marks).unwrap();
    let ids: Vec<_> = sel.ids.iter().copied().collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn drag_around_nothing_yields_empty_selection() {
    let mut g = LassoGesture::new();
    drag_square(&mut g, 20.0, 30.0);
    let marks = marks();
    let sel = g.finish(&marks).unwrap();
    assert!(sel.is_empty());
    assert_eq!(sel.len(), 0);
}

#[test]
fn duplicate_ids_are_deduplicated() {
    let mut g = LassoGesture::new();
    drag_square(&mut g, 0.0, 8.0);
    let marks = vec![Mark::new("a", 1.0, 1.0), Mark::new("a", 2.0, 2.0)];
    let sel = g.finish(&marks).unwrap();
    assert_eq!(sel.len(), 1);
}

#[test]
fn click_without_drag_selects_nothing() {
    let mut g = LassoGesture::new();
    g.begin(Point::new(5.0, 5.0));
    let marks = marks();
    let sel = g.finish(&marks).unwrap();
    assert!(sel.is_empty());
}

// =============================================================
// State machine
// =============================================================

#[test]
fn finish_without_begin_returns_none() {
    let mut g = LassoGesture::new();
    let marks = marks();
    assert!(g.finish(&marks).is_none());
}

#[test]
fn finish_resets_to_idle() {
    let mut g = LassoGesture::new();
    drag_square(&mut g, 0.0, 8.0);
    let marks = marks();
    assert!(g.finish(&marks).is_some());
    assert!(!g.is_active());
    assert!(g.preview().is_empty());
    assert!(g.finish(&marks).is_none());
}

#[test]
fn extend_grows_preview_in_order() {
    let mut g = LassoGesture::new();
    g.begin(Point::new(0.0, 0.0));
    let preview = g.extend(Point::new(1.0, 2.0));
    assert_eq!(preview, &[Point::new(0.0, 0.0), Point::new(1.0, 2.0)]);
    assert_eq!(g.preview().len(), 2);
}

#[test]
fn extend_while_idle_is_ignored() {
    let mut g = LassoGesture::new();
    assert!(g.extend(Point::new(1.0, 1.0)).is_empty());
    assert!(!g.is_active());
}

#[test]
fn begin_discards_unfinished_path() {
    let mut g = LassoGesture::new();
    drag_square(&mut g, 0.0, 8.0);
    g.begin(Point::new(50.0, 50.0));
    assert_eq!(g.preview(), &[Point::new(50.0, 50.0)]);
}

#[test]
fn cancel_produces_no_selection() {
    let mut g = LassoGesture::new();
    drag_square(&mut g, 0.0, 8.0);
    g.cancel();
    let marks = marks();
    assert!(g.finish(&marks).is_none());
}

// =============================================================
// select_enclosed
// =============================================================

#[test]
fn select_enclosed_scales_to_thousands_of_marks() {
    let marks: Vec<Mark<usize>> = (0..4000)
        .map(|i| Mark::new(i, (i % 100) as f64, (i / 100) as f64))
        .collect();
    let path = vec![
        Point::new(-0.5, -0.5),
        Point::new(9.5, -0.5),
        Point::new(9.5, 9.5),
        Point::new(-0.5, 9.5),
    ];
    let sel = select_enclosed(path, &marks);
    assert_eq!(sel.len(), 100);
}
