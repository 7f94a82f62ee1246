use labsync_ranges::{
    dedup_sorted, plan_sync, prepare, AgeUnit, ExistingState, NormalizeOptions, PlanOptions,
    RangeContent, RangeValue, RowKind, Sex, StoredRange, SyncPlan, SyncRequest,
    NO_REFERENCE_NOTE,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

const PARAMETER: i64 = 1;

fn request(body: serde_json::Value) -> SyncRequest {
    serde_json::from_value(body).unwrap()
}

fn plan(stored: &[StoredRange], body: serde_json::Value) -> SyncPlan {
    let prepared = prepare(&request(body), &NormalizeOptions::default()).unwrap();
    plan_sync(
        &prepared,
        &ExistingState::from_rows(stored.to_vec()),
        &PlanOptions::default(),
    )
}

/// Apply a plan the way the persistence layer does: deletes, updates, inserts.
fn apply(stored: &[StoredRange], plan: &SyncPlan) -> Vec<StoredRange> {
    let mut next_id = stored.iter().map(|r| r.id).max().unwrap_or(0) + 1;
    let mut rows: Vec<StoredRange> = stored
        .iter()
        .filter(|r| !plan.deletes.contains(&r.id))
        .cloned()
        .collect();
    for update in &plan.updates {
        let row = rows.iter_mut().find(|r| r.id == update.id).unwrap();
        row.content = update.content.clone();
    }
    for content in &plan.inserts {
        rows.push(StoredRange {
            id: next_id,
            parameter_id: PARAMETER,
            content: content.clone(),
        });
        next_id += 1;
    }
    rows
}

fn sync(stored: &[StoredRange], body: serde_json::Value) -> Vec<StoredRange> {
    apply(stored, &plan(stored, body))
}

fn spans(rows: &[StoredRange], sex: Sex) -> Vec<(Option<i64>, Option<i64>, RowKind)> {
    let mut out: Vec<_> = rows
        .iter()
        .filter(|r| r.content.sex == sex)
        .map(|r| {
            (
                r.content.age_min.and_then(|v| v.to_i64()),
                r.content.age_max.and_then(|v| v.to_i64()),
                r.kind(),
            )
        })
        .collect();
    out.sort_by_key(|(min, max, _)| (*min, *max));
    out
}

fn numeric(sex: Sex, min: i64, max: i64) -> RangeContent {
    RangeContent {
        sex,
        age_min: Some(Decimal::from(min)),
        age_max: Some(Decimal::from(max)),
        age_unit: AgeUnit::Years,
        value: RangeValue::Numeric {
            lower: Some(Decimal::from(3)),
            upper: Some(Decimal::from(9)),
        },
        notes: None,
        unit: Some("mg/dL".into()),
        method: None,
    }
}

fn stored(id: i64, content: RangeContent) -> StoredRange {
    StoredRange {
        id,
        parameter_id: PARAMETER,
        content,
    }
}

#[test]
fn resubmitting_the_same_list_is_a_noop() {
    let body = json!({"ranges": [
        {"sex": "Masculino", "ageMin": 0, "ageMax": 10, "lower": 1, "upper": 4},
        {"sex": "Masculino", "ageMin": 20, "ageMax": 30, "lower": 2, "upper": 5}
    ]});
    let first = sync(&[], body.clone());
    let second = plan(&first, body);
    assert!(second.is_noop(), "{second:?}");
}

#[test]
fn resubmitting_a_fetched_list_with_placeholders_is_a_noop() {
    let first = sync(
        &[],
        json!({"ranges": [{"sex": "Ambos", "ageMin": 0, "ageMax": 17, "textValue": "Negativo"}]}),
    );
    assert_eq!(first.len(), 2);

    // A client that fetched the list sends every row back, placeholders included.
    let echoed: Vec<_> = dedup_sorted(first.clone())
        .into_iter()
        .map(|r| serde_json::to_value(&r).unwrap())
        .collect();
    let again = plan(&first, json!({ "ranges": echoed }));
    assert!(again.is_noop(), "{again:?}");
}

#[test]
fn omission_leaves_rows_untouched() {
    let existing = vec![stored(1, numeric(Sex::Ambos, 0, 120))];
    for body in [json!({}), json!({"ranges": null}), json!({"ranges": []})] {
        let p = plan(&existing, body);
        assert!(p.is_noop());
        assert_eq!(apply(&existing, &p), existing);
    }
}

#[test]
fn explicit_clear_removes_everything() {
    let existing = vec![
        stored(1, numeric(Sex::Masculino, 0, 120)),
        stored(2, numeric(Sex::Femenino, 0, 120)),
    ];
    let after = sync(&existing, json!({"ranges": [], "clearRanges": true}));
    assert!(after.is_empty());
}

#[test]
fn adjacency_passes_and_overlap_fails() {
    let adjacent = request(json!({"ranges": [
        {"sex": "F", "ageMin": 0, "ageMax": 1, "lower": 1},
        {"sex": "F", "ageMin": 1, "ageMax": 2, "lower": 1}
    ]}));
    assert!(prepare(&adjacent, &NormalizeOptions::default()).is_ok());

    let overlapping = request(json!({"ranges": [
        {"sex": "F", "ageMin": 0, "ageMax": 10, "lower": 1},
        {"sex": "F", "ageMin": 9, "ageMax": 15, "lower": 1}
    ]}));
    let err = prepare(&overlapping, &NormalizeOptions::default()).unwrap_err();
    assert_eq!(err.code(), "REFERENCE_RANGE_OVERLAP");
}

#[test]
fn two_real_rows_yield_two_placeholders() {
    let rows = sync(
        &[],
        json!({"ranges": [
            {"sex": "Masculino", "ageMin": 0, "ageMax": 10, "lower": 1, "upper": 4},
            {"sex": "Masculino", "ageMin": 20, "ageMax": 30, "lower": 2, "upper": 5}
        ]}),
    );
    assert_eq!(rows.len(), 4);
    assert_eq!(
        spans(&rows, Sex::Masculino),
        vec![
            (Some(0), Some(10), RowKind::Real),
            (Some(11), Some(20), RowKind::Placeholder),
            (Some(20), Some(30), RowKind::Real),
            (Some(31), Some(120), RowKind::Placeholder),
        ]
    );
}

#[test]
fn real_row_absorbs_covered_placeholder() {
    let existing = vec![stored(
        5,
        RangeContent::placeholder(
            Sex::Femenino,
            labsync_ranges::age::AgeInterval::new(
                Some(Decimal::ZERO),
                Some(Decimal::ONE),
                AgeUnit::Years,
            ),
        ),
    )];
    let p = plan(
        &existing,
        json!({"ranges": [{"sex": "Femenino", "ageMin": 0, "ageMax": 17, "lower": 4, "upper": 8}]}),
    );
    assert_eq!(p.deletes, vec![5]);
    assert_eq!(p.summary.placeholders_absorbed, 1);
    assert_eq!(p.summary.placeholders_inserted, 1);

    let rows = apply(&existing, &p);
    assert_eq!(
        spans(&rows, Sex::Femenino),
        vec![
            (Some(0), Some(17), RowKind::Real),
            (Some(18), Some(120), RowKind::Placeholder),
        ]
    );
}

#[test]
fn mixed_groups_need_no_placeholders() {
    let rows = sync(
        &[],
        json!({"ranges": [
            {"sex": "Ambos", "ageMin": 0, "ageMax": 17, "lower": 1, "upper": 2},
            {"sex": "Masculino", "ageMin": 18, "ageMax": 120, "lower": 3, "upper": 4},
            {"sex": "Femenino", "ageMin": 18, "ageMax": 120, "lower": 2, "upper": 3}
        ]}),
    );
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.kind() == RowKind::Real));
}

#[test]
fn placeholder_only_payload_becomes_one_fallback_row() {
    let rows = sync(
        &[],
        json!({"ranges": [
            {"sex": "Ambos", "ageMin": 0, "ageMax": 17},
            {"sex": "Ambos", "ageMin": 18, "ageMax": 120}
        ]}),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content.notes.as_deref(), Some(NO_REFERENCE_NOTE));
    assert_eq!(rows[0].content.age_min, None);
    assert_eq!(rows[0].content.age_max, None);
}

#[test]
fn stored_duplicates_list_once_and_are_cleaned_on_sync() {
    let existing = vec![
        stored(1, numeric(Sex::Ambos, 0, 120)),
        stored(2, numeric(Sex::Ambos, 0, 120)),
    ];
    assert_eq!(dedup_sorted(existing.clone()).len(), 1);

    let p = plan(
        &existing,
        json!({"ranges": [
            {"sex": "Ambos", "ageMin": 0, "ageMax": 120, "lower": 3, "upper": 9, "unit": "mg/dL"}
        ]}),
    );
    assert_eq!(p.deletes, vec![2]);
    assert_eq!(p.summary.duplicates_removed, 1);
    assert!(p.inserts.is_empty() && p.updates.is_empty());
}

#[test]
fn untouched_groups_survive_partial_payloads() {
    let existing = vec![
        stored(1, numeric(Sex::Masculino, 0, 120)),
        stored(2, numeric(Sex::Femenino, 0, 120)),
    ];
    let rows = sync(
        &existing,
        json!({"ranges": [{"sex": "F", "ageMin": 0, "ageMax": 120, "lower": 5, "upper": 6}]}),
    );
    assert_eq!(rows.len(), 2);
    let male = rows.iter().find(|r| r.content.sex == Sex::Masculino).unwrap();
    assert_eq!(male, &existing[0]);
    let female = rows.iter().find(|r| r.content.sex == Sex::Femenino).unwrap();
    assert_eq!(female.id, 2);
    assert_eq!(female.content.value.lower(), Some(Decimal::from(5)));
}

#[test]
fn changed_value_updates_in_place_by_id() {
    let existing = vec![stored(8, numeric(Sex::Ambos, 0, 120))];
    let p = plan(
        &existing,
        json!({"ranges": [{"id": 8, "sex": "Ambos", "ageMin": 0, "ageMax": 99, "lower": 1}]}),
    );
    assert!(p.deletes.is_empty());
    assert_eq!(p.updates.len(), 1);
    assert_eq!(p.updates[0].id, 8);
    assert_eq!(p.summary.placeholders_inserted, 1);
}

#[test]
fn clear_flag_with_entries_replaces_all_groups() {
    let existing = vec![
        stored(1, numeric(Sex::Masculino, 0, 120)),
        stored(2, numeric(Sex::Femenino, 0, 120)),
    ];
    let rows = sync(
        &existing,
        json!({"ranges": [{"sex": "Ambos", "lower": 1, "upper": 2}], "clearRanges": true}),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content.sex, Sex::Ambos);
    assert!(rows[0].content.is_whole_life());
}

#[test]
fn split_calls_match_a_single_mixed_call() {
    let ambos = json!({"ranges": [{"sex": "Ambos", "ageMin": 0, "ageMax": 17, "lower": 1, "upper": 2}]});
    let male = json!({"ranges": [{"sex": "Masculino", "ageMin": 18, "ageMax": 120, "lower": 3, "upper": 4}]});
    let female = json!({"ranges": [{"sex": "Femenino", "ageMin": 18, "ageMax": 120, "lower": 2, "upper": 3}]});

    let after_ambos = sync(&[], ambos.clone());
    assert_eq!(
        spans(&after_ambos, Sex::Ambos),
        vec![
            (Some(0), Some(17), RowKind::Real),
            (Some(18), Some(120), RowKind::Placeholder),
        ]
    );

    // Masculino alone does not yet cover adult Ambos.
    let after_male = sync(&after_ambos, male);
    assert_eq!(spans(&after_male, Sex::Ambos).len(), 2);

    let after_female = sync(&after_male, female);
    assert_eq!(after_female.len(), 3);
    assert!(after_female.iter().all(|r| r.kind() == RowKind::Real));
    assert_eq!(
        spans(&after_female, Sex::Ambos),
        vec![(Some(0), Some(17), RowKind::Real)]
    );

    // Sending Ambos again changes nothing.
    assert!(plan(&after_female, ambos).is_noop());
}

#[test]
fn dropping_a_specific_sex_restores_the_ambos_placeholder() {
    let rows = sync(
        &[],
        json!({"ranges": [
            {"sex": "Ambos", "ageMin": 0, "ageMax": 17, "lower": 1, "upper": 2},
            {"sex": "Masculino", "ageMin": 18, "ageMax": 120, "lower": 3, "upper": 4},
            {"sex": "Femenino", "ageMin": 18, "ageMax": 120, "lower": 2, "upper": 3}
        ]}),
    );
    let ambos_id = rows
        .iter()
        .find(|r| r.content.sex == Sex::Ambos)
        .map(|r| r.id)
        .unwrap();

    // Replace the Femenino group with a pediatric-only row.
    let after = sync(
        &rows,
        json!({"ranges": [{"sex": "Femenino", "ageMin": 0, "ageMax": 17, "lower": 2, "upper": 3}]}),
    );
    assert_eq!(
        spans(&after, Sex::Ambos),
        vec![
            (Some(0), Some(17), RowKind::Real),
            (Some(18), Some(120), RowKind::Placeholder),
        ]
    );
    let ambos_real = after
        .iter()
        .find(|r| r.content.sex == Sex::Ambos && r.kind() == RowKind::Real)
        .unwrap();
    assert_eq!(ambos_real.id, ambos_id);
    assert_eq!(
        spans(&after, Sex::Masculino),
        vec![(Some(18), Some(120), RowKind::Real)]
    );
}

#[test]
fn moving_a_row_to_another_sex_by_id_clears_its_old_placeholders() {
    let rows = sync(
        &[],
        json!({"ranges": [{"sex": "Masculino", "ageMin": 0, "ageMax": 17, "lower": 1, "upper": 2}]}),
    );
    let id = rows
        .iter()
        .find(|r| r.kind() == RowKind::Real)
        .map(|r| r.id)
        .unwrap();

    let after = sync(
        &rows,
        json!({"ranges": [
            {"id": id, "sex": "Femenino", "ageMin": 0, "ageMax": 17, "lower": 1, "upper": 2}
        ]}),
    );
    assert!(spans(&after, Sex::Masculino).is_empty(), "{after:?}");
    assert_eq!(
        spans(&after, Sex::Femenino),
        vec![
            (Some(0), Some(17), RowKind::Real),
            (Some(18), Some(120), RowKind::Placeholder),
        ]
    );
    assert!(after.iter().any(|r| r.id == id && r.content.sex == Sex::Femenino));
}

#[test]
fn moving_a_row_by_id_keeps_other_rows_of_its_old_sex() {
    let rows = sync(
        &[],
        json!({"ranges": [
            {"sex": "Masculino", "ageMin": 0, "ageMax": 17, "lower": 1, "upper": 2},
            {"sex": "Masculino", "ageMin": 30, "ageMax": 120, "lower": 3, "upper": 4}
        ]}),
    );
    let pediatric = rows
        .iter()
        .find(|r| r.kind() == RowKind::Real && r.content.age_min == Some(Decimal::ZERO))
        .map(|r| r.id)
        .unwrap();

    let after = sync(
        &rows,
        json!({"ranges": [
            {"id": pediatric, "sex": "Femenino", "ageMin": 0, "ageMax": 120, "lower": 1, "upper": 2}
        ]}),
    );
    assert_eq!(
        spans(&after, Sex::Masculino),
        vec![
            (Some(0), Some(30), RowKind::Placeholder),
            (Some(30), Some(120), RowKind::Real),
        ]
    );
}

#[test]
fn oversized_age_bound_is_rejected() {
    let err = prepare(
        &request(json!({"ranges": [
            {"sex": "Ambos", "ageMin": 0, "ageMax": "79228162514264337593543950335", "lower": 1}
        ]})),
        &NormalizeOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_AGE_RANGE");
    assert_eq!(err.descriptor_index(), 0);
}
