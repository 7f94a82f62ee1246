//! Read-only consistency audit over stored ranges.
//!
//! Reports data the write path would no longer produce: duplicates, overlaps
//! inside a sex group, uncovered age spans, and identical `Masculino`/`Femenino`
//! pairs sitting next to an `Ambos` row for the same span.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::age::{AgePoint, AgeInterval, Coverage};
use crate::dedup::partition_duplicates;
use crate::gap_fill::{effective_coverage, RealIntervals};
use crate::model::{AgeUnit, ParameterId, RangeContent, RangeId, RowKind, Sex, StoredRange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditFinding {
    #[serde(rename_all = "camelCase")]
    Duplicate {
        parameter_id: ParameterId,
        id: RangeId,
        duplicate_of: RangeId,
    },
    #[serde(rename_all = "camelCase")]
    Overlap {
        parameter_id: ParameterId,
        sex: Sex,
        first_id: RangeId,
        second_id: RangeId,
    },
    #[serde(rename_all = "camelCase")]
    CoverageGap {
        parameter_id: ParameterId,
        sex: Sex,
        span: String,
    },
    #[serde(rename_all = "camelCase")]
    RedundantSexSplit {
        parameter_id: ParameterId,
        ambos_id: RangeId,
        masculino_id: RangeId,
        femenino_id: RangeId,
    },
}

impl AuditFinding {
    pub fn parameter_id(&self) -> ParameterId {
        match self {
            AuditFinding::Duplicate { parameter_id, .. }
            | AuditFinding::Overlap { parameter_id, .. }
            | AuditFinding::CoverageGap { parameter_id, .. }
            | AuditFinding::RedundantSexSplit { parameter_id, .. } => *parameter_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub parameters_scanned: usize,
    pub rows_scanned: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Audit rows of any number of parameters.
pub fn audit(rows: Vec<StoredRange>, max_age_years: Decimal) -> AuditReport {
    let mut report = AuditReport {
        rows_scanned: rows.len(),
        ..AuditReport::default()
    };

    let split = partition_duplicates(rows);
    for (row, duplicate_of) in split.duplicates {
        report.findings.push(AuditFinding::Duplicate {
            parameter_id: row.parameter_id,
            id: row.id,
            duplicate_of,
        });
    }

    let mut by_parameter: BTreeMap<ParameterId, Vec<StoredRange>> = BTreeMap::new();
    for row in split.kept {
        by_parameter.entry(row.parameter_id).or_default().push(row);
    }

    report.parameters_scanned = by_parameter.len();
    for (parameter_id, rows) in by_parameter {
        audit_parameter(parameter_id, &rows, max_age_years, &mut report.findings);
    }
    report
}

fn audit_parameter(
    parameter_id: ParameterId,
    rows: &[StoredRange],
    max_age_years: Decimal,
    findings: &mut Vec<AuditFinding>,
) {
    let mut real: BTreeMap<Sex, Vec<&StoredRange>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.kind() == RowKind::Real) {
        real.entry(row.content.sex).or_default().push(row);
    }

    for (&sex, group) in &real {
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                if a.content.interval().overlaps(&b.content.interval()) {
                    findings.push(AuditFinding::Overlap {
                        parameter_id,
                        sex,
                        first_id: a.id.min(b.id),
                        second_id: a.id.max(b.id),
                    });
                }
            }
        }
    }

    // Placeholders count as coverage here: a gap they mark is a known gap.
    let intervals: RealIntervals = real
        .iter()
        .map(|(&sex, group)| (sex, group.iter().map(|r| r.content.interval()).collect()))
        .collect();
    let limit = AgePoint::new(max_age_years, AgeUnit::Years);
    for (&sex, group) in &real {
        if group.iter().any(|r| r.content.is_whole_life()) {
            continue;
        }
        let placeholders: Vec<AgeInterval> = rows
            .iter()
            .filter(|r| r.content.sex == sex && r.kind() == RowKind::Placeholder)
            .map(|r| r.content.interval())
            .collect();
        let coverage = effective_coverage(sex, &intervals).union(&Coverage::from_intervals(&placeholders));
        for gap in coverage.gaps(limit) {
            findings.push(AuditFinding::CoverageGap {
                parameter_id,
                sex,
                span: describe_gap(gap.start, gap.end),
            });
        }
    }

    let group = |sex: Sex| real.get(&sex).map(Vec::as_slice).unwrap_or_default();
    for male in group(Sex::Masculino) {
        let Some(female) = group(Sex::Femenino)
            .iter()
            .find(|female| same_except_sex(&male.content, &female.content))
        else {
            continue;
        };
        let span = male.content.slot_key();
        let ambos = group(Sex::Ambos).iter().find(|ambos| {
            let slot = ambos.content.slot_key();
            (slot.age_min, slot.age_max) == (span.age_min, span.age_max)
        });
        if let Some(ambos) = ambos {
            findings.push(AuditFinding::RedundantSexSplit {
                parameter_id,
                ambos_id: ambos.id,
                masculino_id: male.id,
                femenino_id: female.id,
            });
        }
    }
}

fn same_except_sex(a: &RangeContent, b: &RangeContent) -> bool {
    let mut a = a.dedup_key();
    a.sex = Sex::Ambos;
    let mut b = b.dedup_key();
    b.sex = Sex::Ambos;
    a == b
}

fn describe_gap(start: AgePoint, end: Option<AgePoint>) -> String {
    match end {
        Some(end) if end.unit == start.unit => {
            format!("[{}, {}) {}", start.value.normalize(), end.value.normalize(), start.unit)
        }
        Some(end) => format!(
            "[{} {}, {} {})",
            start.value.normalize(),
            start.unit,
            end.value.normalize(),
            end.unit
        ),
        None => format!("[{}, *) {}", start.value.normalize(), start.unit),
    }
}
