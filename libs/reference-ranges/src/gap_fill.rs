//! Placeholder generation for age spans left uncovered by real data.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

use crate::age::{AgeInterval, AgePoint, Coverage, Segment};
use crate::model::{AgeUnit, RangeContent, Sex};

/// Real-data intervals of one parameter, grouped by sex.
pub type RealIntervals = BTreeMap<Sex, Vec<AgeInterval>>;

/// Coverage that counts for a sex group when looking for gaps.
///
/// A specific sex is also covered by the `Ambos` rows; `Ambos` is also
/// covered wherever both specific sexes are.
pub fn effective_coverage(sex: Sex, real: &RealIntervals) -> Coverage {
    let own = |s: Sex| Coverage::from_intervals(real.get(&s).into_iter().flatten());
    match sex {
        Sex::Ambos => own(Sex::Ambos).union(&own(Sex::Masculino).intersect(&own(Sex::Femenino))),
        specific => own(specific).union(&own(Sex::Ambos)),
    }
}

/// Placeholder rows for every uncovered span of `sex` within `[0, max_age_years)`.
///
/// Groups without real data get nothing, and neither do groups holding a
/// whole-life row.
pub fn placeholders_for(sex: Sex, real: &RealIntervals, max_age_years: Decimal) -> Vec<RangeContent> {
    let own = real.get(&sex).map(Vec::as_slice).unwrap_or_default();
    if own.is_empty() || own.iter().any(AgeInterval::is_whole_life) {
        return Vec::new();
    }

    let limit = AgePoint::new(max_age_years, AgeUnit::Years);
    effective_coverage(sex, real)
        .gaps(limit)
        .iter()
        .filter_map(placeholder_span)
        .map(|span| RangeContent::placeholder(sex, span))
        .collect()
}

/// The placeholder touches the next covered span, so its `age_max` equals the
/// following row's `age_min`.
fn placeholder_span(gap: &Segment) -> Option<AgeInterval> {
    let lower = gap.start;
    let upper = gap.end?;
    let unit = if lower.value.is_zero() {
        upper.unit
    } else {
        lower.unit
    };

    // Converted bounds are rounded inward so the placeholder never reaches
    // into covered ages.
    let min = express_in(lower, unit, RoundingStrategy::AwayFromZero);
    let max = express_in(upper, unit, RoundingStrategy::ToZero);
    (min < max).then(|| AgeInterval::new(Some(min), Some(max), unit))
}

fn express_in(point: AgePoint, unit: AgeUnit, strategy: RoundingStrategy) -> Decimal {
    if point.unit == unit || point.value.is_zero() {
        return point.value.normalize();
    }
    unit.from_years(point.years())
        .round_dp_with_strategy(4, strategy)
        .normalize()
}
