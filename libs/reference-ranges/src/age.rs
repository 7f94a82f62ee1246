//! Age intervals on a common year scale, and coverage sets used by gap filling.
//!
//! Intervals written in different units (`days`, `weeks`, `months`, `years`) are
//! compared after conversion to years. Null bounds are open: a missing minimum
//! starts at birth, a missing maximum never ends.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

use crate::model::AgeUnit;

/// Largest age, in years, a stored bound may carry.
pub const MAX_AGE_BOUND_YEARS: u32 = 150;

/// An age expressed in the unit it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgePoint {
    pub value: Decimal,
    pub unit: AgeUnit,
}

impl AgePoint {
    pub fn new(value: Decimal, unit: AgeUnit) -> Self {
        Self { value, unit }
    }

    pub fn zero(unit: AgeUnit) -> Self {
        Self::new(Decimal::ZERO, unit)
    }

    pub fn years(&self) -> Decimal {
        self.unit.to_years(self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeInterval {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub unit: AgeUnit,
}

impl AgeInterval {
    pub fn new(min: Option<Decimal>, max: Option<Decimal>, unit: AgeUnit) -> Self {
        Self { min, max, unit }
    }

    pub fn is_whole_life(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn start_years(&self) -> Decimal {
        self.min
            .map(|v| self.unit.to_years(v))
            .unwrap_or(Decimal::ZERO)
    }

    /// `None` when the interval is open-ended.
    pub fn end_years(&self) -> Option<Decimal> {
        self.max.map(|v| self.unit.to_years(v))
    }

    /// Strict overlap: a shared endpoint is adjacency, not overlap.
    pub fn overlaps(&self, other: &AgeInterval) -> bool {
        let starts_before_other_ends = other
            .end_years()
            .map_or(true, |end| self.start_years() < end);
        let other_starts_before_end = self
            .end_years()
            .map_or(true, |end| other.start_years() < end);
        starts_before_other_ends && other_starts_before_end
    }

    /// Ordering by (start, end) with open ends last.
    pub fn cmp_span(&self, other: &AgeInterval) -> Ordering {
        self.start_years()
            .cmp(&other.start_years())
            .then_with(|| cmp_end(self.end_years(), other.end_years()))
    }

    /// Ages are whole-unit counts, so `[a, b]` covers every age up to but
    /// excluding `floor(b) + 1`.
    pub fn coverage(&self) -> Segment {
        Segment {
            start: AgePoint::new(self.min.unwrap_or(Decimal::ZERO), self.unit),
            end: self
                .max
                .and_then(|max| max.floor().checked_add(Decimal::ONE))
                .map(|end| AgePoint::new(end, self.unit)),
        }
    }
}

impl fmt::Display for AgeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = self
            .min
            .map(|v| v.normalize().to_string())
            .unwrap_or_else(|| "*".to_string());
        let max = self
            .max
            .map(|v| v.normalize().to_string())
            .unwrap_or_else(|| "*".to_string());
        write!(f, "[{min}, {max}] {}", self.unit)
    }
}

/// Compare two optional ends where `None` is +infinity.
pub(crate) fn cmp_end(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Half-open span `[start, end)`; `end == None` never ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: AgePoint,
    pub end: Option<AgePoint>,
}

impl Segment {
    fn end_years(&self) -> Option<Decimal> {
        self.end.map(|p| p.years())
    }
}

/// Sorted, disjoint, non-touching set of covered spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    segments: Vec<Segment>,
}

impl Coverage {
    pub fn from_intervals<'a, I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = &'a AgeInterval>,
    {
        Self::merge(intervals.into_iter().map(AgeInterval::coverage).collect())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn union(&self, other: &Coverage) -> Coverage {
        let mut all = self.segments.clone();
        all.extend_from_slice(&other.segments);
        Self::merge(all)
    }

    pub fn intersect(&self, other: &Coverage) -> Coverage {
        let (a, b) = (&self.segments, &other.segments);
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();

        while i < a.len() && j < b.len() {
            let start = if a[i].start.years() >= b[j].start.years() {
                a[i].start
            } else {
                b[j].start
            };
            let a_ends_first = cmp_end(a[i].end_years(), b[j].end_years()) != Ordering::Greater;
            let end = if a_ends_first { a[i].end } else { b[j].end };

            if end.map_or(true, |e| start.years() < e.years()) {
                out.push(Segment { start, end });
            }

            if a_ends_first {
                i += 1;
            } else {
                j += 1;
            }
        }

        Self::merge(out)
    }

    /// Uncovered spans within `[0, limit)`.
    pub fn gaps(&self, limit: AgePoint) -> Vec<Segment> {
        let limit_years = limit.years();
        let mut gaps = Vec::new();
        let mut cursor: Option<AgePoint> = None;
        let mut cursor_years = Decimal::ZERO;

        for segment in &self.segments {
            if cursor_years >= limit_years {
                return gaps;
            }

            let start_years = segment.start.years();
            if start_years > cursor_years {
                let end = if start_years < limit_years {
                    segment.start
                } else {
                    limit
                };
                gaps.push(Segment {
                    start: cursor.unwrap_or_else(|| AgePoint::zero(end.unit)),
                    end: Some(end),
                });
            }

            match segment.end {
                None => return gaps,
                Some(end) if end.years() > cursor_years => {
                    cursor_years = end.years();
                    cursor = Some(end);
                }
                Some(_) => {}
            }
        }

        if cursor_years < limit_years {
            gaps.push(Segment {
                start: cursor.unwrap_or_else(|| AgePoint::zero(limit.unit)),
                end: Some(limit),
            });
        }

        gaps
    }

    fn merge(mut segments: Vec<Segment>) -> Coverage {
        segments.sort_by(|a, b| a.start.years().cmp(&b.start.years()));

        let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if let Some(last) = merged.last_mut() {
                let touches = last
                    .end
                    .map_or(true, |end| segment.start.years() <= end.years());
                if touches {
                    if cmp_end(segment.end_years(), last.end_years()) == Ordering::Greater {
                        last.end = segment.end;
                    }
                    continue;
                }
            }
            merged.push(segment);
        }

        Coverage { segments: merged }
    }
}
