//! Interval validation of a submitted range set.

use std::collections::BTreeMap;

use crate::age::{cmp_end, AgeInterval};
use crate::error::{RangeError, Result};
use crate::model::Sex;
use crate::normalize::{DescriptorRole, NormalizedDescriptor};

/// Reject any pair of real descriptors of the same sex whose age intervals
/// overlap. Touching intervals are adjacency and pass; a whole-life interval
/// overlaps every other interval of its group.
pub fn validate_intervals(descriptors: &[NormalizedDescriptor]) -> Result<()> {
    let mut groups: BTreeMap<Sex, Vec<(usize, AgeInterval)>> = BTreeMap::new();
    for descriptor in descriptors
        .iter()
        .filter(|d| d.role == DescriptorRole::Real)
    {
        groups
            .entry(descriptor.content.sex)
            .or_default()
            .push((descriptor.index, descriptor.content.interval()));
    }

    for (sex, mut intervals) in groups {
        intervals.sort_by(|(ia, a), (ib, b)| a.cmp_span(b).then(ia.cmp(ib)));

        // Track the interval reaching furthest so far; any later interval
        // starting before it ends collides with it.
        let mut furthest: Option<(usize, AgeInterval)> = None;
        for (index, interval) in intervals {
            if let Some((prev_index, prev)) = furthest {
                let collides = prev
                    .end_years()
                    .map_or(true, |end| end > interval.start_years());
                if collides {
                    return Err(RangeError::Overlap {
                        sex,
                        first_index: prev_index,
                        first: prev.to_string(),
                        second_index: index,
                        second: interval.to_string(),
                    });
                }
                if cmp_end(interval.end_years(), prev.end_years()).is_gt() {
                    furthest = Some((index, interval));
                }
            } else {
                furthest = Some((index, interval));
            }
        }
    }

    Ok(())
}
