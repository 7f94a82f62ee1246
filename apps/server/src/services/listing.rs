//! Read path: deduplicated range listings

use labsync_ranges::{dedup_sorted, ParameterId, StoredRange};
use std::collections::BTreeMap;

use crate::{
    db::RangeStore,
    models::ParameterWithRanges,
    Error, Result,
};

pub struct RangeListingService<S: RangeStore> {
    store: S,
}

impl<S: RangeStore> RangeListingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Ranges of one parameter with stored duplicates collapsed, age-sorted.
    pub async fn list(&self, parameter_id: ParameterId) -> Result<Vec<StoredRange>> {
        if self.store.get_parameter(parameter_id).await?.is_none() {
            return Err(Error::ParameterNotFound(parameter_id));
        }
        let rows = self.store.list_ranges(parameter_id).await?;
        Ok(dedup_sorted(rows))
    }

    /// Every parameter of a study in display order, each with its ranges.
    /// Ranges of all parameters are fetched in one query.
    pub async fn study_detailed(&self, study_id: i64) -> Result<Vec<ParameterWithRanges>> {
        let parameters = self.store.list_study_parameters(study_id).await?;
        let ids: Vec<ParameterId> = parameters.iter().map(|p| p.id).collect();

        let mut by_parameter: BTreeMap<ParameterId, Vec<StoredRange>> = BTreeMap::new();
        for row in self.store.list_ranges_for(&ids).await? {
            by_parameter.entry(row.parameter_id).or_default().push(row);
        }

        Ok(parameters
            .into_iter()
            .map(|parameter| {
                let rows = by_parameter.remove(&parameter.id).unwrap_or_default();
                ParameterWithRanges {
                    parameter,
                    reference_ranges: dedup_sorted(rows),
                }
            })
            .collect())
    }
}
