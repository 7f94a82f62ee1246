//! Shared application state

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::{
    config::Config,
    db::{PostgresRangeStore, RangeStore},
    services::{RangeAuditService, RangeListingService, RangeSyncService, SyncSettings},
    startup, Result,
};

#[derive(Clone)]
pub struct AppState<S: RangeStore = PostgresRangeStore> {
    pub config: Arc<Config>,
    pub store: S,
    pub sync_service: Arc<RangeSyncService<S>>,
    pub listing_service: Arc<RangeListingService<S>>,
    pub audit_service: Arc<RangeAuditService<S>>,
}

impl AppState<PostgresRangeStore> {
    /// Connect to PostgreSQL and, when configured, bring the schema up to date.
    pub async fn new(config: Config) -> Result<Self> {
        let pool = startup::connect_pool(&config.database).await?;
        if config.database.run_migrations {
            startup::initialize_schema(&pool).await?;
        }
        Ok(Self::with_store(Arc::new(config), PostgresRangeStore::new(pool)))
    }
}

impl<S: RangeStore> AppState<S> {
    pub fn with_store(config: Arc<Config>, store: S) -> Self {
        let settings = SyncSettings::from_config(&config);
        let max_age_years = Decimal::from(config.ranges.gap_fill_max_age_years);

        Self {
            sync_service: Arc::new(RangeSyncService::new(store.clone(), settings)),
            listing_service: Arc::new(RangeListingService::new(store.clone())),
            audit_service: Arc::new(RangeAuditService::new(store.clone(), max_age_years)),
            store,
            config,
        }
    }
}
