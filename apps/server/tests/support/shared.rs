use std::sync::Arc;
use tokio::sync::OnceCell;

use labsync::Config;

/// Environment variable naming the PostgreSQL server used by database tests.
pub const TEST_DATABASE_ENV: &str = "LABSYNC_TEST_DATABASE_URL";

static SHARED: OnceCell<Arc<SharedTestResources>> = OnceCell::const_new();

pub struct SharedTestResources {
    pub base_config: Config,
}

pub async fn shared() -> Arc<SharedTestResources> {
    SHARED
        .get_or_init(|| async {
            init_tracing();

            // Built-in defaults only: a developer's labsync.toml or LABSYNC__*
            // variables must not change test outcomes.
            let mut config = Config::default();
            if let Ok(url) = std::env::var(TEST_DATABASE_ENV) {
                config.database.test_database_url = Some(url.clone());
                config.database.url = url;
            }
            config.database.pool_min_size = 0;
            config.database.pool_max_size = 5;
            config.database.pool_timeout_seconds = 30;

            Arc::new(SharedTestResources {
                base_config: config,
            })
        })
        .await
        .clone()
}

fn init_tracing() {
    use std::sync::OnceLock;
    use tracing_subscriber::prelude::*;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "labsync=info,sqlx=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
