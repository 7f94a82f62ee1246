pub mod shared;

use anyhow::Context as _;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use futures::FutureExt as _;
use labsync::{
    api::create_router,
    db::{InMemoryRangeStore, PostgresRangeStore, RangeStore},
    AppState, Config,
};
use labsync_ranges::{ParameterId, AUTO_FILL_NOTE, NO_REFERENCE_NOTE};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::Connection as _;
use std::sync::Arc;
use tower::ServiceExt as _;
use url::Url;
use uuid::Uuid;

pub struct TestApp<S: RangeStore> {
    pub router: Router,
    pub state: AppState<S>,
}

impl TestApp<InMemoryRangeStore> {
    pub async fn in_memory() -> Self {
        Self::in_memory_with_config(|_| {}).await
    }

    pub async fn in_memory_with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = shared::shared().await.base_config.clone();
        configure(&mut config);

        let state = AppState::with_store(Arc::new(config), InMemoryRangeStore::new());
        let router = create_router(state.clone());
        Self { router, state }
    }

    pub fn store(&self) -> &InMemoryRangeStore {
        &self.state.store
    }

    pub async fn parameter(&self, name: &str) -> ParameterId {
        self.store().add_parameter(1, name).await.id
    }
}

impl<S: RangeStore> TestApp<S> {
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(match body {
                Some(value) => Body::from(serde_json::to_vec(&value)?),
                None => Body::empty(),
            })
            .context("build request")?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;

        Ok((status, headers, body))
    }

    /// `PUT` a sync payload; returns the status and the JSON response.
    pub async fn sync(&self, parameter_id: ParameterId, body: Value) -> anyhow::Result<(StatusCode, Value)> {
        let (status, _, bytes) = self
            .request(
                Method::PUT,
                &format!("/parameters/{parameter_id}/reference-ranges"),
                Some(body),
            )
            .await?;
        Ok((status, json(&bytes)?))
    }

    /// Current ranges of a parameter as returned by the read endpoint.
    pub async fn list(&self, parameter_id: ParameterId) -> anyhow::Result<Vec<Value>> {
        let (status, _, bytes) = self
            .request(
                Method::GET,
                &format!("/parameters/{parameter_id}/reference-ranges"),
                None,
            )
            .await?;
        assert_status(status, StatusCode::OK, "list ranges");
        let value = json(&bytes)?;
        value
            .as_array()
            .cloned()
            .context("listing is not an array")
    }
}

pub struct PgTestApp {
    pub app: TestApp<PostgresRangeStore>,
    schema: String,
    admin_database_url: String,
}

impl PgTestApp {
    /// `None` when no test database is configured.
    pub async fn new(configure: impl FnOnce(&mut Config)) -> anyhow::Result<Option<Self>> {
        let mut config = shared::shared().await.base_config.clone();
        let Some(admin_database_url) = config.database.test_database_url.clone() else {
            return Ok(None);
        };
        configure(&mut config);

        let schema = format!("test_{}", Uuid::new_v4().simple());
        let mut admin_conn = sqlx::PgConnection::connect(&admin_database_url)
            .await
            .context("connect admin db for schema create")?;
        sqlx::query(&format!(r#"CREATE SCHEMA "{}""#, schema))
            .execute(&mut admin_conn)
            .await
            .context("create test schema")?;

        config.database.url = with_search_path(&admin_database_url, &schema)?;
        config.database.pool_min_size = 0;
        // Each test owns a pool; keep them small so parallel tests fit.
        config.database.pool_max_size = 4;
        config.database.run_migrations = true;

        let state: AppState = AppState::new(config)
            .await
            .context("initialize AppState")?;
        let router = create_router(state.clone());

        Ok(Some(Self {
            app: TestApp { router, state },
            schema,
            admin_database_url,
        }))
    }

    pub async fn parameter(&self, study_id: i64, name: &str) -> anyhow::Result<ParameterId> {
        let id = sqlx::query_scalar(
            "INSERT INTO parameters (study_id, name, position)
             VALUES ($1, $2, (SELECT count(*) FROM parameters WHERE study_id = $1))
             RETURNING id",
        )
        .bind(study_id)
        .bind(name)
        .fetch_one(self.app.state.store.pool())
        .await
        .context("insert parameter")?;
        Ok(id)
    }

    pub async fn cleanup(self) -> anyhow::Result<()> {
        self.app.state.store.pool().close().await;

        let mut admin_conn = sqlx::PgConnection::connect(&self.admin_database_url)
            .await
            .context("connect admin db for schema drop")?;
        sqlx::query(&format!(r#"DROP SCHEMA "{}" CASCADE"#, self.schema))
            .execute(&mut admin_conn)
            .await
            .context("drop test schema")?;

        Ok(())
    }
}

/// Run `f` against a fresh PostgreSQL schema, or skip when no test database
/// is configured.
pub async fn with_pg_app<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(
        &'a PgTestApp,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    with_pg_app_with_config(|_| {}, f).await
}

pub async fn with_pg_app_with_config<C, F>(configure: C, f: F) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: for<'a> FnOnce(
        &'a PgTestApp,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    let Some(app) = PgTestApp::new(configure).await? else {
        eprintln!("{} not set; skipping", shared::TEST_DATABASE_ENV);
        return Ok(());
    };

    let result = std::panic::AssertUnwindSafe(f(&app)).catch_unwind().await;
    if let Err(e) = app.cleanup().await {
        eprintln!("test schema cleanup failed: {e:?}");
    }

    match result {
        Ok(r) => r,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn with_search_path(database_url: &str, schema: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(database_url).context("parse database URL")?;
    url.query_pairs_mut()
        .append_pair("options", &format!("-c search_path={}", schema));
    Ok(url.to_string())
}

pub fn json(bytes: &Bytes) -> anyhow::Result<Value> {
    serde_json::from_slice(bytes).context("response body is not JSON")
}

pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(actual, expected, "unexpected status for {context}");
}

/// How a listed row reads: `real`, `placeholder`, `fallback` or `empty`.
pub fn row_kind(row: &Value) -> &'static str {
    if row["valueKind"] != "empty" {
        return "real";
    }
    match row["notes"].as_str() {
        Some(AUTO_FILL_NOTE) => "placeholder",
        Some(NO_REFERENCE_NOTE) => "fallback",
        _ => "empty",
    }
}

fn age(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse::<Decimal>().ok().and_then(|d| d.to_i64()),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// `(age_min, age_max, kind)` of the rows of one sex, in age order.
pub fn spans(rows: &[Value], sex: &str) -> Vec<(Option<i64>, Option<i64>, &'static str)> {
    let mut out: Vec<_> = rows
        .iter()
        .filter(|row| row["sex"] == sex)
        .map(|row| (age(&row["ageMin"]), age(&row["ageMax"]), row_kind(row)))
        .collect();
    out.sort_by_key(|(min, max, _)| (*min, *max));
    out
}
