//! PostgreSQL backend.
//!
//! Every measured statement is prefixed with `EXPLAIN ANALYZE`, which executes
//! it and reports `Execution Time: X ms` as the last plan line. Writes run in
//! one transaction that is committed by [`Backend::commit`].

use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Runtime;

use super::sql::{self, Placeholder};
use super::{closed, runtime, Backend};
use crate::catalogue::CatalogueQuery;
use crate::config::BackendFamily;
use crate::error::{Error, Result};
use crate::fixtures::{EntityKind, Table, Value};
use crate::timing::{parse_explain_analyze, parse_explain_rows, Timing};

/// Bind parameter limit of the PostgreSQL wire protocol.
const MAX_PARAMS: usize = 65_535;

type PgTransaction = Transaction<'static, Postgres>;

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Int(v) => query.bind(*v),
        Value::Text(s) => query.bind(s.as_str()),
    }
}

/// Begin a transaction unless one is already open.
async fn transaction<'t>(
    pool: &PgPool,
    tx: &'t mut Option<PgTransaction>,
) -> Result<&'t mut PgTransaction> {
    if tx.is_none() {
        *tx = Some(pool.begin().await?);
    }
    tx.as_mut().ok_or_else(|| closed("postgresql"))
}

/// PostgreSQL backend.
pub struct PostgresBackend {
    rt: Runtime,
    pool: Option<PgPool>,
    tx: Option<PgTransaction>,
    last: Timing,
    capture_rows: bool,
    /// Plan lines of the last query; `EXPLAIN ANALYZE` discards the rows.
    rows: Vec<String>,
}

impl PostgresBackend {
    /// Connect to `database_url`. One pooled connection keeps every statement
    /// on the same session.
    pub fn connect(database_url: &str) -> Result<Self> {
        let rt = runtime()?;
        let pool = rt
            .block_on(
                PgPoolOptions::new()
                    .max_connections(1)
                    .connect(database_url),
            )
            .map_err(|e| Error::Connection(format!("postgresql: {e}")))?;
        tracing::info!("connected to postgresql");

        Ok(Self {
            rt,
            pool: Some(pool),
            tx: None,
            last: Timing::Unavailable,
            capture_rows: false,
            rows: Vec::new(),
        })
    }

    /// Run `EXPLAIN ANALYZE <statement>` with positional parameters and return
    /// the plan lines. Records the execution time.
    pub fn execute_sql(&mut self, statement: &str, params: &[&Value]) -> Result<Vec<String>> {
        let explain = format!("EXPLAIN ANALYZE {statement}");
        tracing::debug!(statement, params = params.len(), "postgresql execute");

        let Self { rt, pool, tx, .. } = self;
        let pool = pool.as_ref().ok_or_else(|| closed("postgresql"))?;
        let plan = rt.block_on(async {
            let tx = transaction(pool, tx).await?;
            let mut query = sqlx::query(&explain);
            for value in params {
                query = bind_value(query, value);
            }
            let rows = query.fetch_all(&mut **tx).await?;
            rows.iter()
                .map(|row| row.try_get::<String, _>(0))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })?;

        self.last = parse_explain_analyze(&plan);
        if !self.last.is_available() {
            tracing::warn!(statement, "no execution time in plan output");
        }
        Ok(plan)
    }

    /// Number of rows currently stored for `kind`.
    pub fn count_rows(&mut self, kind: EntityKind) -> Result<usize> {
        let statement = format!("SELECT COUNT(*) FROM {}", kind.collection());
        let Self { rt, pool, tx, .. } = self;
        let pool = pool.as_ref().ok_or_else(|| closed("postgresql"))?;
        let count: i64 = rt.block_on(async {
            let tx = transaction(pool, tx).await?;
            let row = sqlx::query(&statement).fetch_one(&mut **tx).await?;
            row.try_get::<i64, _>(0).map_err(Error::from)
        })?;
        Ok(count as usize)
    }
}

impl Backend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Relational
    }

    fn prepare_schema(&mut self) -> Result<()> {
        let Self { rt, pool, tx, .. } = self;
        let pool = pool.as_ref().ok_or_else(|| closed("postgresql"))?;
        rt.block_on(async {
            let tx = transaction(pool, tx).await?;
            for ddl in sql::SCHEMA {
                sqlx::query(ddl).execute(&mut **tx).await?;
            }
            Ok::<_, Error>(())
        })?;
        self.commit()
    }

    fn insert_many(&mut self, table: &Table) -> Result<()> {
        if table.is_empty() {
            self.last = Timing::Unavailable;
            return Ok(());
        }

        let chunk_rows = sql::rows_per_statement(table.kind, MAX_PARAMS);
        let mut total = Timing::Millis(0.0);
        for chunk in table.rows.chunks(chunk_rows) {
            let statement = sql::insert_statement(table.kind, chunk.len(), Placeholder::Numbered);
            let params: Vec<&Value> = sql::flatten(chunk).collect();
            self.execute_sql(&statement, &params)?;
            total = total + self.last;
        }
        self.last = total;
        Ok(())
    }

    fn execute(&mut self, query: &CatalogueQuery) -> Result<usize> {
        let plan = self.execute_sql(&query.sql, &[])?;
        let rows = parse_explain_rows(&plan).unwrap_or_default();
        if self.capture_rows {
            self.rows = plan;
        }
        Ok(rows)
    }

    fn delete_all(&mut self, kind: EntityKind) -> Result<()> {
        self.execute_sql(&sql::delete_statement(kind), &[])?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            self.rt.block_on(tx.commit())?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            self.rt.block_on(tx.rollback())?;
        }
        if let Some(pool) = self.pool.take() {
            self.rt.block_on(pool.close());
            tracing::info!("closed postgresql connection");
        }
        Ok(())
    }

    fn capture_rows(&mut self, enabled: bool) {
        self.capture_rows = enabled;
    }

    fn take_rows(&mut self) -> Vec<String> {
        std::mem::take(&mut self.rows)
    }

    fn last_timing(&self) -> Timing {
        self.last
    }
}
