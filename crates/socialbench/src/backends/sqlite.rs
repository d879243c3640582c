//! SQLite backend.
//!
//! SQLite has no server-side profiling table, so durations are measured on the
//! client around each statement. Runs in-process, which makes it the backend
//! for offline runs and the test-suite.

use std::path::Path;
use std::time::Instant;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};

use super::sql::{self, Placeholder};
use super::{closed, Backend};
use crate::catalogue::CatalogueQuery;
use crate::config::BackendFamily;
use crate::error::Result;
use crate::fixtures::{EntityKind, Table, Value};
use crate::timing::Timing;

/// Bind variable limit of the bundled SQLite build.
const MAX_PARAMS: usize = 32_766;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Int(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Render one result row as `(a, b, ...)`.
fn render_row(row: &rusqlite::Row<'_>, columns: usize) -> rusqlite::Result<String> {
    let mut values = Vec::with_capacity(columns);
    for i in 0..columns {
        values.push(match row.get_ref(i)? {
            ValueRef::Null => "NULL".to_string(),
            ValueRef::Integer(v) => v.to_string(),
            ValueRef::Real(v) => v.to_string(),
            ValueRef::Text(t) => format!("{:?}", String::from_utf8_lossy(t)),
            ValueRef::Blob(b) => hex::encode(b),
        });
    }
    Ok(format!("({})", values.join(", ")))
}

/// SQLite backend.
pub struct SqliteBackend {
    conn: Option<Connection>,
    last: Timing,
    capture_rows: bool,
    rows: Vec<String>,
}

impl SqliteBackend {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        tracing::info!("opened sqlite database");
        Ok(Self {
            conn: Some(conn),
            last: Timing::Unavailable,
            capture_rows: false,
            rows: Vec::new(),
        })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| closed("sqlite"))
    }

    /// Open a transaction unless one is already pending.
    fn begin(&self) -> Result<()> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Execute a literal statement with positional parameters, returning the
    /// number of result rows (or affected rows for writes).
    pub fn execute_sql<'p, I>(&mut self, statement: &str, params: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'p Value>,
    {
        self.begin()?;
        tracing::debug!(statement, "sqlite execute");

        let capture = self.capture_rows;
        let mut rendered = Vec::new();
        let started = Instant::now();
        let count = {
            let mut stmt = self.conn()?.prepare(statement)?;
            let columns = stmt.column_count();
            if columns > 0 {
                let mut rows = stmt.query(params_from_iter(params))?;
                let mut count = 0;
                while let Some(row) = rows.next()? {
                    if capture {
                        rendered.push(render_row(row, columns)?);
                    }
                    count += 1;
                }
                count
            } else {
                stmt.execute(params_from_iter(params))?
            }
        };
        self.last = Timing::from_duration(started.elapsed());
        self.rows = rendered;
        Ok(count)
    }

    /// Number of rows currently stored for `kind`.
    pub fn count_rows(&self, kind: EntityKind) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.collection()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Relational
    }

    fn prepare_schema(&mut self) -> Result<()> {
        let conn = self.conn()?;
        for ddl in sql::SCHEMA {
            conn.execute_batch(ddl)?;
        }
        Ok(())
    }

    fn insert_many(&mut self, table: &Table) -> Result<()> {
        if table.is_empty() {
            self.last = Timing::Unavailable;
            return Ok(());
        }

        let chunk_rows = sql::rows_per_statement(table.kind, MAX_PARAMS);
        let mut total = Timing::Millis(0.0);
        for chunk in table.rows.chunks(chunk_rows) {
            let statement = sql::insert_statement(table.kind, chunk.len(), Placeholder::Question);
            self.execute_sql(&statement, sql::flatten(chunk))?;
            total = total + self.last;
        }
        self.last = total;
        Ok(())
    }

    fn execute(&mut self, query: &CatalogueQuery) -> Result<usize> {
        self.execute_sql(&query.sql, [])
    }

    fn delete_all(&mut self, kind: EntityKind) -> Result<()> {
        self.execute_sql(&sql::delete_statement(kind), [])?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
            conn.close().map_err(|(_, e)| e)?;
            tracing::info!("closed sqlite database");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::catalogue;
    use crate::config::EntityCounts;
    use crate::fixtures::{Dataset, Generator};

    fn seeded(counts: &EntityCounts) -> SqliteBackend {
        let dataset = Dataset::generate(counts, &mut Generator::new(41)).unwrap();
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend.prepare_schema().unwrap();
        for kind in EntityKind::INSERT_ORDER {
            backend.insert_many(&dataset.table(kind)).unwrap();
        }
        backend.commit().unwrap();
        backend
    }

    #[test]
    fn test_insert_and_count() {
        let counts = EntityCounts::uniform(8);
        let backend = seeded(&counts);
        for kind in EntityKind::INSERT_ORDER {
            assert_eq!(backend.count_rows(kind).unwrap(), 8);
        }
        assert!(backend.last_timing().is_available());
    }

    #[test]
    fn test_insert_is_chunked() {
        let counts = EntityCounts {
            users: 6_000,
            ..EntityCounts::uniform(0)
        };
        let backend = seeded(&counts);
        assert_eq!(backend.count_rows(EntityKind::User).unwrap(), 6_000);
    }

    #[test]
    fn test_delete_in_reverse_order() {
        let mut backend = seeded(&EntityCounts::uniform(5));
        for kind in EntityKind::DELETE_ORDER {
            backend.delete_all(kind).unwrap();
            assert!(backend.last_timing().as_millis().unwrap() >= 0.0);
            backend.commit().unwrap();
        }
        for kind in EntityKind::INSERT_ORDER {
            assert_eq!(backend.count_rows(kind).unwrap(), 0);
        }
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let mut backend = seeded(&EntityCounts::uniform(5));
        assert!(backend.delete_all(EntityKind::User).is_err());
    }

    #[test]
    fn test_count_posts_query() {
        let counts = EntityCounts::uniform(6);
        let mut backend = seeded(&counts);
        let count_posts = &catalogue(&counts)[2];

        // COUNT(*) returns a single row holding the count.
        assert_eq!(backend.execute(count_posts).unwrap(), 1);
        let posts: i64 = backend
            .conn()
            .unwrap()
            .query_row(&count_posts.sql, [], |row| row.get(0))
            .unwrap();
        assert_eq!(posts, 6);
    }

    #[test]
    fn test_every_catalogue_query_runs() {
        let counts = EntityCounts::uniform(10);
        let mut backend = seeded(&counts);
        for query in catalogue(&counts) {
            backend.execute(&query).unwrap();
            assert!(backend.last_timing().is_available());
        }
    }

    #[test]
    fn test_captured_rows() {
        let counts = EntityCounts::uniform(6);
        let mut backend = seeded(&counts);
        let count_posts = &catalogue(&counts)[2];

        backend.execute(count_posts).unwrap();
        assert!(backend.take_rows().is_empty());

        backend.capture_rows(true);
        backend.execute(count_posts).unwrap();
        assert_eq!(backend.take_rows(), vec!["(6)".to_string()]);

        let rows = backend
            .execute_sql("SELECT user_id, username FROM Users WHERE user_id = 1", [])
            .unwrap();
        assert_eq!(rows, 1);
        let captured = backend.take_rows();
        assert!(captured[0].starts_with("(1, \""));
    }

    #[test]
    fn test_closed_backend_errors() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend.close().unwrap();
        backend.close().unwrap();
        assert!(backend.prepare_schema().is_err());
    }
}
