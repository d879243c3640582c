//! Database backends for the workload.
//!
//! Every backend implements [`Backend`] over its own driver. The trait is
//! blocking: async drivers are driven by a current-thread Tokio runtime owned
//! by the backend, so the runner stays strictly sequential.

pub mod mariadb;
pub mod mongo;
pub mod postgres;
pub mod sql;
pub mod sqlite;

pub use mariadb::MariaDbBackend;
pub use mongo::MongoBackend;
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

use tokio::runtime::{Builder, Runtime};

use crate::catalogue::CatalogueQuery;
use crate::config::{BackendFamily, BackendKind, BenchConfig};
use crate::error::{Error, Result};
use crate::fixtures::{EntityKind, Table};
use crate::timing::Timing;

/// Common interface over the supported backends.
///
/// Connecting is done by each implementation's constructor; see [`connect`].
pub trait Backend {
    /// Backend variant name, e.g. `postgresql`.
    fn name(&self) -> &'static str;

    fn family(&self) -> BackendFamily;

    /// Create the six tables when missing. Schemaless backends do nothing.
    fn prepare_schema(&mut self) -> Result<()> {
        Ok(())
    }

    /// Bulk-insert every row of `table`.
    fn insert_many(&mut self, table: &Table) -> Result<()>;

    /// Run the backend's form of a catalogue query, returning the number of
    /// result rows.
    fn execute(&mut self, query: &CatalogueQuery) -> Result<usize>;

    /// Remove every row of `kind`.
    fn delete_all(&mut self, kind: EntityKind) -> Result<()>;

    /// Make pending writes durable. A no-op where writes commit implicitly.
    fn commit(&mut self) -> Result<()>;

    /// Release the connection. Calling it twice is harmless.
    fn close(&mut self) -> Result<()>;

    /// Keep the rendered result rows of subsequent queries for
    /// [`Backend::take_rows`]. Backends that cannot render rows ignore it.
    fn capture_rows(&mut self, _enabled: bool) {}

    /// Result rows of the most recent query, when capturing is on.
    fn take_rows(&mut self) -> Vec<String> {
        Vec::new()
    }

    /// Duration of the most recent insert, query or delete, in milliseconds.
    fn last_timing(&self) -> Timing;
}

/// Connect to the backend selected by `config`.
pub fn connect(config: &BenchConfig) -> Result<Box<dyn Backend>> {
    let connection = &config.connection;
    let backend: Box<dyn Backend> = match config.backend {
        kind @ (BackendKind::Mongodb7 | BackendKind::Mongodb8) => {
            let server = match kind {
                BackendKind::Mongodb7 => &connection.mongodb7,
                _ => &connection.mongodb8,
            };
            Box::new(MongoBackend::connect(
                kind,
                &connection.mongo_uri(kind)?,
                &server.database,
            )?)
        }
        BackendKind::Mariadb => Box::new(MariaDbBackend::connect(&connection.mariadb_url())?),
        BackendKind::Postgresql => {
            Box::new(PostgresBackend::connect(&connection.postgres_url())?)
        }
        BackendKind::Sqlite => Box::new(match &connection.sqlite_path {
            Some(path) => SqliteBackend::open(path)?,
            None => SqliteBackend::open_in_memory()?,
        }),
    };
    Ok(backend)
}

/// Single-threaded runtime for blocking on async drivers.
pub(crate) fn runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Connection(format!("failed to create runtime: {e}")))
}

pub(crate) fn closed(name: &str) -> Error {
    Error::Connection(format!("{name} connection is closed"))
}
