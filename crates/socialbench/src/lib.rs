//! Social-network workload benchmarks.
//!
//! One logical workload, six entity kinds with foreign-key dependencies, is
//! inserted, queried and deleted on a single backend per run, and every
//! operation's server-reported (or wall-clock) duration is collected.
//!
//! # Backends
//!
//! - **Document**: MongoDB 7 and MongoDB 8, timed through the profiler
//! - **Relational**: MariaDB (`SHOW PROFILES`), PostgreSQL (`EXPLAIN ANALYZE`)
//!   and SQLite (wall clock)
//!
//! ```no_run
//! use socialbench::{run, BackendKind, BenchConfig, EntityCounts};
//!
//! let config = BenchConfig::new(BackendKind::Sqlite).with_counts(EntityCounts::uniform(1_000));
//! let report = run(&config, &mut std::io::stdout())?;
//! println!("{}", report.render_text());
//! # Ok::<(), socialbench::Error>(())
//! ```

pub mod backends;
pub mod catalogue;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod progress;
pub mod report;
pub mod timing;

pub use backends::{Backend, MariaDbBackend, MongoBackend, PostgresBackend, SqliteBackend};
pub use catalogue::{catalogue, CatalogueQuery, Pipeline, QueryId};
pub use config::{
    Args, BackendFamily, BackendKind, BenchConfig, ConnectionSettings, EntityCounts,
    OutputFormat, PairSelection, Phase, Phases, ServerSettings,
};
pub use error::{Error, Result};
pub use fixtures::{Dataset, EntityKind, Generator, Table, Value, DEFAULT_SEED};
pub use harness::{run, run_with, Session};
pub use report::{Measurement, Report};
pub use timing::Timing;
