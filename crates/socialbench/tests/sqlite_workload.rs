//! End-to-end workload runs against SQLite.

use std::cell::Cell;
use std::io;
use std::path::Path;
use std::rc::Rc;

use socialbench::{
    run, run_with, Backend, BackendFamily, BackendKind, BenchConfig, CatalogueQuery,
    EntityCounts, EntityKind, Error, PairSelection, Phase, Phases, QueryId, Report,
    SqliteBackend, Table, Timing,
};

fn sqlite_config(counts: EntityCounts) -> BenchConfig {
    BenchConfig::new(BackendKind::Sqlite)
        .with_counts(counts)
        .without_progress()
}

fn file_config(path: &Path, counts: EntityCounts) -> BenchConfig {
    let mut config = sqlite_config(counts);
    config.connection.sqlite_path = Some(path.to_path_buf());
    config
}

fn select_rows(report: &Report) -> Vec<(String, Option<usize>)> {
    report
        .phase(Phase::Select)
        .map(|m| (m.target.clone(), m.rows))
        .collect()
}

#[test]
fn test_full_run_leaves_every_table_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.db");
    let config = file_config(&path, EntityCounts::uniform(25));

    let mut out: Vec<u8> = Vec::new();
    let report = run(&config, &mut out).unwrap();

    assert_eq!(report.backend, "sqlite");
    assert_eq!(report.phase(Phase::Insert).count(), 6);
    assert_eq!(report.phase(Phase::Select).count(), 10);
    assert_eq!(report.phase(Phase::Delete).count(), 6);
    assert!(report
        .measurements
        .iter()
        .all(|m| m.duration_ms.as_millis().map_or(false, |ms| ms >= 0.0)));

    let backend = SqliteBackend::open(&path).unwrap();
    for kind in EntityKind::INSERT_ORDER {
        assert_eq!(backend.count_rows(kind).unwrap(), 0, "{kind} not emptied");
    }

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Testing INSERT:"));
    assert!(text.contains("Query 10: "));
    assert!(text.contains("Deleting 25 Users"));
}

#[test]
fn test_six_posts_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("count.db");
    let counts = EntityCounts {
        users: 6,
        posts: 6,
        ..EntityCounts::uniform(0)
    };
    let config = file_config(&path, counts).with_phases(Phases {
        delete: false,
        ..Phases::default()
    });

    let report = run(&config, &mut io::sink()).unwrap();
    let count_posts = report
        .phase(Phase::Select)
        .find(|m| m.target == QueryId::CountPosts.to_string())
        .unwrap();
    assert_eq!(count_posts.rows, Some(1));

    let backend = SqliteBackend::open(&path).unwrap();
    assert_eq!(backend.count_rows(EntityKind::Post).unwrap(), 6);
    assert_eq!(backend.count_rows(EntityKind::User).unwrap(), 6);
}

#[test]
fn test_identical_seeds_return_identical_row_counts() {
    let counts = EntityCounts::uniform(40);
    let config = sqlite_config(counts).with_seed(7);

    let first = run(&config, &mut io::sink()).unwrap();
    let second = run(&config, &mut io::sink()).unwrap();
    assert_eq!(select_rows(&first), select_rows(&second));

    // Half of the users, per the LIMIT of the first query.
    assert_eq!(select_rows(&first)[0], ("Query 1".to_string(), Some(20)));
}

#[test]
fn test_sampled_pairs_run() {
    let counts = EntityCounts {
        likes: 300,
        followers: 200,
        ..EntityCounts::uniform(20)
    };
    let config = sqlite_config(counts).with_pair_selection(PairSelection::Sampled);

    let report = run(&config, &mut io::sink()).unwrap();
    let likes = report
        .phase(Phase::Insert)
        .find(|m| m.target == "Likes")
        .unwrap();
    assert_eq!(likes.rows, Some(300));
}

#[test]
fn test_ceiling_violation_rejected_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.db");
    let counts = EntityCounts {
        likes: 26,
        ..EntityCounts::uniform(5)
    };

    let err = run(&file_config(&path, counts), &mut io::sink()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!path.exists());
}

/// SQLite backend that counts how often it is closed.
struct Tracked {
    inner: SqliteBackend,
    closes: Rc<Cell<usize>>,
}

impl Backend for Tracked {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn family(&self) -> BackendFamily {
        self.inner.family()
    }

    fn prepare_schema(&mut self) -> socialbench::Result<()> {
        self.inner.prepare_schema()
    }

    fn insert_many(&mut self, table: &Table) -> socialbench::Result<()> {
        self.inner.insert_many(table)
    }

    fn execute(&mut self, query: &CatalogueQuery) -> socialbench::Result<usize> {
        self.inner.execute(query)
    }

    fn delete_all(&mut self, kind: EntityKind) -> socialbench::Result<()> {
        self.inner.delete_all(kind)
    }

    fn commit(&mut self) -> socialbench::Result<()> {
        self.inner.commit()
    }

    fn close(&mut self) -> socialbench::Result<()> {
        self.closes.set(self.closes.get() + 1);
        self.inner.close()
    }

    fn last_timing(&self) -> Timing {
        self.inner.last_timing()
    }
}

#[test]
fn test_backend_closed_once_on_success() {
    let closes = Rc::new(Cell::new(0));
    let backend = Tracked {
        inner: SqliteBackend::open_in_memory().unwrap(),
        closes: Rc::clone(&closes),
    };

    run_with(
        &sqlite_config(EntityCounts::uniform(5)),
        Box::new(backend),
        &mut io::sink(),
    )
    .unwrap();
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_backend_closed_when_insert_fails() {
    let closes = Rc::new(Cell::new(0));
    let backend = Tracked {
        inner: SqliteBackend::open_in_memory().unwrap(),
        closes: Rc::clone(&closes),
    };
    // No tables: the first insert fails.
    let config = sqlite_config(EntityCounts::uniform(5)).without_schema();

    let err = run_with(&config, Box::new(backend), &mut io::sink()).unwrap_err();
    match err {
        Error::Phase { phase, target, .. } => {
            assert_eq!(phase, Phase::Insert);
            assert_eq!(target, "Users");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(closes.get(), 1);
}
