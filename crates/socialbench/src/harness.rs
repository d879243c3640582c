//! Workload runner.
//!
//! A run is a fixed sequence over one connected backend:
//! INSERT (optional) -> SELECT (optional) -> UPDATE (reserved) -> DELETE
//! (optional) -> close. The first error aborts the run; the backend is closed
//! on every path.

use std::cell::RefCell;
use std::io::Write;
use std::ops::{Deref, DerefMut};

use crate::backends::{self, Backend};
use crate::catalogue::catalogue;
use crate::config::{BackendFamily, BenchConfig, Phase};
use crate::error::{Error, Result};
use crate::fixtures::{EntityKind, Generator, Post, Table, User};
use crate::progress::ProgressSink;
use crate::report::Report;

/// A connected backend that is closed exactly once.
///
/// [`Session::close`] closes on the success path and reports the error; if the
/// session is dropped without it (early return, panic) the backend is closed
/// from `Drop` and a failure is only logged.
pub struct Session {
    backend: Box<dyn Backend>,
    closed: bool,
}

impl Session {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            closed: false,
        }
    }

    /// Close the backend, surfacing any error.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.backend.close()
    }
}

impl Deref for Session {
    type Target = dyn Backend;

    fn deref(&self) -> &Self::Target {
        self.backend.as_ref()
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.backend.as_mut()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!(backend = self.backend.name(), "closing session on drop");
        if let Err(e) = self.backend.close() {
            tracing::warn!(backend = self.backend.name(), error = %e, "failed to close backend");
        }
    }
}

/// Validate `config`, connect to its backend and run the workload.
///
/// Invalid counts are rejected before any connection is attempted.
pub fn run(config: &BenchConfig, out: &mut dyn Write) -> Result<Report> {
    config.validate()?;
    let backend = backends::connect(config)?;
    run_with(config, backend, out)
}

/// Run the workload on an already connected backend, closing it afterwards.
pub fn run_with(
    config: &BenchConfig,
    backend: Box<dyn Backend>,
    out: &mut dyn Write,
) -> Result<Report> {
    let mut session = Session::new(backend);
    config.validate()?;
    let mut report = Report::new(session.name(), config.seed);
    writeln!(out, "Connected to {}", session.name())?;
    tracing::info!(backend = session.name(), seed = config.seed, "starting run");

    if config.create_schema {
        session
            .prepare_schema()
            .map_err(|e| e.in_phase(Phase::Insert, "schema"))?;
    }

    let phases = &config.phases;
    if phases.enabled(Phase::Insert) {
        insert_phase(&mut *session, config, &mut report, out)?;
    }
    if phases.enabled(Phase::Select) {
        select_phase(&mut *session, config, &mut report, out)?;
    }
    if phases.enabled(Phase::Update) {
        tracing::info!("UPDATE phase has no workload, skipping");
    }
    if phases.enabled(Phase::Delete) {
        delete_phase(&mut *session, config, &mut report, out)?;
    }

    session.close()?;
    tracing::info!(
        backend = %report.backend,
        operations = report.measurements.len(),
        "run finished"
    );
    Ok(report)
}

/// Generate and insert every kind in dependency order, then commit.
///
/// Progress bars are drawn on `out` between the runner's own lines.
fn insert_phase(
    backend: &mut dyn Backend,
    config: &BenchConfig,
    report: &mut Report,
    out: &mut dyn Write,
) -> Result<()> {
    tracing::info!(phase = %Phase::Insert, "phase started");
    let sink = RefCell::new(out);
    let out: &ProgressSink<'_> = &sink;
    writeln!(out.borrow_mut(), "Testing INSERT:")?;

    let mut generator = Generator::new(config.seed).with_pair_selection(config.pair_selection);
    if config.show_progress {
        generator = generator.with_progress(out);
    }
    let mut users: Vec<User> = Vec::new();
    let mut posts: Vec<Post> = Vec::new();

    for kind in EntityKind::INSERT_ORDER {
        let count = config.counts.get(kind);
        let fail = |e: Error| e.in_phase(Phase::Insert, kind.collection());

        {
            let mut out = out.borrow_mut();
            writeln!(out, "Generating {count} {kind}")?;
            out.flush()?;
        }
        let table = match kind {
            EntityKind::User => {
                users = generator.users(count);
                Table::from_records(&users)
            }
            EntityKind::Post => {
                posts = generator.posts(&users, count).map_err(fail)?;
                Table::from_records(&posts)
            }
            EntityKind::Comment => {
                Table::from_records(&generator.comments(&posts, &users, count).map_err(fail)?)
            }
            EntityKind::Like => {
                Table::from_records(&generator.likes(&posts, &users, count).map_err(fail)?)
            }
            EntityKind::Follower => {
                Table::from_records(&generator.followers(&users, count).map_err(fail)?)
            }
            EntityKind::Message => {
                Table::from_records(&generator.messages(&users, count).map_err(fail)?)
            }
        };

        writeln!(out.borrow_mut(), "Inserting {count} {kind}")?;
        backend.insert_many(&table).map_err(fail)?;
        let timing = backend.last_timing();
        writeln!(out.borrow_mut(), "{timing}\n")?;
        report.record(Phase::Insert, kind.collection(), Some(table.len()), timing);
    }

    backend
        .commit()
        .map_err(|e| e.in_phase(Phase::Insert, "commit"))
}

/// Run every catalogue query in order.
fn select_phase(
    backend: &mut dyn Backend,
    config: &BenchConfig,
    report: &mut Report,
    out: &mut dyn Write,
) -> Result<()> {
    tracing::info!(phase = %Phase::Select, "phase started");
    writeln!(out, "Testing SELECT:")?;
    backend.capture_rows(config.print_rows);

    for query in catalogue(&config.counts) {
        match backend.family() {
            BackendFamily::Relational => writeln!(out, "{}: {}", query.id, query.sql)?,
            BackendFamily::Document => writeln!(out, "{}: {}", query.id, query.pipeline)?,
        }
        let rows = backend
            .execute(&query)
            .map_err(|e| e.in_phase(Phase::Select, query.id.to_string()))?;
        for row in backend.take_rows() {
            writeln!(out, "{row}")?;
        }
        let timing = backend.last_timing();
        writeln!(out, "{timing}\n")?;
        tracing::debug!(query = query.id.name(), rows, "query finished");
        report.record(Phase::Select, query.id.to_string(), Some(rows), timing);
    }
    Ok(())
}

/// Delete every kind in reverse dependency order, committing after each.
fn delete_phase(
    backend: &mut dyn Backend,
    config: &BenchConfig,
    report: &mut Report,
    out: &mut dyn Write,
) -> Result<()> {
    tracing::info!(phase = %Phase::Delete, "phase started");
    writeln!(out, "Testing DELETE:")?;

    for kind in EntityKind::DELETE_ORDER {
        writeln!(out, "Deleting {} {kind}", config.counts.get(kind))?;
        backend
            .delete_all(kind)
            .map_err(|e| e.in_phase(Phase::Delete, kind.collection()))?;
        let timing = backend.last_timing();
        writeln!(out, "{timing}\n")?;
        report.record(Phase::Delete, kind.collection(), None, timing);
        backend
            .commit()
            .map_err(|e| e.in_phase(Phase::Delete, kind.collection()))?;
    }
    Ok(())
}
