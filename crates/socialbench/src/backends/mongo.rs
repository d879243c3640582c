//! MongoDB backend.
//!
//! The profiler is switched to level 2 when the session starts, so every
//! operation lands in `system.profile`. One logical operation can span several
//! server round-trips (a `find` followed by `getMore` batches, an `insert`
//! split into batches), so the duration of the last operation is the sum of
//! `millis` over every profile entry for its namespace written after the
//! operation started. Writes are acknowledged per operation, so there is
//! nothing to commit.

use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::{Client, Collection, Database};
use tokio::runtime::Runtime;

use super::{closed, runtime, Backend};
use crate::catalogue::{CatalogueQuery, Pipeline};
use crate::config::{BackendFamily, BackendKind};
use crate::error::{Error, Result};
use crate::fixtures::{EntityKind, Table, Value};
use crate::timing::Timing;

const PROFILE_COLLECTION: &str = "system.profile";

impl From<&Value> for Bson {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(v) => Bson::Int64(*v),
            Value::Text(s) => Bson::String(s.clone()),
        }
    }
}

/// Build the document for one row, keyed by column name.
pub fn to_document(kind: EntityKind, row: &[Value]) -> Document {
    kind.columns()
        .iter()
        .zip(row)
        .map(|(column, value)| (column.to_string(), Bson::from(value)))
        .collect()
}

/// Read a profiler duration field as milliseconds.
pub fn millis_from_bson(value: Option<&Bson>) -> Timing {
    match value {
        Some(Bson::Int32(ms)) => Timing::from_millis(f64::from(*ms)),
        Some(Bson::Int64(ms)) => Timing::from_millis(*ms as f64),
        Some(Bson::Double(ms)) => Timing::from_millis(*ms),
        _ => Timing::Unavailable,
    }
}

/// Total duration of the profile entries recorded for `namespace`.
///
/// Entries of other namespaces (including `system.profile` reads) are
/// skipped. No matching entry, or one without a readable `millis`, makes the
/// whole duration unavailable.
pub fn profiled_millis(entries: &[Document], namespace: &str) -> Timing {
    let mut matching = entries
        .iter()
        .filter(|entry| entry.get_str("ns").is_ok_and(|ns| ns == namespace))
        .peekable();
    if matching.peek().is_none() {
        return Timing::Unavailable;
    }
    matching.map(|entry| millis_from_bson(entry.get("millis"))).sum()
}

/// Profile entries that belong to one measured operation.
#[derive(Clone, Debug)]
struct ProfileWindow {
    namespace: String,
    /// Timestamp of the newest profile entry before the operation started.
    after: Option<DateTime>,
}

impl ProfileWindow {
    fn filter(&self) -> Document {
        let mut filter = doc! { "ns": self.namespace.as_str() };
        if let Some(after) = self.after {
            filter.insert("ts", doc! { "$gt": after });
        }
        filter
    }
}

/// MongoDB backend.
pub struct MongoBackend {
    kind: BackendKind,
    rt: Runtime,
    client: Option<Client>,
    db: Database,
    /// None when the last operation never reached the server.
    window: Option<ProfileWindow>,
    /// Value of the last count stage.
    last_count: Option<u64>,
    capture_rows: bool,
    rows: Vec<String>,
}

impl MongoBackend {
    /// Connect to `uri`, select `database` and enable the profiler.
    ///
    /// The profile command doubles as the connectivity check: the driver
    /// connects lazily, so an unreachable server surfaces here.
    pub fn connect(kind: BackendKind, uri: &str, database: &str) -> Result<Self> {
        let rt = runtime()?;
        let client = rt
            .block_on(Client::with_uri_str(uri))
            .map_err(|e| Error::Connection(format!("{kind}: {e}")))?;
        let db = client.database(database);
        rt.block_on(async { db.run_command(doc! { "profile": 2 }).await })
            .map_err(|e| Error::Connection(format!("{kind}: {e}")))?;
        tracing::info!(backend = %kind, database, "connected, profiler enabled");

        Ok(Self {
            kind,
            rt,
            client: Some(client),
            db,
            window: None,
            last_count: None,
            capture_rows: false,
            rows: Vec::new(),
        })
    }

    fn profile(&self) -> Collection<Document> {
        self.db.collection(PROFILE_COLLECTION)
    }

    /// Open a profile window for an operation on `kind`.
    fn begin(&mut self, kind: EntityKind) -> Result<()> {
        let profile = self.profile();
        let newest = self.rt.block_on(async {
            profile
                .find_one(doc! {})
                .sort(doc! { "ts": -1 })
                .projection(doc! { "ts": 1 })
                .await
        })?;
        self.window = Some(ProfileWindow {
            namespace: format!("{}.{}", self.db.name(), kind.collection()),
            after: newest.and_then(|entry| entry.get_datetime("ts").ok().copied()),
        });
        Ok(())
    }

    fn collection(&self, kind: EntityKind) -> Result<Collection<Document>> {
        if self.client.is_none() {
            return Err(closed(self.kind.name()));
        }
        Ok(self.db.collection(kind.collection()))
    }

    /// Run one pipeline to completion, returning the number of result documents.
    pub fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<usize> {
        let collection = self.collection(pipeline.collection())?;
        tracing::debug!(collection = %pipeline.collection(), "mongodb execute");

        self.last_count = None;
        self.rows.clear();
        // `$limit: 0` is rejected by the server and `limit(0)` means no limit;
        // either way the relational form returns nothing.
        if pipeline.limit() == Some(0) {
            self.window = None;
            return Ok(0);
        }
        self.begin(pipeline.collection())?;
        let (count, docs) = self.rt.block_on(async {
            let result = match pipeline {
                Pipeline::Find {
                    filter,
                    projection,
                    limit,
                    ..
                } => {
                    let mut find = collection.find(filter.clone());
                    if let Some(projection) = projection {
                        find = find.projection(projection.clone());
                    }
                    if let Some(limit) = limit {
                        find = find.limit(*limit);
                    }
                    let docs: Vec<Document> = find.await?.try_collect().await?;
                    (None, docs)
                }
                Pipeline::Count { filter, .. } => {
                    let count = collection.count_documents(filter.clone()).await?;
                    (Some(count), vec![doc! { "count": count as i64 }])
                }
                Pipeline::Aggregate { stages, .. } => {
                    let docs: Vec<Document> = collection
                        .aggregate(stages.clone())
                        .await?
                        .try_collect()
                        .await?;
                    (None, docs)
                }
            };
            Ok::<_, Error>(result)
        })?;

        if let Some(count) = count {
            tracing::debug!(collection = %pipeline.collection(), count, "count stage");
        }
        self.last_count = count;
        if self.capture_rows {
            self.rows = docs.iter().map(Document::to_string).collect();
        }
        // A count stage yields one result row, like SELECT COUNT(*).
        Ok(docs.len())
    }

    /// Value produced by the most recent count pipeline.
    pub fn last_count(&self) -> Option<u64> {
        self.last_count
    }

    /// Number of documents currently stored for `kind`.
    pub fn count_rows(&mut self, kind: EntityKind) -> Result<usize> {
        let collection = self.collection(kind)?;
        let count = self
            .rt
            .block_on(async { collection.count_documents(doc! {}).await })?;
        Ok(count as usize)
    }
}

impl Backend for MongoBackend {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Document
    }

    fn insert_many(&mut self, table: &Table) -> Result<()> {
        if table.is_empty() {
            self.window = None;
            return Ok(());
        }
        let collection = self.collection(table.kind)?;
        self.begin(table.kind)?;
        let docs: Vec<Document> = table
            .rows
            .iter()
            .map(|row| to_document(table.kind, row))
            .collect();
        self.rt.block_on(async { collection.insert_many(docs).await })?;
        Ok(())
    }

    fn execute(&mut self, query: &CatalogueQuery) -> Result<usize> {
        self.run_pipeline(&query.pipeline)
    }

    fn delete_all(&mut self, kind: EntityKind) -> Result<()> {
        let collection = self.collection(kind)?;
        self.begin(kind)?;
        self.rt
            .block_on(async { collection.delete_many(doc! {}).await })?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            self.rt.block_on(async { client.shutdown().await });
            tracing::info!(backend = %self.kind, "closed connection");
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
        let Some(window) = self.window.as_ref() else {
            return Timing::Unavailable;
        };
        if self.client.is_none() {
            return Timing::Unavailable;
        }
        let profile = self.profile();
        let entries = self.rt.block_on(async {
            profile
                .find(window.filter())
                .projection(doc! { "ns": 1, "millis": 1 })
                .await?
                .try_collect::<Vec<Document>>()
                .await
        });
        match entries {
            Ok(entries) => profiled_millis(&entries, &window.namespace),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read profiler entries");
                Timing::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Generator, Record};

    #[test]
    fn test_to_document_uses_column_names() {
        let users = Generator::new(41).users(1);
        let doc = to_document(EntityKind::User, &users[0].values());

        assert_eq!(doc.get_i64("user_id").unwrap(), 1);
        assert_eq!(doc.get_str("username").unwrap(), users[0].username);
        assert_eq!(doc.len(), EntityKind::User.columns().len());
    }

    #[test]
    fn test_millis_from_bson() {
        assert_eq!(millis_from_bson(Some(&Bson::Int32(12))), Timing::Millis(12.0));
        assert_eq!(millis_from_bson(Some(&Bson::Int64(3))), Timing::Millis(3.0));
        assert_eq!(millis_from_bson(Some(&Bson::Double(0.5))), Timing::Millis(0.5));
        assert_eq!(millis_from_bson(Some(&Bson::Int32(-1))), Timing::Unavailable);
        assert_eq!(
            millis_from_bson(Some(&Bson::String("N/A".to_string()))),
            Timing::Unavailable
        );
        assert_eq!(millis_from_bson(None), Timing::Unavailable);
    }

    #[test]
    fn test_profiled_millis_sums_batches() {
        let entries = vec![
            doc! { "op": "query", "ns": "bench.Users", "millis": 4 },
            doc! { "op": "getmore", "ns": "bench.Users", "millis": 7 },
            doc! { "op": "query", "ns": "bench.system.profile", "millis": 100 },
            doc! { "op": "getmore", "ns": "bench.Users", "millis": Bson::Int64(2) },
        ];
        assert_eq!(profiled_millis(&entries, "bench.Users"), Timing::Millis(13.0));
    }

    #[test]
    fn test_profiled_millis_without_entries() {
        let entries = vec![doc! { "ns": "bench.system.profile", "millis": 1 }];
        assert_eq!(profiled_millis(&entries, "bench.Posts"), Timing::Unavailable);
        assert_eq!(profiled_millis(&[], "bench.Posts"), Timing::Unavailable);
    }

    #[test]
    fn test_profiled_millis_unreadable_entry() {
        let entries = vec![
            doc! { "ns": "bench.Likes", "millis": 3 },
            doc! { "ns": "bench.Likes" },
        ];
        assert_eq!(profiled_millis(&entries, "bench.Likes"), Timing::Unavailable);
    }

    #[test]
    fn test_profile_window_filter() {
        let window = ProfileWindow {
            namespace: "bench.Posts".to_string(),
            after: None,
        };
        assert_eq!(window.filter(), doc! { "ns": "bench.Posts" });

        let after = DateTime::from_millis(1_700_000_000_000);
        let window = ProfileWindow {
            after: Some(after),
            ..window
        };
        assert_eq!(
            window.filter(),
            doc! { "ns": "bench.Posts", "ts": { "$gt": after } }
        );
    }
}
