// BookVerse - Book sharing platform storage layer
// Copyright (C) 2025 BookVerse contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! JSON document collections on SQLite
//!
//! Every collection is a table `(_id TEXT PRIMARY KEY, doc TEXT)` holding
//! one JSON object per row. Two catalog tables describe the store:
//!
//! - `_collections`: collection name and whether it is append-only
//! - `_indexes`: every declared index with its key pattern and unique flag
//!
//! The catalog is what makes index declaration behave like a document
//! store: an identical re-declaration is a no-op, a different definition
//! under the same name (or the same keys under another name) is an
//! `IndexConflict`.
//!
//! Append-only collections carry BEFORE UPDATE / BEFORE DELETE triggers that
//! abort with an `append-only collection: <name>` message.

use crate::docstore::query::{bind_all, field_expr, validate_collection, validate_field, Filter, FindOptions, SqlValue};
use crate::docstore::schema::{CollectionSpec, IndexKey, IndexKind, IndexSpec};
use crate::error::{BookverseError, Result, IMMUTABLE_MARKER};
use crate::storage::database::{connect_file, connect_memory};
use serde_json::{Map, Value};
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::{Path, PathBuf};

const CATALOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _collections (
    name TEXT PRIMARY KEY NOT NULL,
    append_only INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS _indexes (
    collection TEXT NOT NULL,
    name TEXT NOT NULL,
    keys TEXT NOT NULL,  -- JSON array of {field, kind}
    is_unique INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    PRIMARY KEY (collection, name),
    FOREIGN KEY (collection) REFERENCES _collections(name)
);
"#;

/// Name of the implicit primary-key index every collection has
pub const ID_INDEX: &str = "_id_";

/// Handle to a document store
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    path: Option<PathBuf>, // None for in-memory stores
}

impl DocumentStore {
    /// Open (or create) a document store file
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let store = Self {
            pool: connect_file(path).await?,
            path: Some(path.to_path_buf()),
        };
        store.bootstrap().await?;

        tracing::info!(path = %path.display(), "document store opened");
        Ok(store)
    }

    /// Create a private in-memory store for testing
    pub async fn open_in_memory() -> Result<Self> {
        let store = Self {
            pool: connect_memory().await?,
            path: None,
        };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        self.pool.execute(CATALOG_SQL).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    /// Run SQLite's integrity check on the store file
    pub async fn check_integrity(&self) -> Result<bool> {
        let result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;
        Ok(result == "ok")
    }

    /// Start a transaction spanning several document operations
    ///
    /// The transaction holds the write lock from its first statement, so
    /// concurrent writers queue on the busy timeout instead of failing when
    /// a read is followed by a write.
    pub async fn begin(&self) -> Result<DocumentTransaction> {
        Ok(DocumentTransaction {
            tx: begin_write(&self.pool).await?,
        })
    }

    // ========================================================================
    // COLLECTIONS
    // ========================================================================

    /// Create a plain collection. Returns false if it already existed.
    pub async fn create_collection(&self, name: &str) -> Result<bool> {
        self.ensure_collection(&CollectionSpec::new(name)).await
    }

    /// Create a collection with the options in `spec` (indexes are not built here)
    ///
    /// Declaring an existing collection append-only upgrades it; the reverse
    /// is ignored.
    pub async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<bool> {
        validate_collection(&spec.name)?;

        let mut tx = begin_write(&self.pool).await?;

        let existing: Option<bool> =
            sqlx::query_scalar("SELECT append_only FROM _collections WHERE name = ?")
                .bind(&spec.name)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_none() {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (_id TEXT PRIMARY KEY NOT NULL, doc TEXT NOT NULL CHECK (json_valid(doc)))",
                spec.name
            );
            sqlx::query(&ddl).execute(&mut *tx).await?;

            sqlx::query("INSERT INTO _collections (name, append_only) VALUES (?, ?)")
                .bind(&spec.name)
                .bind(spec.append_only)
                .execute(&mut *tx)
                .await?;
        } else if spec.append_only && existing == Some(false) {
            sqlx::query("UPDATE _collections SET append_only = 1 WHERE name = ?")
                .bind(&spec.name)
                .execute(&mut *tx)
                .await?;
        }

        if spec.append_only {
            for (suffix, event) in [("no_update", "UPDATE"), ("no_delete", "DELETE")] {
                let ddl = format!(
                    "CREATE TRIGGER IF NOT EXISTS \"{name}.{suffix}\" BEFORE {event} ON \"{name}\" \
                     BEGIN SELECT RAISE(ABORT, '{marker}: {name}'); END",
                    name = spec.name,
                    suffix = suffix,
                    event = event,
                    marker = IMMUTABLE_MARKER,
                );
                sqlx::query(&ddl).execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;

        if existing.is_none() {
            tracing::debug!(collection = %spec.name, append_only = spec.append_only, "created collection");
        }
        Ok(existing.is_none())
    }

    /// Names of all collections, sorted
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM _collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    pub async fn is_append_only(&self, collection: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        require_collection(&mut conn, collection).await
    }

    // ========================================================================
    // INDEXES
    // ========================================================================

    /// Declare an index, building it if it does not exist yet
    ///
    /// Returns `true` if the index was built and `false` if an identical one
    /// was already declared. The collection is created if needed.
    ///
    /// # Errors
    /// - `IndexConflict` if another definition holds the same name, the same
    ///   key pattern, or the collection already has a text index
    /// - `IndexBuildFailed` if existing documents violate a new unique index
    pub async fn create_index(&self, spec: &IndexSpec) -> Result<bool> {
        spec.validate()?;
        self.create_collection(&spec.collection).await?;

        let mut tx = begin_write(&self.pool).await?;
        let declared = load_indexes(&mut tx, &spec.collection).await?;

        if let Some(existing) = declared.iter().find(|i| i.name == spec.name) {
            if existing == spec {
                return Ok(false);
            }
            return Err(BookverseError::index_conflict(
                &spec.collection,
                &spec.name,
                "an index with this name exists with a different definition",
            ));
        }

        if let Some(existing) = declared.iter().find(|i| i.same_keys(spec)) {
            return Err(BookverseError::index_conflict(
                &spec.collection,
                &spec.name,
                format!("the same keys are already indexed as {}", existing.name),
            ));
        }

        let is_text = |i: &IndexSpec| i.keys.iter().any(|k| k.kind == IndexKind::Text);
        if is_text(spec) {
            if let Some(existing) = declared.iter().find(|i| is_text(*i)) {
                return Err(BookverseError::index_conflict(
                    &spec.collection,
                    &spec.name,
                    format!("collection already has text index {}", existing.name),
                ));
            }
        }

        if let Err(err) = sqlx::query(&spec.create_sql()).execute(&mut *tx).await {
            return Err(match BookverseError::from(err) {
                BookverseError::UniqueViolation(reason) => BookverseError::IndexBuildFailed {
                    collection: spec.collection.clone(),
                    index: spec.name.clone(),
                    reason,
                },
                other => other,
            });
        }

        sqlx::query("INSERT INTO _indexes (collection, name, keys, is_unique) VALUES (?, ?, ?, ?)")
            .bind(&spec.collection)
            .bind(&spec.name)
            .bind(serde_json::to_string(&spec.keys)?)
            .bind(spec.unique)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(collection = %spec.collection, index = %spec.name, unique = spec.unique, "built index");
        Ok(true)
    }

    /// Indexes of a collection, the implicit `_id_` index first
    pub async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>> {
        let mut conn = self.pool.acquire().await?;
        require_collection(&mut conn, collection).await?;

        let mut indexes = vec![IndexSpec {
            collection: collection.to_string(),
            name: ID_INDEX.to_string(),
            keys: vec![IndexKey {
                field: "_id".to_string(),
                kind: IndexKind::Ascending,
            }],
            unique: true,
        }];
        indexes.extend(load_indexes(&mut conn, collection).await?);
        Ok(indexes)
    }

    // ========================================================================
    // DOCUMENTS
    // ========================================================================

    /// Insert a document, generating `_id` when absent. Returns the `_id`.
    pub async fn insert_one(&self, collection: &str, doc: Value) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        insert_doc(&mut conn, collection, doc).await
    }

    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let mut conn = self.pool.acquire().await?;
        find_doc_by_id(&mut conn, collection, id).await
    }

    pub async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Value>> {
        let mut conn = self.pool.acquire().await?;
        find_docs(&mut conn, collection, filter, options).await
    }

    pub async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let docs = self.find(collection, filter, &FindOptions::new().limit(1)).await?;
        Ok(docs.into_iter().next())
    }

    pub async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        count_docs(&mut conn, collection, filter).await
    }

    /// Sum of an integer field over matching documents (missing fields count as 0)
    pub async fn sum(&self, collection: &str, filter: &Filter, field: &str) -> Result<i64> {
        validate_field(field)?;
        let mut conn = self.pool.acquire().await?;
        require_collection(&mut conn, collection).await?;

        let mut binds = Vec::new();
        let sql = format!(
            "SELECT CAST(COALESCE(SUM({}), 0) AS INTEGER) FROM \"{}\"{}",
            field_expr(field),
            collection,
            filter.to_sql(&mut binds)?
        );
        let row = bind_all(sqlx::query(&sql), &binds).fetch_one(&mut *conn).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// Merge `patch` into one document (RFC 7396: `null` removes a field)
    ///
    /// Returns false if no document has this `_id`.
    pub async fn update_one(&self, collection: &str, id: &str, patch: Value) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        update_doc(&mut conn, collection, id, patch).await
    }

    /// Merge `patch` into every matching document. Returns the number changed.
    pub async fn update_many(&self, collection: &str, filter: &Filter, patch: Value) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        update_docs(&mut conn, collection, filter, patch).await
    }

    /// Add `delta` to an integer field; returns the new value, or None if absent
    pub async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<Option<i64>> {
        let mut conn = self.pool.acquire().await?;
        increment_field(&mut conn, collection, id, field, delta).await
    }

    pub async fn delete_one(&self, collection: &str, id: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        delete_doc(&mut conn, collection, id).await
    }

    /// Delete every matching document. Returns the number removed.
    pub async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        delete_docs(&mut conn, collection, filter).await
    }
}

/// Several document operations committed atomically
///
/// Dropping without `commit` rolls everything back.
pub struct DocumentTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl DocumentTransaction {
    pub async fn insert_one(&mut self, collection: &str, doc: Value) -> Result<String> {
        insert_doc(&mut self.tx, collection, doc).await
    }

    pub async fn find_by_id(&mut self, collection: &str, id: &str) -> Result<Option<Value>> {
        find_doc_by_id(&mut self.tx, collection, id).await
    }

    pub async fn find(&mut self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Value>> {
        find_docs(&mut self.tx, collection, filter, options).await
    }

    pub async fn update_one(&mut self, collection: &str, id: &str, patch: Value) -> Result<bool> {
        update_doc(&mut self.tx, collection, id, patch).await
    }

    pub async fn update_many(&mut self, collection: &str, filter: &Filter, patch: Value) -> Result<u64> {
        update_docs(&mut self.tx, collection, filter, patch).await
    }

    pub async fn count(&mut self, collection: &str, filter: &Filter) -> Result<u64> {
        count_docs(&mut self.tx, collection, filter).await
    }

    pub async fn increment(&mut self, collection: &str, id: &str, field: &str, delta: i64) -> Result<Option<i64>> {
        increment_field(&mut self.tx, collection, id, field, delta).await
    }

    pub async fn delete_one(&mut self, collection: &str, id: &str) -> Result<bool> {
        delete_doc(&mut self.tx, collection, id).await
    }

    pub async fn delete_many(&mut self, collection: &str, filter: &Filter) -> Result<u64> {
        delete_docs(&mut self.tx, collection, filter).await
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// CONNECTION-LEVEL OPERATIONS
// ============================================================================

/// Begin a transaction and take the write lock with a no-op UPDATE
///
/// sqlx 0.7 only issues a deferred `BEGIN`. Under WAL a deferred transaction
/// that has already read cannot upgrade to a writer while another connection
/// writes, and SQLite reports SQLITE_BUSY without consulting the busy
/// handler. Writing first makes the lock wait behave like `BEGIN IMMEDIATE`.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE _collections SET name = name WHERE 0")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Fails with `CollectionNotFound` unless declared; returns the append-only flag
async fn require_collection(conn: &mut SqliteConnection, collection: &str) -> Result<bool> {
    validate_collection(collection)?;

    let append_only: Option<bool> = sqlx::query_scalar("SELECT append_only FROM _collections WHERE name = ?")
        .bind(collection)
        .fetch_optional(&mut *conn)
        .await?;

    append_only.ok_or_else(|| BookverseError::CollectionNotFound(collection.to_string()))
}

async fn load_indexes(conn: &mut SqliteConnection, collection: &str) -> Result<Vec<IndexSpec>> {
    let rows: Vec<(String, String, bool)> =
        sqlx::query_as("SELECT name, keys, is_unique FROM _indexes WHERE collection = ? ORDER BY rowid")
            .bind(collection)
            .fetch_all(&mut *conn)
            .await?;

    rows.into_iter()
        .map(|(name, keys, unique)| {
            let keys: Vec<IndexKey> = serde_json::from_str(&keys).map_err(|e| {
                BookverseError::InvalidData(format!("Corrupt key pattern for {}.{}: {}", collection, name, e))
            })?;
            Ok(IndexSpec {
                collection: collection.to_string(),
                name,
                keys,
                unique,
            })
        })
        .collect()
}

fn parse_doc(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw)?)
}

fn into_object(doc: Value, what: &str) -> Result<Map<String, Value>> {
    match doc {
        Value::Object(map) => Ok(map),
        other => Err(BookverseError::invalid_input(format!(
            "{} must be a JSON object, got {}",
            what, other
        ))),
    }
}

async fn insert_doc(conn: &mut SqliteConnection, collection: &str, doc: Value) -> Result<String> {
    require_collection(conn, collection).await?;
    let mut map = into_object(doc, "document")?;

    let id = match map.get("_id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => {
            return Err(BookverseError::invalid_input(format!("_id must be a string, got {}", other)))
        }
        None => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            map.insert("_id".to_string(), Value::String(id.clone()));
            id
        }
    };

    let sql = format!("INSERT INTO \"{}\" (_id, doc) VALUES (?, ?)", collection);
    sqlx::query(&sql)
        .bind(&id)
        .bind(serde_json::to_string(&Value::Object(map))?)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}

async fn find_doc_by_id(conn: &mut SqliteConnection, collection: &str, id: &str) -> Result<Option<Value>> {
    require_collection(conn, collection).await?;

    let sql = format!("SELECT doc FROM \"{}\" WHERE _id = ?", collection);
    let raw: Option<String> = sqlx::query_scalar(&sql).bind(id).fetch_optional(&mut *conn).await?;
    raw.as_deref().map(parse_doc).transpose()
}

async fn find_docs(
    conn: &mut SqliteConnection,
    collection: &str,
    filter: &Filter,
    options: &FindOptions,
) -> Result<Vec<Value>> {
    require_collection(conn, collection).await?;

    let mut binds = Vec::new();
    let sql = format!(
        "SELECT doc FROM \"{}\"{}{}",
        collection,
        filter.to_sql(&mut binds)?,
        options.to_sql()?
    );

    let rows = bind_all(sqlx::query(&sql), &binds).fetch_all(&mut *conn).await?;
    rows.iter()
        .map(|row| parse_doc(&row.try_get::<String, _>("doc")?))
        .collect()
}

async fn count_docs(conn: &mut SqliteConnection, collection: &str, filter: &Filter) -> Result<u64> {
    require_collection(conn, collection).await?;

    let mut binds = Vec::new();
    let sql = format!("SELECT COUNT(*) FROM \"{}\"{}", collection, filter.to_sql(&mut binds)?);
    let row = bind_all(sqlx::query(&sql), &binds).fetch_one(&mut *conn).await?;
    Ok(row.try_get::<i64, _>(0)? as u64)
}

/// Serialize a merge patch, refusing to touch `_id`
fn patch_json(patch: Value) -> Result<String> {
    let map = into_object(patch, "patch")?;
    if map.contains_key("_id") {
        return Err(BookverseError::invalid_input("_id cannot be changed"));
    }
    Ok(serde_json::to_string(&Value::Object(map))?)
}

async fn update_doc(conn: &mut SqliteConnection, collection: &str, id: &str, patch: Value) -> Result<bool> {
    require_collection(conn, collection).await?;
    let patch = patch_json(patch)?;

    let sql = format!("UPDATE \"{}\" SET doc = json_patch(doc, ?) WHERE _id = ?", collection);
    let result = sqlx::query(&sql).bind(patch).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

async fn update_docs(conn: &mut SqliteConnection, collection: &str, filter: &Filter, patch: Value) -> Result<u64> {
    require_collection(conn, collection).await?;

    let mut binds = vec![SqlValue::Text(patch_json(patch)?)];
    let sql = format!(
        "UPDATE \"{}\" SET doc = json_patch(doc, ?){}",
        collection,
        filter.to_sql(&mut binds)?
    );
    let result = bind_all(sqlx::query(&sql), &binds).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

async fn increment_field(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
    field: &str,
    delta: i64,
) -> Result<Option<i64>> {
    validate_field(field)?;
    if field == "_id" {
        return Err(BookverseError::invalid_input("_id cannot be changed"));
    }
    require_collection(conn, collection).await?;

    let sql = format!(
        "UPDATE \"{c}\" SET doc = json_set(doc, '$.{f}', COALESCE({e}, 0) + ?) WHERE _id = ? RETURNING {e}",
        c = collection,
        f = field,
        e = field_expr(field),
    );
    let value: Option<i64> = sqlx::query_scalar(&sql)
        .bind(delta)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(value)
}

async fn delete_doc(conn: &mut SqliteConnection, collection: &str, id: &str) -> Result<bool> {
    require_collection(conn, collection).await?;

    let sql = format!("DELETE FROM \"{}\" WHERE _id = ?", collection);
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

async fn delete_docs(conn: &mut SqliteConnection, collection: &str, filter: &Filter) -> Result<u64> {
    require_collection(conn, collection).await?;

    let mut binds = Vec::new();
    let sql = format!("DELETE FROM \"{}\"{}", collection, filter.to_sql(&mut binds)?);
    let result = bind_all(sqlx::query(&sql), &binds).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
