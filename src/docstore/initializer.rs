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


//! Startup schema for the document store
//!
//! `initialize` creates the four BookVerse collections and declares their
//! indexes. It is safe to run on every startup: existing collections and
//! identical indexes are left alone. Any failure aborts at the first
//! collection or index that fails and is returned to the caller.

use crate::docstore::schema::{CollectionSpec, IndexKind, IndexSpec};
use crate::docstore::store::DocumentStore;
use crate::error::Result;

pub const USERS: &str = "users";
pub const BOOKS: &str = "books";
pub const DOWNLOADS: &str = "downloads";
pub const NOTIFICATIONS: &str = "notifications";

/// The BookVerse collections with their index sets
pub fn bookverse_schema() -> Vec<CollectionSpec> {
    use IndexKind::{Ascending, Descending, Text};

    vec![
        CollectionSpec::new(USERS)
            .index(IndexSpec::ascending(USERS, "email").unique())
            .index(IndexSpec::ascending(USERS, "role"))
            .index(IndexSpec::ascending(USERS, "createdAt")),
        CollectionSpec::new(BOOKS)
            .index(IndexSpec::new(
                BOOKS,
                &[("title", Text), ("author", Text), ("description", Text)],
            ))
            .index(IndexSpec::ascending(BOOKS, "category"))
            .index(IndexSpec::ascending(BOOKS, "status"))
            .index(IndexSpec::ascending(BOOKS, "uploadedBy"))
            .index(IndexSpec::descending(BOOKS, "createdAt"))
            .index(IndexSpec::new(BOOKS, &[("status", Ascending), ("createdAt", Descending)])),
        CollectionSpec::new(DOWNLOADS)
            .append_only()
            .index(IndexSpec::ascending(DOWNLOADS, "bookId"))
            .index(IndexSpec::ascending(DOWNLOADS, "userId"))
            .index(IndexSpec::descending(DOWNLOADS, "downloadedAt"))
            .index(IndexSpec::new(DOWNLOADS, &[("userId", Ascending), ("downloadedAt", Descending)])),
        CollectionSpec::new(NOTIFICATIONS)
            .index(IndexSpec::ascending(NOTIFICATIONS, "userId"))
            .index(IndexSpec::ascending(NOTIFICATIONS, "read"))
            .index(IndexSpec::descending(NOTIFICATIONS, "createdAt")),
    ]
}

/// What one `initialize` run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub collections_created: Vec<String>,
    pub collections_existing: Vec<String>,
    /// `collection.index` names built by this run
    pub indexes_created: Vec<String>,
    pub indexes_existing: Vec<String>,
}

impl InitReport {
    /// True when the store was already fully initialized
    pub fn is_noop(&self) -> bool {
        self.collections_created.is_empty() && self.indexes_created.is_empty()
    }
}

/// Initialize the store with `bookverse_schema()`
pub async fn initialize(store: &DocumentStore) -> Result<InitReport> {
    apply_schema(store, &bookverse_schema()).await
}

/// Create every collection in `schema` and declare its indexes
pub async fn apply_schema(store: &DocumentStore, schema: &[CollectionSpec]) -> Result<InitReport> {
    let mut report = InitReport::default();

    for collection in schema {
        if store.ensure_collection(collection).await? {
            report.collections_created.push(collection.name.clone());
        } else {
            report.collections_existing.push(collection.name.clone());
        }

        for index in &collection.indexes {
            let qualified = format!("{}.{}", index.collection, index.name);
            match store.create_index(index).await {
                Ok(true) => report.indexes_created.push(qualified),
                Ok(false) => report.indexes_existing.push(qualified),
                Err(e) => {
                    tracing::error!(index = %qualified, error = %e, "index declaration failed");
                    return Err(e);
                }
            }
        }
    }

    tracing::info!(
        collections_created = report.collections_created.len(),
        indexes_created = report.indexes_created.len(),
        indexes_existing = report.indexes_existing.len(),
        "document store initialized"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookverseError;
    use serde_json::json;

    #[test]
    fn test_schema_index_names() {
        let schema = bookverse_schema();
        let names: Vec<(String, Vec<String>)> = schema
            .iter()
            .map(|c| (c.name.clone(), c.indexes.iter().map(|i| i.name.clone()).collect()))
            .collect();

        assert_eq!(
            names,
            vec![
                (
                    "users".to_string(),
                    vec!["email_1".to_string(), "role_1".to_string(), "createdAt_1".to_string()]
                ),
                (
                    "books".to_string(),
                    vec![
                        "title_text_author_text_description_text".to_string(),
                        "category_1".to_string(),
                        "status_1".to_string(),
                        "uploadedBy_1".to_string(),
                        "createdAt_-1".to_string(),
                        "status_1_createdAt_-1".to_string(),
                    ]
                ),
                (
                    "downloads".to_string(),
                    vec![
                        "bookId_1".to_string(),
                        "userId_1".to_string(),
                        "downloadedAt_-1".to_string(),
                        "userId_1_downloadedAt_-1".to_string(),
                    ]
                ),
                (
                    "notifications".to_string(),
                    vec!["userId_1".to_string(), "read_1".to_string(), "createdAt_-1".to_string()]
                ),
            ]
        );

        // Only the email index is unique, only downloads is append-only
        let unique: Vec<&str> = schema
            .iter()
            .flat_map(|c| c.indexes.iter())
            .filter(|i| i.unique)
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(unique, vec!["email_1"]);
        assert_eq!(
            schema.iter().filter(|c| c.append_only).map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["downloads"]
        );
    }

    #[tokio::test]
    async fn test_initialize_twice() {
        let store = DocumentStore::open_in_memory().await.unwrap();

        let first = initialize(&store).await.expect("First run failed");
        assert_eq!(first.collections_created.len(), 4);
        assert_eq!(first.indexes_created.len(), 16);
        assert!(!first.is_noop());

        let mut before = Vec::new();
        for name in store.list_collections().await.unwrap() {
            before.push(store.list_indexes(&name).await.unwrap());
        }

        let second = initialize(&store).await.expect("Second run failed");
        assert!(second.is_noop());
        assert_eq!(second.collections_existing.len(), 4);
        assert_eq!(second.indexes_existing.len(), 16);

        let mut after = Vec::new();
        for name in store.list_collections().await.unwrap() {
            after.push(store.list_indexes(&name).await.unwrap());
        }
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_initialize_fails_on_duplicate_emails() {
        let store = DocumentStore::open_in_memory().await.unwrap();
        store.create_collection(USERS).await.unwrap();
        store.insert_one(USERS, json!({"email": "same@example.com"})).await.unwrap();
        store.insert_one(USERS, json!({"email": "same@example.com"})).await.unwrap();

        let err = initialize(&store).await.unwrap_err();
        assert!(
            matches!(err, BookverseError::IndexBuildFailed { ref collection, ref index, .. }
                if collection == "users" && index == "email_1"),
            "got {:?}",
            err
        );
        assert!(err.is_schema_error());
    }

    #[tokio::test]
    async fn test_initialize_fails_on_conflicting_index() {
        let store = DocumentStore::open_in_memory().await.unwrap();
        // email_1 declared earlier without uniqueness
        store.create_index(&IndexSpec::ascending(USERS, "email")).await.unwrap();

        let err = initialize(&store).await.unwrap_err();
        assert!(matches!(err, BookverseError::IndexConflict { .. }));
    }

    #[tokio::test]
    async fn test_downloads_are_append_only_after_init() {
        let store = DocumentStore::open_in_memory().await.unwrap();
        initialize(&store).await.unwrap();

        assert!(store.is_append_only(DOWNLOADS).await.unwrap());
        assert!(!store.is_append_only(BOOKS).await.unwrap());
    }
}
